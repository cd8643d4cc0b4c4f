use crate::xml::Element;
use log::warn;

/// An external STUN/TURN endpoint advertised by the server
/// (XEP-0215 external service discovery).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceEndpoint {
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub transport: Option<String>,
    pub restricted: bool,
}

/// Parses the children of a `services` element. Individual services that
/// fail to parse are skipped with a warning; the rest are kept.
pub fn parse_services(services: &Element) -> Vec<ServiceEndpoint> {
    let mut endpoints = Vec::new();
    for child in services.children_named("service") {
        match parse_service(child) {
            Some(endpoint) => endpoints.push(endpoint),
            None => warn!(target: "Negotiator", "failed to parse service entry"),
        }
    }
    endpoints
}

fn parse_service(node: &Element) -> Option<ServiceEndpoint> {
    let mut endpoint = ServiceEndpoint {
        kind: node.attr("type")?.to_string(),
        host: node.attr("host")?.to_string(),
        ..Default::default()
    };
    if let Some(port) = node.attr("port") {
        endpoint.port = port.parse().ok()?;
    }
    endpoint.username = node.attr("username").map(str::to_string);
    endpoint.password = node.attr("password").map(str::to_string);
    endpoint.transport = node.attr("transport").map(str::to_string);
    if let Some(restricted) = node.attr("restricted") {
        endpoint.restricted = match restricted {
            "1" | "true" => true,
            "0" | "false" => false,
            other => {
                warn!(target: "Negotiator", "unknown restricted value {other:?}");
                return None;
            }
        };
    }
    Some(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::ElementBuilder;

    #[test]
    fn parses_turn_and_stun_entries() {
        let services = ElementBuilder::new("services")
            .attr("xmlns", "urn:xmpp:extdisco:2")
            .child(
                ElementBuilder::new("service")
                    .attr("type", "stun")
                    .attr("host", "stun.example.org")
                    .attr("port", "3478")
                    .build(),
            )
            .child(
                ElementBuilder::new("service")
                    .attr("type", "turns")
                    .attr("host", "turn.example.org")
                    .attr("port", "5349")
                    .attr("username", "u")
                    .attr("password", "p")
                    .attr("transport", "tcp")
                    .attr("restricted", "1")
                    .build(),
            )
            .build();
        let endpoints = parse_services(&services);
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].kind, "stun");
        assert_eq!(endpoints[0].port, 3478);
        assert_eq!(endpoints[1].username.as_deref(), Some("u"));
        assert!(endpoints[1].restricted);
    }

    #[test]
    fn skips_entries_missing_required_attributes() {
        let services = ElementBuilder::new("services")
            .child(ElementBuilder::new("service").attr("type", "stun").build())
            .build();
        assert!(parse_services(&services).is_empty());
    }
}
