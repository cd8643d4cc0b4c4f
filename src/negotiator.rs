//! Opening stream negotiation: framed stream open, SASL ANONYMOUS
//! authentication, resource bind and external service discovery. Expressed
//! as an explicit state machine; every inbound frame is a transition input
//! and the caller owns the transport receive loop.

use crate::request::generate_iq_id;
use crate::transport::Transport;
use crate::types::service::{self, ServiceEndpoint};
use crate::types::Jid;
use crate::xml::{parser, Element, ElementBuilder, XmlError};
use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;

const NS_FRAMING: &str = "urn:ietf:params:xml:ns:xmpp-framing";
const NS_SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
const NS_BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
const NS_EXTDISCO: &str = "urn:xmpp:extdisco:2";

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("authentication failed: {0}")]
    Sasl(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Outcome of feeding one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    /// Negotiation finished; `jid` and `external_services` are populated.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    AwaitFeatures,
    AwaitSaslOutcome,
    AwaitBindFeatures,
    AwaitBindResult,
    AwaitServices,
    Done,
}

pub struct Negotiator {
    domain: String,
    transport: Arc<dyn Transport>,
    state: State,
    buffer: String,
    bind_id: Option<String>,
    services_id: Option<String>,
    /// Server-assigned full Jid, available once `Done` is reported.
    pub jid: Option<Jid>,
    pub external_services: Vec<ServiceEndpoint>,
}

impl Negotiator {
    pub fn new(domain: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            domain: domain.into(),
            transport,
            state: State::Start,
            buffer: String::new(),
            bind_id: None,
            services_id: None,
            jid: None,
            external_services: Vec::new(),
        }
    }

    /// Opens the stream. Must be called once before feeding frames.
    pub async fn start_negotiation(&mut self) -> Result<(), NegotiationError> {
        self.send_open().await?;
        self.state = State::AwaitFeatures;
        Ok(())
    }

    pub async fn feed(&mut self, payload: &str) -> Result<Progress, NegotiationError> {
        self.buffer.push_str(payload);
        loop {
            match parser::parse(&self.buffer) {
                Ok((element, consumed)) => {
                    self.buffer.drain(..consumed);
                    if self.handle_frame(&element).await? == Progress::Done {
                        return Ok(Progress::Done);
                    }
                }
                Err(XmlError::Incomplete) => break,
                Err(e) => {
                    warn!(target: "Negotiator", "xml parse error: {e}");
                    self.buffer.clear();
                    break;
                }
            }
        }
        Ok(Progress::Continue)
    }

    async fn handle_frame(&mut self, element: &Element) -> Result<Progress, NegotiationError> {
        let name = element.name.as_str();
        if name == "open" {
            return Ok(Progress::Continue);
        }

        match self.state {
            State::AwaitFeatures if is_features(name) => {
                if !offers_anonymous(element) {
                    return Err(NegotiationError::Sasl(
                        "server does not offer ANONYMOUS".to_string(),
                    ));
                }
                debug!(target: "Negotiator", "authenticating");
                let auth = ElementBuilder::new("auth")
                    .attr("xmlns", NS_SASL)
                    .attr("mechanism", "ANONYMOUS")
                    .build();
                self.send(&auth).await?;
                self.state = State::AwaitSaslOutcome;
            }
            State::AwaitSaslOutcome => match name {
                "success" => {
                    debug!(target: "Negotiator", "authenticated, restarting stream");
                    self.send_open().await?;
                    self.state = State::AwaitBindFeatures;
                }
                "challenge" => {
                    let response = ElementBuilder::new("response").attr("xmlns", NS_SASL).build();
                    self.send(&response).await?;
                }
                "failure" => {
                    return Err(NegotiationError::Sasl(format!(
                        "server rejected authentication: {}",
                        element
                    )));
                }
                other => warn!(target: "Negotiator", "unexpected frame {other} during auth"),
            },
            State::AwaitBindFeatures if is_features(name) => {
                if element.find_child("bind").is_none() {
                    return Err(NegotiationError::Protocol(
                        "server does not offer resource binding".to_string(),
                    ));
                }
                let id = generate_iq_id();
                let bind = ElementBuilder::new("iq")
                    .attr("id", &id)
                    .attr("type", "set")
                    .child(ElementBuilder::new("bind").attr("xmlns", NS_BIND).build())
                    .build();
                self.bind_id = Some(id);
                self.send(&bind).await?;
                self.state = State::AwaitBindResult;
            }
            State::AwaitBindResult if name == "iq" => {
                if element.attr("id") != self.bind_id.as_deref() {
                    warn!(target: "Negotiator", "iq with unexpected id during bind");
                    return Ok(Progress::Continue);
                }
                if !element.is_attr("type", "result") {
                    return Err(NegotiationError::Protocol(
                        "resource bind failed".to_string(),
                    ));
                }
                let jid_text = element
                    .find_child_path(&["bind", "jid"])
                    .map(|jid| jid.text.as_str())
                    .ok_or_else(|| {
                        NegotiationError::Protocol("bind result carries no jid".to_string())
                    })?;
                let jid: Jid = jid_text.parse().map_err(|_| {
                    NegotiationError::Protocol(format!("unparseable bound jid {jid_text:?}"))
                })?;
                info!(target: "Negotiator", "bound as {jid}");
                self.jid = Some(jid);

                let id = generate_iq_id();
                let services = ElementBuilder::new("iq")
                    .attr("id", &id)
                    .attr("to", &self.domain)
                    .attr("type", "get")
                    .child(
                        ElementBuilder::new("services")
                            .attr("xmlns", NS_EXTDISCO)
                            .build(),
                    )
                    .build();
                self.services_id = Some(id);
                self.send(&services).await?;
                self.state = State::AwaitServices;
            }
            State::AwaitServices if name == "iq" => {
                if element.attr("id") != self.services_id.as_deref() {
                    warn!(target: "Negotiator", "iq with unexpected id during service discovery");
                    return Ok(Progress::Continue);
                }
                if !element.is_attr("type", "result") {
                    return Err(NegotiationError::Protocol(
                        "external service discovery failed".to_string(),
                    ));
                }
                if let Some(services) = element.find_child("services") {
                    self.external_services = service::parse_services(services);
                }
                info!(
                    target: "Negotiator",
                    "negotiation complete, {} external services",
                    self.external_services.len()
                );
                self.state = State::Done;
                return Ok(Progress::Done);
            }
            State::Start | State::Done => {
                warn!(target: "Negotiator", "frame {name} outside negotiation");
            }
            _ => warn!(target: "Negotiator", "unexpected frame {name}"),
        }
        Ok(Progress::Continue)
    }

    async fn send_open(&self) -> Result<(), NegotiationError> {
        let open = ElementBuilder::new("open")
            .attr("xmlns", NS_FRAMING)
            .attr("to", &self.domain)
            .attr("version", "1.0")
            .build();
        self.send(&open).await
    }

    async fn send(&self, element: &Element) -> Result<(), NegotiationError> {
        self.transport
            .send_text(&element.to_string())
            .await
            .map_err(NegotiationError::Transport)
    }
}

fn is_features(name: &str) -> bool {
    name == "features" || name == "stream:features"
}

fn offers_anonymous(features: &Element) -> bool {
    features
        .find_child("mechanisms")
        .map(|mechanisms| {
            mechanisms
                .children_named("mechanism")
                .any(|mechanism| mechanism.text == "ANONYMOUS")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn features_frame() -> &'static str {
        r#"<stream:features xmlns:stream="http://etherx.jabber.org/streams"><mechanisms xmlns="urn:ietf:params:xml:ns:xmpp-sasl"><mechanism>ANONYMOUS</mechanism></mechanisms></stream:features>"#
    }

    #[tokio::test]
    async fn walks_the_full_handshake() {
        let transport = Arc::new(MockTransport::new());
        let mut negotiator = Negotiator::new("meet.example.org", transport.clone());

        negotiator.start_negotiation().await.unwrap();
        let open = transport.take_sent().remove(0);
        assert!(open.contains("xmpp-framing"));
        assert!(open.contains(r#"to="meet.example.org""#));

        // open acknowledgement is ignored, features trigger auth
        assert_eq!(
            negotiator
                .feed(r#"<open xmlns="urn:ietf:params:xml:ns:xmpp-framing"/>"#)
                .await
                .unwrap(),
            Progress::Continue
        );
        assert_eq!(
            negotiator.feed(features_frame()).await.unwrap(),
            Progress::Continue
        );
        let auth = transport.take_sent().remove(0);
        assert!(auth.contains(r#"mechanism="ANONYMOUS""#));

        // success restarts the stream
        negotiator.feed("<success/>").await.unwrap();
        let reopen = transport.take_sent().remove(0);
        assert!(reopen.contains("xmpp-framing"));

        // post-auth features offer bind
        negotiator
            .feed(r#"<stream:features><bind xmlns="urn:ietf:params:xml:ns:xmpp-bind"/></stream:features>"#)
            .await
            .unwrap();
        let bind = transport.take_sent().remove(0);
        let (bind_iq, _) = parser::parse(&bind).unwrap();
        let bind_id = bind_iq.attr("id").unwrap().to_string();
        assert!(bind_iq.find_child("bind").is_some());

        negotiator
            .feed(&format!(
                r#"<iq type="result" id="{bind_id}"><bind xmlns="urn:ietf:params:xml:ns:xmpp-bind"><jid>guest-123@meet.example.org/websocket-abc</jid></bind></iq>"#
            ))
            .await
            .unwrap();
        let services_request = transport.take_sent().remove(0);
        assert!(services_request.contains("urn:xmpp:extdisco:2"));
        let (services_iq, _) = parser::parse(&services_request).unwrap();
        let services_id = services_iq.attr("id").unwrap().to_string();

        let progress = negotiator
            .feed(&format!(
                r#"<iq type="result" id="{services_id}"><services xmlns="urn:xmpp:extdisco:2"><service type="stun" host="stun.example.org" port="3478"/><service type="turns" host="turn.example.org" port="5349" username="u" password="p"/></services></iq>"#
            ))
            .await
            .unwrap();
        assert_eq!(progress, Progress::Done);

        let jid = negotiator.jid.as_ref().unwrap();
        assert_eq!(jid.node, "guest-123");
        assert_eq!(jid.resource, "websocket-abc");
        assert_eq!(negotiator.external_services.len(), 2);
        assert_eq!(negotiator.external_services[1].kind, "turns");
    }

    #[tokio::test]
    async fn missing_anonymous_mechanism_is_fatal() {
        let transport = Arc::new(MockTransport::new());
        let mut negotiator = Negotiator::new("meet.example.org", transport.clone());
        negotiator.start_negotiation().await.unwrap();

        let result = negotiator
            .feed(r#"<stream:features><mechanisms xmlns="urn:ietf:params:xml:ns:xmpp-sasl"><mechanism>PLAIN</mechanism></mechanisms></stream:features>"#)
            .await;
        assert!(matches!(result, Err(NegotiationError::Sasl(_))));
    }

    #[tokio::test]
    async fn bind_failure_is_fatal() {
        let transport = Arc::new(MockTransport::new());
        let mut negotiator = Negotiator::new("meet.example.org", transport.clone());
        negotiator.start_negotiation().await.unwrap();
        negotiator.feed(features_frame()).await.unwrap();
        negotiator.feed("<success/>").await.unwrap();
        negotiator
            .feed(r#"<stream:features><bind xmlns="urn:ietf:params:xml:ns:xmpp-bind"/></stream:features>"#)
            .await
            .unwrap();
        let bind = transport.take_sent().last().cloned().unwrap();
        let (bind_iq, _) = parser::parse(&bind).unwrap();
        let bind_id = bind_iq.attr("id").unwrap().to_string();

        let result = negotiator
            .feed(&format!(r#"<iq type="error" id="{bind_id}"/>"#))
            .await;
        assert!(matches!(result, Err(NegotiationError::Protocol(_))));
    }
}
