//! Builds the Jingle wire model out of parsed XML elements. Unknown
//! attributes and children are warned about and skipped; missing required
//! attributes or unparseable numbers abort the element.

use crate::jingle::*;
use crate::xml::{Element, XmlError};
use log::warn;
use std::fmt;
use std::str::FromStr;

pub fn parse(node: &Element) -> Result<Jingle, JingleError> {
    let action_str = required(node, "action", "jingle")?;
    let action = Action::parse(action_str)
        .ok_or_else(|| JingleError::UnknownAction(action_str.to_string()))?;
    check_ns(node, ns::JINGLE)?;

    let mut jingle = Jingle::new(action, required(node, "sid", "jingle")?);
    jingle.initiator = node.attr("initiator").map(str::to_string);
    jingle.responder = node.attr("responder").map(str::to_string);

    for child in &node.children {
        match child.name.as_str() {
            "content" => jingle.contents.push(parse_content(child)?),
            "group" => jingle.group = Some(parse_group(child)?),
            "bridge-session" => {}
            other => warn!(target: "Jingle", "unhandled jingle child {other}"),
        }
    }
    Ok(jingle)
}

fn parse_content(node: &Element) -> Result<Content, JingleError> {
    let mut content = Content {
        name: required(node, "name", "content")?.to_string(),
        ..Default::default()
    };
    if let Some(creator) = node.attr("creator") {
        content.creator = Some(enum_value(Creator::parse, creator, "creator")?);
    }
    if let Some(senders) = node.attr("senders") {
        content.senders = Some(enum_value(Senders::parse, senders, "senders")?);
    }

    for child in &node.children {
        match child.name.as_str() {
            "description" => match child.attr("xmlns") {
                Some(ns::RTP) => content.descriptions.push(parse_rtp_description(child)?),
                other => {
                    warn!(target: "Jingle", "unknown description type {other:?}")
                }
            },
            "transport" => match child.attr("xmlns") {
                Some(ns::ICE_UDP) => content.transports.push(parse_ice_udp_transport(child)?),
                other => warn!(target: "Jingle", "unsupported transport {other:?}"),
            },
            other => warn!(target: "Jingle", "unhandled content child {other}"),
        }
    }
    Ok(content)
}

fn parse_rtp_description(node: &Element) -> Result<RtpDescription, JingleError> {
    let mut desc = RtpDescription {
        media: node.attr("media").map(str::to_string),
        ..Default::default()
    };
    if let Some(ssrc) = node.attr("ssrc") {
        desc.ssrc = Some(num(ssrc, "ssrc")?);
    }

    for child in &node.children {
        match child.name.as_str() {
            "payload-type" => desc.payload_types.push(parse_payload_type(child)?),
            "source" => desc.sources.push(parse_source(child)?),
            "rtp-hdrext" => desc.header_exts.push(parse_header_ext(child)?),
            "ssrc-group" => desc.ssrc_groups.push(parse_ssrc_group(child)?),
            "rtcp-mux" => desc.supports_mux = true,
            other => warn!(target: "Jingle", "unhandled description child {other}"),
        }
    }
    Ok(desc)
}

fn parse_payload_type(node: &Element) -> Result<PayloadType, JingleError> {
    let mut pt = PayloadType {
        id: num(required(node, "id", "payload-type")?, "id")?,
        name: node.attr("name").map(str::to_string),
        ..Default::default()
    };
    if let Some(clockrate) = node.attr("clockrate") {
        pt.clockrate = Some(num(clockrate, "clockrate")?);
    }
    if let Some(channels) = node.attr("channels") {
        pt.channels = Some(num(channels, "channels")?);
    }

    for child in &node.children {
        match child.name.as_str() {
            "rtcp-fb" => pt.rtcp_fbs.push(parse_rtcp_fb(child)?),
            "parameter" => pt.parameters.push(parse_parameter(child, true)?),
            other => warn!(target: "Jingle", "unhandled payload-type child {other}"),
        }
    }
    Ok(pt)
}

fn parse_rtcp_fb(node: &Element) -> Result<RtcpFeedback, JingleError> {
    check_ns(node, ns::RTP_RTCP_FB)?;
    Ok(RtcpFeedback {
        kind: required(node, "type", "rtcp-fb")?.to_string(),
        subtype: node.attr("subtype").map(str::to_string),
    })
}

fn parse_parameter(node: &Element, require_value: bool) -> Result<Parameter, JingleError> {
    let value = node.attr("value").map(str::to_string);
    if require_value && value.is_none() {
        return Err(JingleError::Missing {
            element: "parameter",
            what: "value attribute",
        });
    }
    Ok(Parameter {
        name: required(node, "name", "parameter")?.to_string(),
        value,
    })
}

fn parse_source(node: &Element) -> Result<Source, JingleError> {
    check_ns(node, ns::RTP_SSMA)?;
    let mut source = Source {
        ssrc: num(required(node, "ssrc", "source")?, "ssrc")?,
        name: node.attr("name").map(str::to_string),
        video_type: node.attr("videoType").map(str::to_string),
        ..Default::default()
    };

    for child in &node.children {
        match child.name.as_str() {
            "parameter" => source.parameters.push(parse_parameter(child, false)?),
            "ssrc-info" => {
                check_ns(child, ns::JITSI_JITMEET)?;
                source.owner = Some(
                    required(child, "owner", "ssrc-info")?.to_string(),
                );
            }
            other => warn!(target: "Jingle", "unhandled source child {other}"),
        }
    }
    if source.owner.is_none() {
        return Err(JingleError::Missing {
            element: "source",
            what: "ssrc-info child",
        });
    }
    Ok(source)
}

fn parse_header_ext(node: &Element) -> Result<RtpHeaderExt, JingleError> {
    check_ns(node, ns::RTP_HDREXT)?;
    Ok(RtpHeaderExt {
        id: num(required(node, "id", "rtp-hdrext")?, "id")?,
        uri: required(node, "uri", "rtp-hdrext")?.to_string(),
    })
}

fn parse_ssrc_group(node: &Element) -> Result<SsrcGroup, JingleError> {
    check_ns(node, ns::RTP_SSMA)?;
    let semantics = enum_value(
        SsrcSemantics::parse,
        required(node, "semantics", "ssrc-group")?,
        "ssrc-group semantics",
    )?;
    let mut ssrcs = Vec::new();
    for child in &node.children {
        match child.name.as_str() {
            "source" => ssrcs.push(num(required(child, "ssrc", "source")?, "ssrc")?),
            other => warn!(target: "Jingle", "unhandled ssrc-group child {other}"),
        }
    }
    Ok(SsrcGroup { semantics, ssrcs })
}

fn parse_ice_udp_transport(node: &Element) -> Result<IceUdpTransport, JingleError> {
    let mut transport = IceUdpTransport {
        ufrag: required(node, "ufrag", "transport")?.to_string(),
        pwd: required(node, "pwd", "transport")?.to_string(),
        ..Default::default()
    };

    for child in &node.children {
        match child.name.as_str() {
            "web-socket" => {
                if !child.is_attr("xmlns", ns::JITSI_COLIBRI) {
                    continue;
                }
                transport.websocket = child.attr("url").map(str::to_string);
            }
            "rtcp-mux" => transport.supports_mux = true,
            "fingerprint" => transport.fingerprints.push(parse_fingerprint(child)?),
            "candidate" => transport.candidates.push(parse_candidate(child)?),
            other => warn!(target: "Jingle", "unhandled transport child {other}"),
        }
    }
    if transport.websocket.is_none() {
        return Err(JingleError::Missing {
            element: "transport",
            what: "web-socket child",
        });
    }
    Ok(transport)
}

fn parse_fingerprint(node: &Element) -> Result<Fingerprint, JingleError> {
    check_ns(node, ns::DTLS)?;
    if node.text.is_empty() {
        return Err(JingleError::Missing {
            element: "fingerprint",
            what: "digest text",
        });
    }
    let mut fingerprint = Fingerprint {
        algo: required(node, "hash", "fingerprint")?.to_string(),
        setup: required(node, "setup", "fingerprint")?.to_string(),
        required: false,
        digest: node.text.clone(),
    };
    if let Some(required) = node.attr("required") {
        fingerprint.required = match required {
            "true" => true,
            "false" => false,
            other => {
                return Err(JingleError::UnknownValue {
                    what: "fingerprint required flag",
                    value: other.to_string(),
                });
            }
        };
    }
    Ok(fingerprint)
}

fn parse_candidate(node: &Element) -> Result<Candidate, JingleError> {
    if let Some(protocol) = node.attr("protocol") {
        if !protocol.eq_ignore_ascii_case("udp") {
            return Err(JingleError::UnknownValue {
                what: "candidate protocol",
                value: protocol.to_string(),
            });
        }
    }
    Ok(Candidate {
        component: num(required(node, "component", "candidate")?, "component")?,
        generation: num(required(node, "generation", "candidate")?, "generation")?,
        port: num(required(node, "port", "candidate")?, "port")?,
        priority: num(required(node, "priority", "candidate")?, "priority")?,
        kind: Some(enum_value(
            CandidateKind::parse,
            required(node, "type", "candidate")?,
            "candidate type",
        )?),
        foundation: required(node, "foundation", "candidate")?.to_string(),
        id: required(node, "id", "candidate")?.to_string(),
        ip: required(node, "ip", "candidate")?.to_string(),
    })
}

fn parse_group(node: &Element) -> Result<Group, JingleError> {
    check_ns(node, ns::GROUPING)?;
    let semantics = enum_value(
        GroupSemantics::parse,
        required(node, "semantics", "group")?,
        "group semantics",
    )?;
    let mut contents = Vec::new();
    for child in &node.children {
        match child.name.as_str() {
            "content" => {
                if let Some(name) = child.attr("name") {
                    contents.push(name.to_string());
                }
            }
            other => warn!(target: "Jingle", "unhandled group child {other}"),
        }
    }
    Ok(Group {
        semantics,
        contents,
    })
}

fn required<'a>(
    node: &'a Element,
    attr: &'static str,
    element: &'static str,
) -> Result<&'a str, JingleError> {
    node.attr(attr).ok_or(JingleError::Missing {
        element,
        what: attr,
    })
}

fn num<T>(raw: &str, attr: &'static str) -> Result<T, JingleError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e| {
        JingleError::Attr(XmlError::AttrParse {
            attr: attr.to_string(),
            reason: format!("invalid number {raw:?}: {e}"),
        })
    })
}

fn enum_value<T>(
    parse: fn(&str) -> Option<T>,
    raw: &str,
    what: &'static str,
) -> Result<T, JingleError> {
    parse(raw).ok_or_else(|| JingleError::UnknownValue {
        what,
        value: raw.to_string(),
    })
}

fn check_ns(node: &Element, expected: &str) -> Result<(), JingleError> {
    match node.attr("xmlns") {
        None => Ok(()),
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(JingleError::UnsupportedNamespace(actual.to_string())),
    }
}
