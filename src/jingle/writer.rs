//! Turns the Jingle model back into XML elements for outgoing actions
//! (session-accept in particular).

use crate::jingle::*;
use crate::xml::{Element, ElementBuilder};

pub fn write(jingle: &Jingle) -> Element {
    let mut builder = ElementBuilder::new("jingle")
        .attr("xmlns", ns::JINGLE)
        .attr("action", jingle.action.as_str())
        .attr("sid", &jingle.sid);
    if let Some(initiator) = &jingle.initiator {
        builder = builder.attr("initiator", initiator);
    }
    if let Some(responder) = &jingle.responder {
        builder = builder.attr("responder", responder);
    }
    builder = builder.children(jingle.contents.iter().map(write_content));
    if let Some(group) = &jingle.group {
        builder = builder.child(write_group(group));
    }
    builder.build()
}

fn write_content(content: &Content) -> Element {
    let mut builder = ElementBuilder::new("content");
    if let Some(creator) = content.creator {
        builder = builder.attr("creator", creator.as_str());
    }
    builder = builder.attr("name", &content.name);
    if let Some(senders) = content.senders {
        builder = builder.attr("senders", senders.as_str());
    }
    builder
        .children(content.descriptions.iter().map(write_description))
        .children(content.transports.iter().map(write_transport))
        .build()
}

fn write_description(desc: &RtpDescription) -> Element {
    let mut builder = ElementBuilder::new("description").attr("xmlns", ns::RTP);
    if let Some(media) = &desc.media {
        builder = builder.attr("media", media);
    }
    if let Some(ssrc) = desc.ssrc {
        builder = builder.attr("ssrc", ssrc.to_string());
    }
    builder = builder.children(desc.payload_types.iter().map(write_payload_type));
    builder = builder.children(desc.sources.iter().map(write_source));
    builder = builder.children(desc.ssrc_groups.iter().map(write_ssrc_group));
    builder = builder.children(desc.header_exts.iter().map(|ext| {
        ElementBuilder::new("rtp-hdrext")
            .attr("xmlns", ns::RTP_HDREXT)
            .attr("id", ext.id.to_string())
            .attr("uri", &ext.uri)
            .build()
    }));
    if desc.supports_mux {
        builder = builder.child(Element::new("rtcp-mux"));
    }
    builder.build()
}

fn write_payload_type(pt: &PayloadType) -> Element {
    let mut builder = ElementBuilder::new("payload-type").attr("id", pt.id.to_string());
    if let Some(name) = &pt.name {
        builder = builder.attr("name", name);
    }
    if let Some(clockrate) = pt.clockrate {
        builder = builder.attr("clockrate", clockrate.to_string());
    }
    if let Some(channels) = pt.channels {
        builder = builder.attr("channels", channels.to_string());
    }
    builder
        .children(pt.parameters.iter().map(write_parameter))
        .children(pt.rtcp_fbs.iter().map(write_rtcp_fb))
        .build()
}

fn write_rtcp_fb(fb: &RtcpFeedback) -> Element {
    let mut builder = ElementBuilder::new("rtcp-fb")
        .attr("xmlns", ns::RTP_RTCP_FB)
        .attr("type", &fb.kind);
    if let Some(subtype) = &fb.subtype {
        builder = builder.attr("subtype", subtype);
    }
    builder.build()
}

fn write_parameter(parameter: &Parameter) -> Element {
    let mut builder = ElementBuilder::new("parameter").attr("name", &parameter.name);
    if let Some(value) = &parameter.value {
        builder = builder.attr("value", value);
    }
    builder.build()
}

fn write_source(source: &Source) -> Element {
    let mut builder = ElementBuilder::new("source")
        .attr("xmlns", ns::RTP_SSMA)
        .attr("ssrc", source.ssrc.to_string());
    if let Some(name) = &source.name {
        builder = builder.attr("name", name);
    }
    if let Some(video_type) = &source.video_type {
        builder = builder.attr("videoType", video_type);
    }
    builder = builder.children(source.parameters.iter().map(write_parameter));
    if let Some(owner) = &source.owner {
        builder = builder.child(
            ElementBuilder::new("ssrc-info")
                .attr("xmlns", ns::JITSI_JITMEET)
                .attr("owner", owner)
                .build(),
        );
    }
    builder.build()
}

fn write_ssrc_group(group: &SsrcGroup) -> Element {
    ElementBuilder::new("ssrc-group")
        .attr("xmlns", ns::RTP_SSMA)
        .attr("semantics", group.semantics.as_str())
        .children(group.ssrcs.iter().map(|ssrc| {
            ElementBuilder::new("source")
                .attr("ssrc", ssrc.to_string())
                .build()
        }))
        .build()
}

fn write_transport(transport: &IceUdpTransport) -> Element {
    let mut builder = ElementBuilder::new("transport")
        .attr("xmlns", ns::ICE_UDP)
        .attr("ufrag", &transport.ufrag)
        .attr("pwd", &transport.pwd);
    if let Some(url) = &transport.websocket {
        builder = builder.child(
            ElementBuilder::new("web-socket")
                .attr("xmlns", ns::JITSI_COLIBRI)
                .attr("url", url)
                .build(),
        );
    }
    if transport.supports_mux {
        builder = builder.child(Element::new("rtcp-mux"));
    }
    builder = builder.children(transport.candidates.iter().map(write_candidate));
    builder = builder.children(transport.fingerprints.iter().map(|fp| {
        let mut fingerprint = ElementBuilder::new("fingerprint")
            .attr("xmlns", ns::DTLS)
            .attr("hash", &fp.algo)
            .attr("setup", &fp.setup)
            .attr("required", if fp.required { "true" } else { "false" });
        fingerprint = fingerprint.text(&fp.digest);
        fingerprint.build()
    }));
    builder.build()
}

fn write_candidate(candidate: &Candidate) -> Element {
    let mut builder = ElementBuilder::new("candidate")
        .attr("component", candidate.component.to_string())
        .attr("foundation", &candidate.foundation)
        .attr("generation", candidate.generation.to_string())
        .attr("id", &candidate.id)
        .attr("ip", &candidate.ip)
        .attr("port", candidate.port.to_string())
        .attr("priority", candidate.priority.to_string())
        .attr("protocol", "udp");
    if let Some(kind) = candidate.kind {
        builder = builder.attr("type", kind.as_str());
    }
    builder.build()
}

fn write_group(group: &Group) -> Element {
    ElementBuilder::new("group")
        .attr("xmlns", ns::GROUPING)
        .attr("semantics", group.semantics.as_str())
        .children(group.contents.iter().map(|name| {
            ElementBuilder::new("content").attr("name", name).build()
        }))
        .build()
}
