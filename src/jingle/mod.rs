//! Wire model for the Jingle session-description protocol subset spoken by
//! the conference bridge: RTP descriptions, ICE-UDP transports, DTLS
//! fingerprints and content grouping.

pub mod parser;
pub mod writer;

use thiserror::Error;

pub mod ns {
    pub const JINGLE: &str = "urn:xmpp:jingle:1";
    pub const RTP: &str = "urn:xmpp:jingle:apps:rtp:1";
    pub const RTP_SSMA: &str = "urn:xmpp:jingle:apps:rtp:ssma:0";
    pub const RTP_HDREXT: &str = "urn:xmpp:jingle:apps:rtp:rtp-hdrext:0";
    pub const RTP_RTCP_FB: &str = "urn:xmpp:jingle:apps:rtp:rtcp-fb:0";
    pub const DTLS: &str = "urn:xmpp:jingle:apps:dtls:0";
    pub const GROUPING: &str = "urn:xmpp:jingle:apps:grouping:0";
    pub const ICE_UDP: &str = "urn:xmpp:jingle:transports:ice-udp:1";
    pub const JITSI_JITMEET: &str = "http://jitsi.org/jitmeet";
    pub const JITSI_COLIBRI: &str = "http://jitsi.org/protocol/colibri";
}

#[derive(Debug, Error)]
pub enum JingleError {
    #[error("<{element}> is missing required {what}")]
    Missing {
        element: &'static str,
        what: &'static str,
    },
    #[error("unsupported xmlns {0}")]
    UnsupportedNamespace(String),
    #[error("unknown jingle action {0:?}")]
    UnknownAction(String),
    #[error("unknown {what} {value:?}")]
    UnknownValue {
        what: &'static str,
        value: String,
    },
    #[error(transparent)]
    Attr(#[from] crate::xml::XmlError),
    #[error("no active jingle session")]
    NoSession,
    #[error("offer carries no {0} codec")]
    CodecUnavailable(&'static str),
    #[error("ice failure: {0}")]
    Ice(#[from] crate::ice::IceError),
    #[error("crypto failure: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),
}

macro_rules! str_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

str_enum!(Action {
    ContentAccept => "content-accept",
    ContentAdd => "content-add",
    ContentModify => "content-modify",
    ContentReject => "content-reject",
    ContentRemove => "content-remove",
    DescriptionInfo => "description-info",
    SecurityInfo => "security-info",
    SessionAccept => "session-accept",
    SessionInfo => "session-info",
    SessionInitiate => "session-initiate",
    SessionTerminate => "session-terminate",
    TransportAccept => "transport-accept",
    TransportInfo => "transport-info",
    TransportReject => "transport-reject",
    TransportReplace => "transport-replace",
    SourceAdd => "source-add",
    SourceRemove => "source-remove",
});

str_enum!(Creator {
    Initiator => "initiator",
    Responder => "responder",
});

str_enum!(Senders {
    Both => "both",
    Initiator => "initiator",
    Responder => "responder",
    None => "none",
});

str_enum!(SsrcSemantics {
    Ls => "LS",
    Fid => "FID",
    Srf => "SRF",
    Anat => "ANAT",
    Fec => "FEC",
    Ddp => "DDP",
});

str_enum!(GroupSemantics {
    LipSync => "LS",
    Bundle => "BUNDLE",
});

str_enum!(CandidateKind {
    Host => "host",
    Prflx => "prflx",
    Relay => "relay",
    Srflx => "srflx",
});

#[derive(Debug, Clone, PartialEq)]
pub struct Jingle {
    pub action: Action,
    pub sid: String,
    pub initiator: Option<String>,
    pub responder: Option<String>,
    pub contents: Vec<Content>,
    pub group: Option<Group>,
}

impl Jingle {
    pub fn new(action: Action, sid: impl Into<String>) -> Self {
        Self {
            action,
            sid: sid.into(),
            initiator: None,
            responder: None,
            contents: Vec::new(),
            group: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Content {
    pub name: String,
    pub creator: Option<Creator>,
    pub senders: Option<Senders>,
    pub descriptions: Vec<RtpDescription>,
    pub transports: Vec<IceUdpTransport>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RtpDescription {
    pub media: Option<String>,
    pub ssrc: Option<u32>,
    pub payload_types: Vec<PayloadType>,
    pub sources: Vec<Source>,
    pub ssrc_groups: Vec<SsrcGroup>,
    pub header_exts: Vec<RtpHeaderExt>,
    pub supports_mux: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PayloadType {
    pub id: u8,
    pub name: Option<String>,
    pub clockrate: Option<u32>,
    pub channels: Option<u8>,
    pub parameters: Vec<Parameter>,
    pub rtcp_fbs: Vec<RtcpFeedback>,
}

/// An `rtcp-fb` feedback descriptor, e.g. `nack pli` or `transport-cc`.
#[derive(Debug, Clone, PartialEq)]
pub struct RtcpFeedback {
    pub kind: String,
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Source {
    pub ssrc: u32,
    pub name: Option<String>,
    pub video_type: Option<String>,
    /// Owner participant id from the `ssrc-info` child; always present on
    /// parsed offers, absent on locally built sources.
    pub owner: Option<String>,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsrcGroup {
    pub semantics: SsrcSemantics,
    pub ssrcs: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RtpHeaderExt {
    pub id: u16,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IceUdpTransport {
    pub ufrag: String,
    pub pwd: String,
    pub websocket: Option<String>,
    pub supports_mux: bool,
    pub fingerprints: Vec<Fingerprint>,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub algo: String,
    pub setup: String,
    pub required: bool,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Candidate {
    pub component: u8,
    pub generation: u32,
    pub port: u16,
    pub priority: u32,
    pub kind: Option<CandidateKind>,
    pub foundation: String,
    pub id: String,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub semantics: GroupSemantics,
    pub contents: Vec<String>,
}
