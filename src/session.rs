//! Jingle offer/answer engine. Parses an incoming session-initiate into a
//! normalized [`JingleSession`], builds the matching session-accept, and
//! folds incremental source-add actions into the SSRC map.

use crate::crypto::DtlsIdentity;
use crate::ice::{IceAgent, IceAgentFactory, IceCredentials};
use crate::jingle::{
    Action, Candidate, Content, Creator, Fingerprint, Group, GroupSemantics, IceUdpTransport,
    Jingle, JingleError, Parameter, PayloadType, RtpDescription, RtpHeaderExt, Senders, Source,
    SsrcGroup, SsrcSemantics,
};
use crate::types::{Jid, ServiceEndpoint};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify};

pub const RTP_HDREXT_SSRC_AUDIO_LEVEL: &str = "urn:ietf:params:rtp-hdrext:ssrc-audio-level";
pub const RTP_HDREXT_TRANSPORT_CC: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Opus,
    H264,
    Vp8,
    Vp9,
    Av1,
}

impl CodecKind {
    /// The payload-type name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecKind::Opus => "opus",
            CodecKind::H264 => "H264",
            CodecKind::Vp8 => "VP8",
            CodecKind::Vp9 => "VP9",
            CodecKind::Av1 => "AV1",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "opus" => Some(CodecKind::Opus),
            "H264" => Some(CodecKind::H264),
            "VP8" => Some(CodecKind::Vp8),
            "VP9" => Some(CodecKind::Vp9),
            "AV1" => Some(CodecKind::Av1),
            _ => None,
        }
    }

    /// Lowercase form used in the `jitsi_participant_codecType` presence hint.
    pub fn hint(&self) -> &'static str {
        match self {
            CodecKind::Opus => "opus",
            CodecKind::H264 => "h264",
            CodecKind::Vp8 => "vp8",
            CodecKind::Vp9 => "vp9",
            CodecKind::Av1 => "av1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn parse(media: &str) -> Option<Self> {
        match media {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// A codec accepted from the offer, with its retransmission pairing
/// resolved and the offered feedback descriptors preserved verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Codec {
    pub kind: CodecKind,
    pub tx_pt: u8,
    pub rtx_pt: Option<u8>,
    pub rtcp_fbs: Vec<crate::jingle::RtcpFeedback>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsrcEntry {
    pub ssrc: u32,
    pub kind: MediaKind,
    pub participant_id: String,
}

pub type SsrcMap = HashMap<u32, SsrcEntry>;

/// Durable state after an offer is accepted.
pub struct JingleSession {
    pub offer: Jingle,
    pub ice_agent: Box<dyn IceAgent>,
    pub local_credentials: IceCredentials,
    pub dtls: DtlsIdentity,
    pub codecs: Vec<Codec>,
    pub ssrc_map: SsrcMap,
    pub audio_ssrc: u32,
    pub video_ssrc: u32,
    pub video_rtx_ssrc: u32,
    pub audio_hdrext_ssrc_audio_level: Option<u16>,
    pub audio_hdrext_transport_cc: Option<u16>,
    pub video_hdrext_transport_cc: Option<u16>,
}

impl JingleSession {
    pub fn find_codec(&self, kind: CodecKind) -> Option<&Codec> {
        self.codecs.iter().find(|codec| codec.kind == kind)
    }

    pub fn find_codec_by_tx_pt(&self, tx_pt: u8) -> Option<&Codec> {
        self.codecs.iter().find(|codec| codec.tx_pt == tx_pt)
    }
}

#[derive(Default)]
struct ParsedDescription {
    codecs: Vec<Codec>,
    audio_hdrext_ssrc_audio_level: Option<u16>,
    audio_hdrext_transport_cc: Option<u16>,
    video_hdrext_transport_cc: Option<u16>,
}

static CANDIDATE_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Drives offer parsing and answer construction for the single session a
/// conference carries.
pub struct JingleHandler {
    audio_codec: CodecKind,
    video_codec: CodecKind,
    jid: Jid,
    external_services: Vec<ServiceEndpoint>,
    ice_factory: Box<dyn IceAgentFactory>,
    session: Mutex<Option<JingleSession>>,
    session_ready: Notify,
}

impl JingleHandler {
    pub fn new(
        audio_codec: CodecKind,
        video_codec: CodecKind,
        jid: Jid,
        external_services: Vec<ServiceEndpoint>,
        ice_factory: Box<dyn IceAgentFactory>,
    ) -> Self {
        Self {
            audio_codec,
            video_codec,
            jid,
            external_services,
            ice_factory,
            session: Mutex::new(None),
            session_ready: Notify::new(),
        }
    }

    /// Resolves once `on_initiate` has stored the session, so the embedder
    /// can stand up its media pipeline before sending the answer.
    pub async fn session_established(&self) {
        self.session_ready.notified().await;
    }

    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Certificate and key PEMs for the media layer's DTLS handshake.
    pub async fn dtls_identity(&self) -> Option<DtlsIdentity> {
        self.session.lock().await.as_ref().map(|s| s.dtls.clone())
    }

    pub async fn ssrc_map(&self) -> SsrcMap {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.ssrc_map.clone())
            .unwrap_or_default()
    }

    /// Accepts a session-initiate offer: derives codecs, header-extension
    /// ids and the SSRC map, generates the DTLS identity and local SSRCs,
    /// and starts ICE candidate gathering.
    pub async fn on_initiate(&self, offer: Jingle) -> Result<(), JingleError> {
        let mut codecs = Vec::new();
        let mut ssrc_map = SsrcMap::new();
        let mut audio_hdrext_ssrc_audio_level = None;
        let mut audio_hdrext_transport_cc = None;
        let mut video_hdrext_transport_cc = None;
        let mut remote_transport: Option<IceUdpTransport> = None;

        for content in &offer.contents {
            for description in &content.descriptions {
                let parsed = parse_rtp_description(description, &mut ssrc_map)?;
                codecs.extend(parsed.codecs);
                audio_hdrext_ssrc_audio_level =
                    audio_hdrext_ssrc_audio_level.or(parsed.audio_hdrext_ssrc_audio_level);
                audio_hdrext_transport_cc =
                    audio_hdrext_transport_cc.or(parsed.audio_hdrext_transport_cc);
                video_hdrext_transport_cc =
                    video_hdrext_transport_cc.or(parsed.video_hdrext_transport_cc);
            }
            if let Some(transport) = content.transports.first() {
                remote_transport = Some(transport.clone());
            }
        }

        let dtls = DtlsIdentity::generate()?;
        debug!(target: "Jingle", "dtls fingerprint: {}", dtls.fingerprint);

        let audio_ssrc = rand::random::<u32>();
        let video_ssrc = rand::random::<u32>();
        let video_rtx_ssrc = rand::random::<u32>();

        let ice_agent = self
            .ice_factory
            .setup(&self.external_services, remote_transport.as_ref())
            .await?;
        let local_credentials = ice_agent.local_credentials().await?;

        let mut slot = self.session.lock().await;
        if slot.is_some() {
            warn!(target: "Jingle", "replacing an existing session");
        }
        *slot = Some(JingleSession {
            offer,
            ice_agent,
            local_credentials,
            dtls,
            codecs,
            ssrc_map,
            audio_ssrc,
            video_ssrc,
            video_rtx_ssrc,
            audio_hdrext_ssrc_audio_level,
            audio_hdrext_transport_cc,
            video_hdrext_transport_cc,
        });
        drop(slot);

        self.session_ready.notify_one();
        Ok(())
    }

    /// Builds the session-accept answer for the stored offer.
    pub async fn build_accept(&self) -> Result<Jingle, JingleError> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(JingleError::NoSession)?;

        let candidates = session.ice_agent.local_candidates().await?;

        let mut accept = Jingle::new(Action::SessionAccept, session.offer.sid.clone());
        accept.initiator = session.offer.initiator.clone();
        accept.responder = Some(self.jid.to_full());

        for is_audio in [true, false] {
            let codec_kind = if is_audio { self.audio_codec } else { self.video_codec };
            let main_ssrc = if is_audio { session.audio_ssrc } else { session.video_ssrc };
            let codec = session
                .find_codec(codec_kind)
                .ok_or(JingleError::CodecUnavailable(codec_kind.as_str()))?;

            let mut description = RtpDescription {
                media: Some((if is_audio { "audio" } else { "video" }).to_string()),
                ssrc: Some(main_ssrc),
                ..Default::default()
            };

            description.payload_types.push(PayloadType {
                id: codec.tx_pt,
                name: Some(codec_kind.as_str().to_string()),
                clockrate: Some(if is_audio { 48000 } else { 90000 }),
                channels: is_audio.then_some(2),
                parameters: Vec::new(),
                rtcp_fbs: codec.rtcp_fbs.clone(),
            });
            if let Some(rtx_pt) = codec.rtx_pt {
                description.payload_types.push(PayloadType {
                    id: rtx_pt,
                    name: Some("rtx".to_string()),
                    clockrate: Some(if is_audio { 48000 } else { 90000 }),
                    channels: is_audio.then_some(2),
                    parameters: vec![Parameter::new("apt", codec.tx_pt.to_string())],
                    rtcp_fbs: codec
                        .rtcp_fbs
                        .iter()
                        .filter(|fb| fb.kind != "transport-cc")
                        .cloned()
                        .collect(),
                });
            }

            description.sources.push(Source {
                ssrc: main_ssrc,
                ..Default::default()
            });
            if !is_audio {
                description.sources.push(Source {
                    ssrc: session.video_rtx_ssrc,
                    ..Default::default()
                });
            }
            let stream_id = rand::random::<u32>();
            let label = format!("stream_label_{stream_id}");
            let mslabel = format!("multi_stream_label_{stream_id}");
            let msid = format!("{mslabel} {label}");
            let cname = format!("cname_{stream_id}");
            for source in &mut description.sources {
                source.parameters.push(Parameter::new("cname", cname.clone()));
                source.parameters.push(Parameter::new("msid", msid.clone()));
            }

            if is_audio {
                if let Some(id) = session.audio_hdrext_ssrc_audio_level {
                    description.header_exts.push(RtpHeaderExt {
                        id,
                        uri: RTP_HDREXT_SSRC_AUDIO_LEVEL.to_string(),
                    });
                }
                if let Some(id) = session.audio_hdrext_transport_cc {
                    description.header_exts.push(RtpHeaderExt {
                        id,
                        uri: RTP_HDREXT_TRANSPORT_CC.to_string(),
                    });
                }
            } else {
                if let Some(id) = session.video_hdrext_transport_cc {
                    description.header_exts.push(RtpHeaderExt {
                        id,
                        uri: RTP_HDREXT_TRANSPORT_CC.to_string(),
                    });
                }
                description.ssrc_groups.push(SsrcGroup {
                    semantics: SsrcSemantics::Fid,
                    ssrcs: vec![session.video_ssrc, session.video_rtx_ssrc],
                });
            }

            let mut transport = IceUdpTransport {
                ufrag: session.local_credentials.ufrag.clone(),
                pwd: session.local_credentials.pwd.clone(),
                ..Default::default()
            };
            for candidate in &candidates {
                transport.candidates.push(Candidate {
                    component: candidate.component,
                    generation: 0,
                    port: candidate.port,
                    priority: candidate.priority,
                    kind: Some(candidate.kind),
                    foundation: candidate.foundation.clone(),
                    id: format!(
                        "candidate_{}",
                        CANDIDATE_SERIAL.fetch_add(1, Ordering::Relaxed)
                    ),
                    ip: candidate.ip.clone(),
                });
            }
            transport.fingerprints.push(Fingerprint {
                algo: "sha-256".to_string(),
                setup: "active".to_string(),
                required: false,
                digest: session.dtls.fingerprint.clone(),
            });

            accept.contents.push(Content {
                name: (if is_audio { "audio" } else { "video" }).to_string(),
                creator: Some(Creator::Responder),
                senders: Some(Senders::Both),
                descriptions: vec![description],
                transports: vec![transport],
            });
        }

        accept.group = Some(Group {
            semantics: GroupSemantics::Bundle,
            contents: vec!["audio".to_string(), "video".to_string()],
        });

        Ok(accept)
    }

    /// Folds a source-add action into the SSRC map. Repeat deliveries are
    /// harmless; entries are keyed by SSRC and replaced as authoritative.
    pub async fn on_add_source(&self, jingle: Jingle) -> Result<(), JingleError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(JingleError::NoSession)?;

        for content in &jingle.contents {
            for description in &content.descriptions {
                let Some(media) = &description.media else {
                    continue;
                };
                let Some(kind) = MediaKind::parse(media) else {
                    warn!(target: "Jingle", "unknown media {media}");
                    continue;
                };
                for source in &description.sources {
                    session.ssrc_map.insert(
                        source.ssrc,
                        SsrcEntry {
                            ssrc: source.ssrc,
                            kind,
                            participant_id: source.owner.clone().unwrap_or_default(),
                        },
                    );
                }
            }
        }
        Ok(())
    }
}

fn parse_rtp_description(
    description: &RtpDescription,
    ssrc_map: &mut SsrcMap,
) -> Result<ParsedDescription, JingleError> {
    let media = description.media.as_deref().ok_or(JingleError::Missing {
        element: "description",
        what: "media",
    })?;
    let media_kind = MediaKind::parse(media).ok_or_else(|| JingleError::UnknownValue {
        what: "media",
        value: media.to_string(),
    })?;
    let mut parsed = ParsedDescription::default();

    for pt in &description.payload_types {
        if pt.name.as_deref() == Some("rtx") {
            continue;
        }
        let name = pt.name.as_deref().ok_or(JingleError::Missing {
            element: "payload-type",
            what: "name",
        })?;
        match CodecKind::parse(name) {
            Some(kind) => parsed.codecs.push(Codec {
                kind,
                tx_pt: pt.id,
                rtx_pt: None,
                rtcp_fbs: pt.rtcp_fbs.clone(),
            }),
            None => warn!(target: "Jingle", "unknown codec {name}"),
        }
    }

    // pair retransmission payload types with their primaries via `apt`
    for pt in &description.payload_types {
        if pt.name.as_deref() != Some("rtx") {
            continue;
        }
        for parameter in &pt.parameters {
            if parameter.name != "apt" {
                continue;
            }
            let apt = parameter.value.as_deref().and_then(|v| v.parse::<u8>().ok());
            let Some(apt) = apt else {
                warn!(target: "Jingle", "invalid apt {:?}", parameter.value);
                continue;
            };
            if let Some(codec) = parsed.codecs.iter_mut().find(|codec| codec.tx_pt == apt) {
                codec.rtx_pt = Some(pt.id);
            }
            break;
        }
    }

    for ext in &description.header_exts {
        if ext.uri == RTP_HDREXT_SSRC_AUDIO_LEVEL {
            parsed.audio_hdrext_ssrc_audio_level = Some(ext.id);
        } else if ext.uri == RTP_HDREXT_TRANSPORT_CC {
            match media_kind {
                MediaKind::Audio => parsed.audio_hdrext_transport_cc = Some(ext.id),
                MediaKind::Video => parsed.video_hdrext_transport_cc = Some(ext.id),
            }
        } else {
            warn!(target: "Jingle", "unsupported rtp header extension {}", ext.uri);
        }
    }

    for source in &description.sources {
        ssrc_map.insert(
            source.ssrc,
            SsrcEntry {
                ssrc: source.ssrc,
                kind: media_kind,
                participant_id: source.owner.clone().unwrap_or_default(),
            },
        );
    }
    Ok(parsed)
}
