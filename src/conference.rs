//! Conference membership controller: room create, capability
//! advertisement, presence and roster tracking, Jingle action dispatch and
//! correlated request accounting, driven by inbound frames.

use crate::caps::{self, CapsDigest};
use crate::jingle::{self, Action, JingleError};
use crate::request::SentIq;
use crate::session::{CodecKind, JingleHandler};
use crate::transport::Transport;
use crate::types::{Jid, Participant};
use crate::xml::{Element, ElementBuilder, XmlError, parser};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{Mutex, Notify};

const DEFAULT_MACHINE_UID: &str = "5f1d9a46-8c2e-4b37-b7a9-3d0e61c482af";

#[derive(Debug, Error)]
pub enum ConferenceError {
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error(transparent)]
    Jingle(#[from] JingleError),
}

/// Controller lifecycle, advanced only by inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Discovering,
    Joining,
    Active,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Local full Jid assigned during stream negotiation.
    pub jid: Jid,
    pub room: String,
    pub nick: String,
    pub machine_uid: String,
    pub video_codec: CodecKind,
    pub audio_muted: bool,
    pub video_muted: bool,
}

impl Config {
    pub fn new(jid: Jid, room: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            jid,
            room: room.into(),
            nick: nick.into(),
            machine_uid: DEFAULT_MACHINE_UID.to_string(),
            video_codec: CodecKind::H264,
            audio_muted: false,
            video_muted: false,
        }
    }

    pub fn focus_jid(&self) -> Jid {
        Jid::new("focus", format!("auth.{}", self.jid.domain)).with_resource("focus")
    }

    pub fn muc_jid(&self) -> Jid {
        Jid::new(self.room.clone(), format!("conference.{}", self.jid.domain))
    }

    pub fn muc_local_jid(&self) -> Jid {
        self.muc_jid().with_resource(muc_resource(&self.jid.node))
    }

    pub fn muc_local_focus_jid(&self) -> Jid {
        self.muc_jid().with_resource("focus")
    }
}

/// First non-empty hyphen-delimited segment of the local node.
fn muc_resource(node: &str) -> String {
    node.split('-')
        .find(|segment| !segment.is_empty())
        .unwrap_or(node)
        .to_string()
}

/// Capability set injected at construction; every callback is
/// independently optional.
#[derive(Default)]
pub struct ConferenceCallbacks {
    pub on_participant_joined: Option<Box<dyn Fn(&Participant) + Send + Sync>>,
    pub on_participant_left: Option<Box<dyn Fn(&Participant) + Send + Sync>>,
    /// `(participant, is_audio, muted)`
    pub on_mute_changed: Option<Box<dyn Fn(&Participant, bool, bool) + Send + Sync>>,
}

pub struct Conference {
    pub config: Config,
    caps: CapsDigest,
    disco_info: Element,
    callbacks: ConferenceCallbacks,
    jingle_handler: Arc<JingleHandler>,
    transport: Arc<dyn Transport>,
    phase: Mutex<Phase>,
    buffer: Mutex<String>,
    pending_create_id: Mutex<Option<String>>,
    pub(crate) sent_iqs: Mutex<Vec<SentIq>>,
    participants: Mutex<HashMap<String, Participant>>,
    pub(crate) shutdown: Notify,
    weak_self: Weak<Conference>,
}

impl Conference {
    pub fn new(
        config: Config,
        callbacks: ConferenceCallbacks,
        jingle_handler: Arc<JingleHandler>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let disco_info = caps::disco_info();
        // computed once; stable for the lifetime of the controller
        let caps = caps::compute(&disco_info);
        Arc::new_cyclic(|weak_self| Self {
            config,
            caps,
            disco_info,
            callbacks,
            jingle_handler,
            transport,
            phase: Mutex::new(Phase::Idle),
            buffer: Mutex::new(String::new()),
            pending_create_id: Mutex::new(None),
            sent_iqs: Mutex::new(Vec::new()),
            participants: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
            weak_self: weak_self.clone(),
        })
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.lock().await
    }

    pub async fn participants(&self) -> Vec<Participant> {
        self.participants.lock().await.values().cloned().collect()
    }

    /// Asks the focus to create (or join) the room, then awaits
    /// `ready=true` before announcing presence.
    pub async fn start_negotiation(&self) -> Result<(), ConferenceError> {
        *self.phase.lock().await = Phase::Discovering;
        let iq = ElementBuilder::new("iq")
            .attr("to", self.config.focus_jid().to_full())
            .attr("type", "set")
            .child(
                ElementBuilder::new("conference")
                    .attr("xmlns", "http://jitsi.org/protocol/focus")
                    .attr("machine-uid", &self.config.machine_uid)
                    .attr("room", self.config.muc_jid().to_bare())
                    .child(
                        ElementBuilder::new("property")
                            .attr("stereo", "false")
                            .build(),
                    )
                    .child(
                        ElementBuilder::new("property")
                            .attr("startBitrate", "800")
                            .build(),
                    )
                    .build(),
            )
            .build();
        let id = self.send_iq(iq, None).await?;
        *self.pending_create_id.lock().await = Some(id);
        Ok(())
    }

    /// Appends inbound bytes to the frame accumulator and dispatches every
    /// complete stanza. Recoverable conditions are logged and skipped;
    /// a returned error is terminal for the controller.
    pub async fn feed(&self, payload: &str) -> Result<(), ConferenceError> {
        let mut buffer = self.buffer.lock().await;
        buffer.push_str(payload);
        loop {
            match parser::parse(&buffer) {
                Ok((element, consumed)) => {
                    buffer.drain(..consumed);
                    self.dispatch(element).await?;
                }
                Err(XmlError::Incomplete) => break,
                Err(e) => {
                    warn!(target: "Conference", "xml parse error: {e}");
                    buffer.clear();
                    break;
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&self, element: Element) -> Result<(), ConferenceError> {
        match element.name.as_str() {
            "iq" => self.handle_iq(&element).await,
            "presence" => {
                self.handle_presence(&element).await;
                Ok(())
            }
            other => {
                warn!(target: "Conference", "not implemented xmpp message {other}");
                Ok(())
            }
        }
    }

    async fn handle_iq(&self, iq: &Element) -> Result<(), ConferenceError> {
        match iq.attr("type") {
            Some("get") => {
                self.handle_iq_get(iq).await?;
                Ok(())
            }
            Some("set") => self.handle_iq_set(iq).await,
            Some("result") => self.handle_iq_result(iq, true).await,
            Some("error") => self.handle_iq_result(iq, false).await,
            other => {
                warn!(target: "Conference", "iq with unhandled type {other:?}");
                Ok(())
            }
        }
    }

    /// Disco-info probe. A `node` attribute, when present, must match
    /// `<caps-node>#<sha1>`; mismatches are silently dropped.
    async fn handle_iq_get(&self, iq: &Element) -> Result<(), ConferenceError> {
        let (Some(from), Some(id)) = (iq.attr("from"), iq.attr("id")) else {
            warn!(target: "Conference", "iq get without from/id");
            return Ok(());
        };
        let Some(query) = iq.find_child("query") else {
            warn!(target: "Conference", "iq get without query");
            return Ok(());
        };

        let mut info = self.disco_info.clone();
        if let Some(node) = query.attr("node") {
            let Some((uri, hash)) = node.rsplit_once('#') else {
                return Ok(());
            };
            if uri != caps::CAPS_NODE || hash != self.caps.sha1_b64 {
                return Ok(());
            }
            info = info.with_attr("node", node);
        }

        let reply = ElementBuilder::new("iq")
            .attr("from", self.config.jid.to_full())
            .attr("to", from)
            .attr("id", id)
            .attr("type", "result")
            .child(info)
            .build();
        self.send_element(&reply).await
    }

    async fn handle_iq_set(&self, iq: &Element) -> Result<(), ConferenceError> {
        let Some(from) = iq.attr("from") else {
            warn!(target: "Conference", "iq set without from");
            return Ok(());
        };
        let Ok(from_jid) = from.parse::<Jid>() else {
            warn!(target: "Conference", "iq set with unparseable from {from}");
            return Ok(());
        };
        if from_jid.resource != "focus" {
            warn!(target: "Conference", "iq set from non-focus resource {from}");
            return Ok(());
        }
        let Some(id) = iq.attr("id") else {
            warn!(target: "Conference", "iq set without id");
            return Ok(());
        };
        let Some(jingle_node) = iq.find_child("jingle") else {
            warn!(target: "Conference", "iq set without jingle payload");
            return Ok(());
        };

        let jingle = match jingle::parser::parse(jingle_node) {
            Ok(jingle) => jingle,
            Err(JingleError::UnknownAction(action)) => {
                warn!(target: "Conference", "unknown jingle action {action}");
                return self.ack_iq(from, id).await;
            }
            Err(e) => return Err(e.into()),
        };

        debug!(target: "Conference", "jingle action {}", jingle.action.as_str());
        match jingle.action {
            Action::SessionInitiate => {
                self.jingle_handler.on_initiate(jingle).await?;
                self.enter_active().await;
            }
            Action::SourceAdd => self.jingle_handler.on_add_source(jingle).await?,
            Action::SessionTerminate => {
                self.ack_iq(from, id).await?;
                info!(target: "Conference", "session terminated by remote");
                self.terminate().await;
                return Ok(());
            }
            other => {
                warn!(target: "Conference", "unimplemented jingle action {}", other.as_str())
            }
        }
        self.ack_iq(from, id).await
    }

    async fn ack_iq(&self, to: &str, id: &str) -> Result<(), ConferenceError> {
        let ack = ElementBuilder::new("iq")
            .attr("from", self.config.jid.to_full())
            .attr("to", to)
            .attr("id", id)
            .attr("type", "result")
            .build();
        self.send_element(&ack).await
    }

    async fn handle_iq_result(&self, iq: &Element, success: bool) -> Result<(), ConferenceError> {
        let Some(id) = iq.attr("id") else {
            warn!(target: "Conference", "iq result without id");
            return Ok(());
        };

        let awaiting_create = {
            let pending = self.pending_create_id.lock().await;
            pending.as_deref() == Some(id)
        };
        if awaiting_create {
            *self.pending_create_id.lock().await = None;
            self.deliver_iq_result(id, success).await;
            return self.handle_create_reply(iq, success).await;
        }

        self.deliver_iq_result(id, success).await;
        Ok(())
    }

    async fn handle_create_reply(
        &self,
        iq: &Element,
        success: bool,
    ) -> Result<(), ConferenceError> {
        if !success {
            return Err(ConferenceError::Protocol(
                "conference create request failed".to_string(),
            ));
        }
        let ready = iq
            .find_child("conference")
            .map(|conference| conference.is_attr("ready", "true"))
            .unwrap_or(false);
        if !ready {
            return Err(ConferenceError::Protocol(
                "conference not ready".to_string(),
            ));
        }

        info!(target: "Conference", "conference ready, joining {}", self.config.muc_jid().to_bare());
        self.send_join_presence().await?;
        *self.phase.lock().await = Phase::Joining;
        Ok(())
    }

    async fn send_join_presence(&self) -> Result<(), ConferenceError> {
        let presence = ElementBuilder::new("presence")
            .attr("to", self.config.muc_local_jid().to_full())
            .child(
                ElementBuilder::new("x")
                    .attr("xmlns", "http://jabber.org/protocol/muc")
                    .build(),
            )
            .child(
                ElementBuilder::new("c")
                    .attr("xmlns", "http://jabber.org/protocol/caps")
                    .attr("hash", "sha-1")
                    .attr("node", caps::CAPS_NODE)
                    .attr("ver", &self.caps.sha1_b64)
                    .build(),
            )
            .child(
                ElementBuilder::new("ecaps2")
                    .attr("xmlns", "urn:xmpp:caps")
                    .child(
                        ElementBuilder::new("hash")
                            .attr("xmlns", "urn:xmpp:hashes:2")
                            .attr("algo", "sha-256")
                            .text(&self.caps.sha256_b64)
                            .build(),
                    )
                    .build(),
            )
            .child(
                ElementBuilder::new("stats-id")
                    .text(caps::CLIENT_NAME)
                    .build(),
            )
            .child(
                ElementBuilder::new("jitsi_participant_codecType")
                    .text(self.config.video_codec.hint())
                    .build(),
            )
            .child(
                ElementBuilder::new("videomuted")
                    .text(bool_str(self.config.video_muted))
                    .build(),
            )
            .child(
                ElementBuilder::new("audiomuted")
                    .text(bool_str(self.config.audio_muted))
                    .build(),
            )
            .child(
                ElementBuilder::new("nick")
                    .attr("xmlns", "http://jabber.org/protocol/nick")
                    .text(&self.config.nick)
                    .build(),
            )
            .build();
        self.send_element(&presence).await
    }

    async fn handle_presence(&self, presence: &Element) {
        let Some(from_jid) = presence.attrs().optional_jid("from") else {
            warn!(target: "Conference", "presence without a usable from");
            return;
        };
        debug!(target: "Conference", "got presence from {from_jid}");

        // non-self members only
        if from_jid.resource == self.config.muc_local_jid().resource {
            return;
        }

        if let Some(kind) = presence.attr("type") {
            if kind == "unavailable" {
                let removed = self.participants.lock().await.remove(&from_jid.resource);
                match removed {
                    Some(participant) => {
                        if let Some(callback) = &self.callbacks.on_participant_left {
                            callback(&participant);
                        }
                    }
                    None => {
                        warn!(target: "Conference", "unavailable presence from unknown participant")
                    }
                }
            }
            return;
        }

        let mut participants = self.participants.lock().await;
        let joined = !participants.contains_key(&from_jid.resource);
        let participant = participants
            .entry(from_jid.resource.clone())
            .or_insert_with(|| Participant {
                participant_id: from_jid.resource.clone(),
                ..Default::default()
            });

        let mut mute_changes = Vec::new();
        for payload in &presence.children {
            match payload.name.as_str() {
                "nick" if payload.is_attr("xmlns", "http://jabber.org/protocol/nick") => {
                    participant.nick = payload.text.clone();
                }
                "audiomuted" => {
                    let muted = payload.text == "true";
                    if participant.audio_muted != muted {
                        participant.audio_muted = muted;
                        mute_changes.push((true, muted));
                    }
                }
                "videomuted" => {
                    let muted = payload.text == "true";
                    if participant.video_muted != muted {
                        participant.video_muted = muted;
                        mute_changes.push((false, muted));
                    }
                }
                _ => {}
            }
        }
        let snapshot = participant.clone();
        drop(participants);

        if joined {
            if let Some(callback) = &self.callbacks.on_participant_joined {
                callback(&snapshot);
            }
        } else if let Some(callback) = &self.callbacks.on_mute_changed {
            for (is_audio, muted) in mute_changes {
                callback(&snapshot, is_audio, muted);
            }
        }
    }

    /// Wraps a built session-accept and sends it correlated to the focus.
    /// A failed acknowledgment is fatal and tears the controller down.
    pub async fn send_session_accept(
        &self,
        accept: &jingle::Jingle,
    ) -> Result<(), ConferenceError> {
        let iq = ElementBuilder::new("iq")
            .attr("from", self.config.jid.to_full())
            .attr("to", self.config.muc_local_focus_jid().to_full())
            .attr("type", "set")
            .child(jingle::writer::write(accept))
            .build();

        let conference = self.weak_self.clone();
        self.send_iq(
            iq,
            Some(Box::new(move |success| {
                if success {
                    return;
                }
                log::error!(target: "Conference", "session-accept was not acknowledged");
                if let Some(conference) = conference.upgrade() {
                    tokio::spawn(async move { conference.terminate().await });
                }
            })),
        )
        .await?;
        Ok(())
    }

    async fn enter_active(&self) {
        let mut phase = self.phase.lock().await;
        if *phase == Phase::Active {
            return;
        }
        *phase = Phase::Active;
        drop(phase);
        if let Some(conference) = self.weak_self.upgrade() {
            tokio::spawn(conference.ping_loop());
        }
    }

    /// Stops the heartbeat, drops pending handlers and disconnects the
    /// transport.
    pub async fn terminate(&self) {
        *self.phase.lock().await = Phase::Terminated;
        self.shutdown.notify_waiters();
        self.sent_iqs.lock().await.clear();
        self.transport.disconnect().await;
    }

    pub(crate) async fn send_element(&self, element: &Element) -> Result<(), ConferenceError> {
        self.transport
            .send_text(&element.to_string())
            .await
            .map_err(ConferenceError::Transport)
    }
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
