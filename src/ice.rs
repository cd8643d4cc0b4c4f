//! ICE agent adapter. The session engine only ever talks to the
//! [`IceAgent`]/[`IceAgentFactory`] contracts; the default implementation
//! wraps the `webrtc-ice` agent and drives candidate gathering to
//! completion before handing the agent back.

use crate::jingle::{CandidateKind, IceUdpTransport};
use crate::types::ServiceEndpoint;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::timeout;
use webrtc_ice::agent::Agent;
use webrtc_ice::agent::agent_config::AgentConfig;
use webrtc_ice::candidate::CandidateType;
use webrtc_ice::network_type::NetworkType;
use webrtc_ice::url::{ProtoType, SchemeType, Url};

const DEFAULT_STUN_PORT: u16 = 3478;
const DEFAULT_TURNS_PORT: u16 = 5349;
const GATHERING_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum IceError {
    #[error("ice agent failure: {0}")]
    Agent(String),
    #[error("timed out waiting for candidate gathering")]
    GatheringTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCredentials {
    pub ufrag: String,
    pub pwd: String,
}

/// A locally gathered candidate, already shaped for the answer transport.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCandidate {
    pub component: u8,
    pub foundation: String,
    pub priority: u32,
    pub ip: String,
    pub port: u16,
    pub kind: CandidateKind,
}

/// Handle to a live agent. Gathering is complete by the time a factory
/// returns one, so `local_candidates` never blocks on the network.
#[async_trait]
pub trait IceAgent: Send + Sync {
    async fn local_credentials(&self) -> Result<IceCredentials, IceError>;
    async fn local_candidates(&self) -> Result<Vec<LocalCandidate>, IceError>;
    async fn close(&self);
}

#[async_trait]
pub trait IceAgentFactory: Send + Sync {
    /// Creates an agent programmed with the discovered STUN server and
    /// TURN-TLS relay, primes it with the remote credentials when an offer
    /// transport is available, and gathers candidates.
    async fn setup(
        &self,
        services: &[ServiceEndpoint],
        remote: Option<&IceUdpTransport>,
    ) -> Result<Box<dyn IceAgent>, IceError>;
}

/// Default factory backed by the `webrtc-ice` agent.
#[derive(Debug, Default)]
pub struct WebRtcIceFactory;

#[async_trait]
impl IceAgentFactory for WebRtcIceFactory {
    async fn setup(
        &self,
        services: &[ServiceEndpoint],
        remote: Option<&IceUdpTransport>,
    ) -> Result<Box<dyn IceAgent>, IceError> {
        let mut urls = Vec::new();
        if let Some(stun) = services.iter().find(|s| s.kind == "stun") {
            let port = if stun.port != 0 { stun.port } else { DEFAULT_STUN_PORT };
            debug!(target: "Ice", "stun server: {}:{}", stun.host, port);
            urls.push(Url {
                scheme: SchemeType::Stun,
                host: stun.host.clone(),
                port,
                proto: ProtoType::Udp,
                username: String::new(),
                password: String::new(),
            });
        }
        if let Some(turn) = services.iter().find(|s| s.kind == "turns") {
            let port = if turn.port != 0 { turn.port } else { DEFAULT_TURNS_PORT };
            debug!(target: "Ice", "turn server: {}:{}", turn.host, port);
            urls.push(Url {
                scheme: SchemeType::Turns,
                host: turn.host.clone(),
                port,
                proto: ProtoType::Tcp,
                username: turn.username.clone().unwrap_or_default(),
                password: turn.password.clone().unwrap_or_default(),
            });
        }

        let config = AgentConfig {
            urls,
            network_types: vec![NetworkType::Udp4, NetworkType::Udp6],
            ..Default::default()
        };
        let agent = Agent::new(config)
            .await
            .map_err(|e| IceError::Agent(e.to_string()))?;

        let gathered = Arc::new(Notify::new());
        let on_done = gathered.clone();
        agent.on_candidate(Box::new(move |candidate| {
            match candidate {
                Some(candidate) => debug!(target: "Ice", "local candidate: {candidate}"),
                None => on_done.notify_one(),
            }
            Box::pin(async {})
        }));

        if let Some(remote) = remote {
            agent
                .set_remote_credentials(remote.ufrag.clone(), remote.pwd.clone())
                .await
                .map_err(|e| IceError::Agent(e.to_string()))?;
        }

        agent
            .gather_candidates()
            .map_err(|e| IceError::Agent(e.to_string()))?;
        timeout(GATHERING_TIMEOUT, gathered.notified())
            .await
            .map_err(|_| IceError::GatheringTimeout)?;

        Ok(Box::new(WebRtcIceAgent { agent }))
    }
}

struct WebRtcIceAgent {
    agent: Agent,
}

#[async_trait]
impl IceAgent for WebRtcIceAgent {
    async fn local_credentials(&self) -> Result<IceCredentials, IceError> {
        let (ufrag, pwd) = self.agent.get_local_user_credentials().await;
        Ok(IceCredentials { ufrag, pwd })
    }

    async fn local_candidates(&self) -> Result<Vec<LocalCandidate>, IceError> {
        let candidates = self
            .agent
            .get_local_candidates()
            .await
            .map_err(|e| IceError::Agent(e.to_string()))?;
        let mut out = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let kind = match candidate.candidate_type() {
                CandidateType::Host => CandidateKind::Host,
                CandidateType::ServerReflexive => CandidateKind::Srflx,
                CandidateType::PeerReflexive => CandidateKind::Prflx,
                CandidateType::Relay => CandidateKind::Relay,
                other => {
                    warn!(target: "Ice", "skipping candidate of unknown type {other}");
                    continue;
                }
            };
            out.push(LocalCandidate {
                component: candidate.component() as u8,
                foundation: candidate.foundation(),
                priority: candidate.priority(),
                ip: candidate.address(),
                port: candidate.port(),
                kind,
            });
        }
        Ok(out)
    }

    async fn close(&self) {
        if let Err(e) = self.agent.close().await {
            warn!(target: "Ice", "failed to close agent: {e}");
        }
    }
}
