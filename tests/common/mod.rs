//! Shared fixtures: a transport that records outbound frames and an ICE
//! factory with canned credentials and candidates.

use async_trait::async_trait;
use jitsi_rust::ice::{IceAgent, IceAgentFactory, IceCredentials, IceError, LocalCandidate};
use jitsi_rust::jingle::{CandidateKind, IceUdpTransport};
use jitsi_rust::transport::Transport;
use jitsi_rust::types::ServiceEndpoint;
use jitsi_rust::xml::{Element, parser};
use std::sync::Arc;
use std::sync::Mutex;

#[derive(Default)]
pub struct CaptureTransport {
    pub sent: Mutex<Vec<String>>,
    pub disconnected: Mutex<bool>,
}

impl CaptureTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }

    pub fn take_sent_elements(&self) -> Vec<Element> {
        self.take_sent()
            .iter()
            .map(|frame| parser::parse(frame).expect("outbound frame must parse").0)
            .collect()
    }

    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.lock().unwrap()
    }
}

#[async_trait]
impl Transport for CaptureTransport {
    async fn send_text(&self, text: &str) -> Result<(), anyhow::Error> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        *self.disconnected.lock().unwrap() = true;
    }
}

pub struct FixedIceAgent;

#[async_trait]
impl IceAgent for FixedIceAgent {
    async fn local_credentials(&self) -> Result<IceCredentials, IceError> {
        Ok(IceCredentials {
            ufrag: "u".to_string(),
            pwd: "p".to_string(),
        })
    }

    async fn local_candidates(&self) -> Result<Vec<LocalCandidate>, IceError> {
        Ok(vec![
            LocalCandidate {
                component: 1,
                foundation: "1".to_string(),
                priority: 2130706431,
                ip: "192.0.2.10".to_string(),
                port: 10000,
                kind: CandidateKind::Host,
            },
            LocalCandidate {
                component: 1,
                foundation: "2".to_string(),
                priority: 1694498815,
                ip: "198.51.100.7".to_string(),
                port: 10001,
                kind: CandidateKind::Srflx,
            },
        ])
    }

    async fn close(&self) {}
}

#[derive(Default)]
pub struct FixedIceFactory;

#[async_trait]
impl IceAgentFactory for FixedIceFactory {
    async fn setup(
        &self,
        _services: &[ServiceEndpoint],
        _remote: Option<&IceUdpTransport>,
    ) -> Result<Box<dyn IceAgent>, IceError> {
        Ok(Box::new(FixedIceAgent))
    }
}
