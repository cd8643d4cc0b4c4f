/// Transport abstraction layer for jitsi-rust
///
/// This module re-exports the transport traits and implementations.
/// The transport layer is responsible for moving whole text frames, while
/// stanza parsing is handled by the core library.
pub use jitsi_rust_tokio_transport::{
    TokioWebSocketTransport, TokioWebSocketTransportFactory, Transport, TransportEvent,
    TransportFactory,
};

#[cfg(test)]
pub mod mock {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// A transport that records every outbound frame, for testing.
    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Mutex<Vec<String>>,
        pub disconnected: Mutex<bool>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn take_sent(&self) -> Vec<String> {
            std::mem::take(&mut self.sent.lock().unwrap())
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send_text(&self, text: &str) -> Result<(), anyhow::Error> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn disconnect(&self) {
            *self.disconnected.lock().unwrap() = true;
        }
    }
}
