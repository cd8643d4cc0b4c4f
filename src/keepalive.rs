use crate::conference::{Conference, Phase};
use crate::xml::{Element, ElementBuilder};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

const PING_INTERVAL: Duration = Duration::from_secs(10);

impl Conference {
    /// Heartbeat task: a fire-and-forget ping every 10 seconds. Transient
    /// send failures are ignored; the next tick retries. Exits on the
    /// shutdown notifier.
    pub(crate) async fn ping_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(PING_INTERVAL) => {
                    if self.phase().await == Phase::Terminated {
                        return;
                    }
                    let iq = ElementBuilder::new("iq")
                        .attr("type", "get")
                        .child(Element::new("ping"))
                        .build();
                    if let Err(e) = self.send_iq(iq, None).await {
                        warn!(target: "Conference/Keepalive", "ping failed: {e}");
                    }
                }
                _ = self.shutdown.notified() => {
                    debug!(target: "Conference/Keepalive", "shutdown signaled, exiting ping loop");
                    return;
                }
            }
        }
    }
}
