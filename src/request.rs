use crate::conference::{Conference, ConferenceError};
use crate::xml::Element;
use log::warn;
use std::sync::atomic::{AtomicU64, Ordering};

// Correlation ids only need to be unique across a process; the serial is
// shared by the negotiator and every conference controller.
static IQ_SERIAL: AtomicU64 = AtomicU64::new(0);

pub fn generate_iq_id() -> String {
    format!("iq_{}", IQ_SERIAL.fetch_add(1, Ordering::Relaxed) + 1)
}

/// Invoked with `true` on an `iq type=result` reply, `false` on `error`.
pub type IqResultHandler = Box<dyn FnOnce(bool) + Send>;

/// An outstanding correlated request. A missing handler means
/// fire-and-forget; the reply still clears the entry.
pub(crate) struct SentIq {
    pub id: String,
    pub on_result: Option<IqResultHandler>,
}

impl Conference {
    /// Stamps `iq` with a fresh correlation id, records it in the pending
    /// list, and hands the serialized form to the transport. The pending
    /// entry is appended strictly before the frame is sent. Returns the id.
    pub async fn send_iq(
        &self,
        mut iq: Element,
        on_result: Option<IqResultHandler>,
    ) -> Result<String, ConferenceError> {
        let id = generate_iq_id();
        iq.attrs.insert("id".to_string(), id.clone());
        self.sent_iqs.lock().await.push(SentIq {
            id: id.clone(),
            on_result,
        });

        if let Err(e) = self.send_element(&iq).await {
            self.sent_iqs.lock().await.retain(|sent| sent.id != id);
            return Err(e);
        }
        Ok(id)
    }

    /// Delivers a `result`/`error` frame to the first pending entry with a
    /// matching id. A non-match logs one warning and is dropped.
    pub(crate) async fn deliver_iq_result(&self, id: &str, success: bool) -> bool {
        let mut pending = self.sent_iqs.lock().await;
        let Some(index) = pending.iter().position(|sent| sent.id == id) else {
            drop(pending);
            warn!(target: "Conference/IQ", "stray iq result");
            return false;
        };
        let sent = pending.remove(index);
        drop(pending);

        if !success {
            warn!(target: "Conference/IQ", "iq {id} failed");
        }
        if let Some(handler) = sent.on_result {
            handler(success);
        }
        true
    }
}
