//! Event bus between the input sources and the state machine
//!
//! Unbounded multi-producer, single-consumer. Producers never block and
//! events arrive in enqueue order.

use tokio::sync::mpsc;
use tracing::{trace, warn};

use super::Event;

/// Create a connected sender/receiver pair
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer half, cloned once per input source
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Enqueue an event. Safe to call from any thread, async or not.
    pub fn send(&self, event: Event) {
        trace!(%event, "enqueue");
        if self.tx.send(event).is_err() {
            warn!("event bus consumer is gone, dropping event");
        }
    }
}

/// Consumer half, owned by the state machine
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` only once every sender has been dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}
