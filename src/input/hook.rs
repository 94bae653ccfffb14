//! Hook switch state tracking

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::events::{Event, EventSender, HookState};

/// Tracks the handset position and announces every change on the bus
#[derive(Debug, Clone)]
pub struct HookTracker {
    state: Arc<Mutex<HookState>>,
    bus: EventSender,
}

impl HookTracker {
    pub fn new(initial: HookState, bus: EventSender) -> Self {
        info!(state = %initial, "initial hook state");
        Self {
            state: Arc::new(Mutex::new(initial)),
            bus,
        }
    }

    /// Feed a debounced level from the hook line
    pub fn on_level_changed(&self, level: bool) {
        let new_state = HookState::from_level(level);
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state == new_state {
            debug!(state = %new_state, "hook level repeated");
            return;
        }

        *state = new_state;
        // Enqueue under the lock so a snapshot never runs ahead of the bus
        self.bus.send(Event::Hook { state: new_state });
        debug!(state = %new_state, "hook changed");
    }

    /// Snapshot of the hook position.
    ///
    /// Only meant for seeding the state machine at startup. Afterwards the
    /// machine follows `Hook` events.
    pub fn current_state(&self) -> HookState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;

    #[test]
    fn test_initial_state() {
        let (tx, _rx) = events::channel();
        let tracker = HookTracker::new(HookState::Off, tx);
        assert_eq!(tracker.current_state(), HookState::Off);
    }

    #[tokio::test]
    async fn test_change_is_announced() {
        let (tx, mut rx) = events::channel();
        let tracker = HookTracker::new(HookState::On, tx);

        tracker.on_level_changed(true);
        assert_eq!(tracker.current_state(), HookState::Off);
        assert_eq!(
            rx.recv().await,
            Some(Event::Hook {
                state: HookState::Off
            })
        );

        tracker.on_level_changed(false);
        assert_eq!(tracker.current_state(), HookState::On);
        assert_eq!(
            rx.recv().await,
            Some(Event::Hook {
                state: HookState::On
            })
        );
    }

    #[test]
    fn test_repeated_level_is_not_announced() {
        let (tx, mut rx) = events::channel();
        let tracker = HookTracker::new(HookState::On, tx);
        tracker.on_level_changed(false);
        assert!(rx.try_recv().is_none());
    }
}
