//! Rotary dial pulse counting
//!
//! Each clean rising edge on the dial line is one pulse. Pulses closer
//! together than the pulse timeout belong to the same rotation; once the
//! line stays quiet for a full timeout the rotation is finalized into a
//! `Dial` event.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::events::{Digit, Event, EventSender};
use crate::lifecycle::ShutdownToken;

/// Cheap, cloneable entry point for the dial debouncer
#[derive(Debug, Clone)]
pub struct PulseInput {
    tx: mpsc::UnboundedSender<()>,
}

impl PulseInput {
    /// Record one pulse. Never blocks.
    pub fn pulse(&self) {
        let _ = self.tx.send(());
    }
}

/// Aggregates dial pulses into digits on its own task
pub struct PulseDigitDecoder {
    input: PulseInput,
    task: JoinHandle<()>,
}

impl PulseDigitDecoder {
    /// Start the decoder loop
    pub fn spawn(pulse_timeout: Duration, bus: EventSender, shutdown: ShutdownToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_decoder(pulse_timeout, rx, bus, shutdown));
        Self {
            input: PulseInput { tx },
            task,
        }
    }

    pub fn input(&self) -> PulseInput {
        self.input.clone()
    }

    /// Wait for the loop to exit after shutdown has been triggered
    pub async fn join(self) {
        let PulseDigitDecoder { input, task } = self;
        drop(input);
        if let Err(e) = task.await {
            debug!(?e, "pulse decoder task ended abnormally");
        }
    }
}

async fn run_decoder(
    pulse_timeout: Duration,
    mut pulses: mpsc::UnboundedReceiver<()>,
    bus: EventSender,
    mut shutdown: ShutdownToken,
) {
    info!(?pulse_timeout, "pulse decoder started");

    'idle: loop {
        // Idle until the first pulse of a rotation
        tokio::select! {
            _ = shutdown.cancelled() => break 'idle,
            pulse = pulses.recv() => {
                if pulse.is_none() {
                    break 'idle;
                }
            }
        }

        let mut pending: u32 = 1;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break 'idle,
                next = tokio::time::timeout(pulse_timeout, pulses.recv()) => match next {
                    Ok(Some(())) => pending += 1,
                    Ok(None) => break 'idle,
                    Err(_) => break,
                },
            }
        }

        let digit = Digit::from_pulses(pending);
        debug!(pulses = pending, %digit, "rotation complete");
        bus.send(Event::Dial { digit });
    }

    info!("pulse decoder stopped");
}
