//! Input decoding pipeline
//!
//! Raw edges from the hook and dial lines are debounced, then turned into
//! `Hook` and `Dial` events on the bus:
//!
//! ```text
//! hook line -> DebouncedEdgeSource -> HookTracker       -> bus
//! dial line -> DebouncedEdgeSource -> PulseDigitDecoder -> bus
//! ```

#[cfg(not(feature = "gpio"))]
mod console;
mod debounce;
#[cfg(feature = "gpio")]
mod gpio;
mod hook;
mod pulse;

#[cfg(not(feature = "gpio"))]
pub use console::ConsoleLines as Lines;
pub use debounce::DebouncedEdgeSource;
#[cfg(feature = "gpio")]
pub use gpio::GpioLines as Lines;
pub use hook::HookTracker;
pub use pulse::PulseDigitDecoder;

use std::time::Duration;

use pulse::PulseInput;

/// Errors from the line drivers
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("lines are already attached to debouncers")]
    AlreadyAttached,
}

/// Debouncer for the dial line, seeded with the level read at startup.
///
/// Every settled rising edge is one pulse.
pub fn dial_source(initial: bool, bounce: Duration, pulses: PulseInput) -> DebouncedEdgeSource {
    DebouncedEdgeSource::new(initial, bounce, move |level| {
        if level {
            pulses.pulse();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, Digit, Event};
    use crate::lifecycle::Shutdown;

    const BOUNCE: Duration = Duration::from_millis(10);
    const PULSE_TIMEOUT: Duration = Duration::from_millis(150);

    #[tokio::test(start_paused = true)]
    async fn test_dial_line_resting_high_is_not_a_pulse() {
        let shutdown = Shutdown::new();
        let (tx, mut rx) = events::channel();
        let decoder = PulseDigitDecoder::spawn(PULSE_TIMEOUT, tx, shutdown.token());
        let line = dial_source(true, BOUNCE, decoder.input());

        // A glitch that settles back on the resting level
        line.on_raw_transition(false);
        line.on_raw_transition(true);
        tokio::time::sleep(PULSE_TIMEOUT * 3).await;
        assert!(rx.try_recv().is_none());

        // One real pulse: the line drops, then rises again
        line.on_raw_transition(false);
        tokio::time::sleep(BOUNCE * 5).await;
        line.on_raw_transition(true);
        tokio::time::sleep(PULSE_TIMEOUT * 3).await;
        assert_eq!(
            rx.try_recv(),
            Some(Event::Dial {
                digit: Digit::from_pulses(1)
            })
        );

        shutdown.trigger();
        decoder.join().await;
    }
}
