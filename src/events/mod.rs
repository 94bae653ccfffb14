//! Events module for the orchestration state machine
//!
//! Every input source (hook, dial, audio player, call controller) talks to
//! the state machine only by enqueuing one of these values on the bus.

mod bus;

use serde::{Deserialize, Serialize};

pub use bus::{channel, EventReceiver, EventSender};

/// Position of the handset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookState {
    /// Handset resting in the cradle
    On,
    /// Handset lifted
    Off,
}

impl HookState {
    /// Map a debounced hook line level to a hook state.
    ///
    /// The switch closes to ground while the handset rests, so with a pull-up
    /// a high line means the handset is lifted.
    pub fn from_level(level: bool) -> Self {
        if level {
            HookState::Off
        } else {
            HookState::On
        }
    }
}

impl std::fmt::Display for HookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookState::On => write!(f, "HOOK_ON"),
            HookState::Off => write!(f, "HOOK_OFF"),
        }
    }
}

/// A single dialed digit, always in `0..=9`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Digit(u8);

impl Digit {
    /// Build the digit produced by a dial rotation of `pulses` pulses.
    ///
    /// Ten pulses dial zero; longer bursts wrap the same way.
    pub fn from_pulses(pulses: u32) -> Self {
        Digit((pulses % 10) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Digit {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value <= 9 {
            Ok(Digit(value))
        } else {
            Err(format!("digit out of range: {}", value))
        }
    }
}

impl From<Digit> for u8 {
    fn from(digit: Digit) -> Self {
        digit.0
    }
}

impl std::fmt::Display for Digit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one audio job issued to the player
pub type JobId = u64;

/// Call subsystem status notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Registered and able to place a call
    Ready,
    /// Outgoing call in progress, not yet answered
    Dialing,
    /// Call established
    OnCall,
    /// Call ended or the call subsystem went away
    Terminated,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallState::Ready => write!(f, "READY"),
            CallState::Dialing => write!(f, "DIALING"),
            CallState::OnCall => write!(f, "ON_CALL"),
            CallState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Events consumed by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Hook switch changed position
    Hook { state: HookState },

    /// A dial rotation completed
    Dial { digit: Digit },

    /// An audio job drained its queue without being stopped
    AudioDone {
        /// The job that finished
        job: JobId,
    },

    /// The call subsystem changed state
    CallState { state: CallState },

    /// Poison event: drain collaborators and leave the event loop
    Shutdown,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Hook { state } => write!(f, "HOOK({})", state),
            Event::Dial { digit } => write!(f, "DIAL({})", digit),
            Event::AudioDone { job } => write!(f, "AUDIO_DONE(#{})", job),
            Event::CallState { state } => write!(f, "CALL_STATE({})", state),
            Event::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_from_pulses() {
        assert_eq!(Digit::from_pulses(1).value(), 1);
        assert_eq!(Digit::from_pulses(3).value(), 3);
        assert_eq!(Digit::from_pulses(9).value(), 9);
        assert_eq!(Digit::from_pulses(10).value(), 0);
        assert_eq!(Digit::from_pulses(13).value(), 3);
    }

    #[test]
    fn test_digit_rejects_out_of_range() {
        assert!(Digit::try_from(9).is_ok());
        assert!(Digit::try_from(10).is_err());
    }

    #[test]
    fn test_hook_from_level() {
        assert_eq!(HookState::from_level(true), HookState::Off);
        assert_eq!(HookState::from_level(false), HookState::On);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::Dial {
            digit: Digit::from_pulses(7),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("dial"));
        assert!(json.contains('7'));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"hook","state":"off"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            Event::Hook {
                state: HookState::Off
            }
        );

        let bad = r#"{"type":"dial","digit":12}"#;
        assert!(serde_json::from_str::<Event>(bad).is_err());
    }

    #[test]
    fn test_event_display() {
        let event = Event::AudioDone { job: 4 };
        assert_eq!(event.to_string(), "AUDIO_DONE(#4)");
        assert_eq!(Event::Shutdown.to_string(), "SHUTDOWN");
    }
}
