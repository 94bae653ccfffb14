//! Outbound call subsystem
//!
//! The state machine only issues `dial`/`hangup` and listens for
//! `CallState` events; everything SIP lives behind [`CallControl`].

mod baresip;

pub use baresip::CallController;

/// Commands accepted by the call subsystem
pub trait CallControl: Send {
    /// Place a call to a number or SIP URI
    fn dial(&mut self, destination: &str);

    /// End the current call, if any
    fn hangup(&mut self);
}

/// Errors from the call subsystem
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("required program not found on PATH: {0}")]
    MissingProgram(String),
}
