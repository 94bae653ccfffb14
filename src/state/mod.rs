//! Session orchestration
//!
//! One state machine consumes the event bus and drives the audio, recording
//! and call collaborators:
//! - Idle: handset on hook
//! - MenuRoot: root menu spoken, waiting for a digit
//! - Recording: capturing a message until hang-up
//! - Playback: stored messages, newest first
//! - MakeCall: contact menu spoken, waiting for a digit

mod machine;
mod prompts;

pub use machine::{Collaborators, StateMachine};
