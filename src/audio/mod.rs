//! Audio collaborators: speech/file playback and voice recording
//!
//! The state machine only sees the traits defined here. The concrete
//! implementations drive external programs (espeak-ng, aplay, arecord by
//! default).

mod player;
mod recorder;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::events::JobId;

pub use player::AudioPlayer;
pub use recorder::ProcessRecorder;

/// One item of an audio job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clip {
    /// Text rendered by the speech synthesizer
    Text(String),
    /// Audio file played as is
    File(PathBuf),
}

/// Plays audio jobs, reporting natural completion as `AudioDone`
pub trait AudioSink: Send {
    /// Queue a job made of `clips`, played back to back.
    ///
    /// The caller must have stopped the previous job or seen its
    /// completion first.
    fn play(&mut self, clips: Vec<Clip>) -> JobId;

    /// Abort the current job without a completion notification.
    ///
    /// A no-op when nothing is playing.
    fn stop(&mut self);
}

/// Starts voice recordings
pub trait Recorder: Send {
    fn start(&mut self, path: &Path) -> Result<Box<dyn RecordingHandle>, RecordError>;
}

/// A running recording job
#[async_trait]
pub trait RecordingHandle: Send {
    /// Ask the job to finish. Idempotent.
    fn stop(&mut self);

    /// Wait for the job to finish and release the microphone
    async fn join(self: Box<Self>) -> Result<(), RecordError>;
}

/// Errors from the audio player
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("required program not found on PATH: {0}")]
    MissingProgram(String),
}

/// Errors from the recorder
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("required program not found on PATH: {0}")]
    MissingProgram(String),

    #[error("failed to start recording to {path}: {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("recording task failed: {0}")]
    Task(String),
}

/// Locate an executable the way the shell would.
///
/// Absolute or relative paths containing a separator are checked directly.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_owned());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| is_executable(full))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_program_on_path() {
        let sh = find_program("sh").expect("sh should be on PATH");
        assert!(sh.is_absolute());
    }

    #[test]
    fn test_find_program_missing() {
        assert!(find_program("definitely-not-a-real-program-42").is_none());
    }

    #[test]
    fn test_find_program_explicit_path() {
        assert_eq!(find_program("/bin/sh"), Some(PathBuf::from("/bin/sh")));
        assert!(find_program("/nonexistent/bin/sh").is_none());
    }
}
