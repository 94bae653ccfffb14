//! Voice recording through an external capture program

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{find_program, RecordError, Recorder, RecordingHandle};
use crate::config::RecordingConfig;

/// Starts one capture process per recording
#[derive(Debug, Clone)]
pub struct ProcessRecorder {
    program: PathBuf,
    args: Vec<String>,
    max_duration: Duration,
}

impl ProcessRecorder {
    /// Resolve the capture program up front; a missing one is fatal
    pub fn new(config: &RecordingConfig) -> Result<Self, RecordError> {
        let program = find_program(&config.program)
            .ok_or_else(|| RecordError::MissingProgram(config.program.clone()))?;
        info!(?program, max_duration = ?config.max_duration(), "recorder ready");

        Ok(Self {
            program,
            args: config.args.clone(),
            max_duration: config.max_duration(),
        })
    }
}

impl Recorder for ProcessRecorder {
    fn start(&mut self, path: &Path) -> Result<Box<dyn RecordingHandle>, RecordError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RecordError::Spawn {
                path: path.to_owned(),
                source,
            })?;

        info!(?path, "recording started");

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(child, stop_rx, self.max_duration, path.to_owned()));

        Ok(Box::new(ProcessRecording {
            stop_tx: Some(stop_tx),
            task,
        }))
    }
}

/// Handle to a running capture process
#[derive(Debug)]
struct ProcessRecording {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

#[async_trait]
impl RecordingHandle for ProcessRecording {
    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    async fn join(self: Box<Self>) -> Result<(), RecordError> {
        let ProcessRecording { stop_tx, task } = *self;
        // Dropping the sender also ends the recording
        drop(stop_tx);
        task.await.map_err(|e| RecordError::Task(e.to_string()))
    }
}

/// Let the capture run until told to stop, it exits, or the time limit hits
async fn supervise(
    mut child: Child,
    stop_rx: oneshot::Receiver<()>,
    max_duration: Duration,
    path: PathBuf,
) {
    tokio::select! {
        _ = stop_rx => {
            debug!(?path, "recording stop requested");
        }
        _ = tokio::time::sleep(max_duration) => {
            warn!(?path, ?max_duration, "recording hit its time limit");
        }
        status = child.wait() => {
            match status {
                Ok(status) => warn!(?path, %status, "capture process exited on its own"),
                Err(e) => warn!(?path, error = %e, "failed to wait for capture process"),
            }
            return;
        }
    }

    if let Err(e) = child.kill().await {
        debug!(?path, error = %e, "capture process already gone");
    }
    info!(?path, "recording complete");
}
