//! Audio player task
//!
//! Plays one job at a time, one child process per clip. A job that runs to
//! the end is reported on the bus; a stopped job is not.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{find_program, AudioError, AudioSink, Clip};
use crate::config::AudioConfig;
use crate::events::{Event, EventSender, JobId};

#[derive(Debug)]
enum PlayerCommand {
    Play { job: JobId, clips: Vec<Clip> },
    Stop,
    Shutdown,
}

/// How a job left the player
#[derive(Debug)]
enum JobOutcome {
    Finished,
    Stopped,
    Preempted { job: JobId, clips: Vec<Clip> },
    Shutdown,
}

#[derive(Debug, Clone)]
struct Programs {
    speech: PathBuf,
    speech_args: Vec<String>,
    playback: PathBuf,
    playback_args: Vec<String>,
}

impl Programs {
    fn command(&self, clip: &Clip) -> Command {
        let mut command = match clip {
            Clip::Text(text) => {
                let mut command = Command::new(&self.speech);
                command.args(&self.speech_args).arg(text);
                command
            }
            Clip::File(path) => {
                let mut command = Command::new(&self.playback);
                command.args(&self.playback_args).arg(path);
                command
            }
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

/// Handle for issuing jobs to the player task
#[derive(Debug)]
pub struct AudioPlayer {
    tx: mpsc::UnboundedSender<PlayerCommand>,
    next_job: JobId,
}

/// Owner of the player task, used to shut it down
#[derive(Debug)]
pub struct PlayerTask {
    tx: mpsc::UnboundedSender<PlayerCommand>,
    task: JoinHandle<()>,
}

impl AudioPlayer {
    /// Resolve the external programs and start the player task.
    ///
    /// Fails if either program is missing; the device cannot talk without
    /// them.
    pub fn spawn(config: &AudioConfig, bus: EventSender) -> Result<(Self, PlayerTask), AudioError> {
        let speech = find_program(&config.speech_program)
            .ok_or_else(|| AudioError::MissingProgram(config.speech_program.clone()))?;
        let playback = find_program(&config.playback_program)
            .ok_or_else(|| AudioError::MissingProgram(config.playback_program.clone()))?;

        info!(?speech, ?playback, "audio player starting");

        let programs = Programs {
            speech,
            speech_args: config.speech_args.clone(),
            playback,
            playback_args: config.playback_args.clone(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_player(programs, rx, bus));

        Ok((
            Self {
                tx: tx.clone(),
                next_job: 1,
            },
            PlayerTask { tx, task },
        ))
    }

    fn send(&self, command: PlayerCommand) {
        if self.tx.send(command).is_err() {
            warn!("audio player task is gone");
        }
    }
}

impl AudioSink for AudioPlayer {
    fn play(&mut self, clips: Vec<Clip>) -> JobId {
        let job = self.next_job;
        self.next_job += 1;
        debug!(job, clips = clips.len(), "play");
        self.send(PlayerCommand::Play { job, clips });
        job
    }

    fn stop(&mut self) {
        self.send(PlayerCommand::Stop);
    }
}

impl PlayerTask {
    /// Kill whatever is playing and wait for the task to exit
    pub async fn shutdown(self) {
        let _ = self.tx.send(PlayerCommand::Shutdown);
        if let Err(e) = self.task.await {
            warn!(?e, "audio player task ended abnormally");
        }
        info!("audio player stopped");
    }
}

async fn run_player(
    programs: Programs,
    mut rx: mpsc::UnboundedReceiver<PlayerCommand>,
    bus: EventSender,
) {
    let mut preempted: Option<(JobId, Vec<Clip>)> = None;

    loop {
        let (job, clips) = match preempted.take() {
            Some(next) => next,
            None => match rx.recv().await {
                Some(PlayerCommand::Play { job, clips }) => (job, clips),
                // Nothing playing
                Some(PlayerCommand::Stop) => continue,
                Some(PlayerCommand::Shutdown) | None => break,
            },
        };

        match play_job(&programs, job, clips, &mut rx).await {
            JobOutcome::Finished => {
                debug!(job, "job finished");
                bus.send(Event::AudioDone { job });
            }
            JobOutcome::Stopped => {
                debug!(job, "job stopped");
            }
            JobOutcome::Preempted { job: next, clips } => {
                warn!(job, next, "job replaced before it was stopped");
                preempted = Some((next, clips));
            }
            JobOutcome::Shutdown => break,
        }
    }

    debug!("audio player loop exited");
}

async fn play_job(
    programs: &Programs,
    job: JobId,
    clips: Vec<Clip>,
    rx: &mut mpsc::UnboundedReceiver<PlayerCommand>,
) -> JobOutcome {
    for clip in clips {
        let mut child = match programs.command(&clip).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(job, ?clip, error = %e, "failed to start audio process");
                continue;
            }
        };

        let interrupted = tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) if !status.success() => {
                        warn!(job, ?clip, %status, "audio process failed");
                    }
                    Err(e) => warn!(job, error = %e, "failed to wait for audio process"),
                    _ => {}
                }
                None
            }
            command = rx.recv() => Some(match command {
                Some(PlayerCommand::Stop) => JobOutcome::Stopped,
                Some(PlayerCommand::Play { job, clips }) => JobOutcome::Preempted { job, clips },
                Some(PlayerCommand::Shutdown) | None => JobOutcome::Shutdown,
            }),
        };

        if let Some(outcome) = interrupted {
            if let Err(e) = child.kill().await {
                debug!(job, error = %e, "audio process already gone");
            }
            return outcome;
        }
    }

    JobOutcome::Finished
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, EventReceiver};
    use std::time::Duration;

    /// Speech is `sleep <text>`, so the text sets the clip length in seconds
    fn config() -> AudioConfig {
        AudioConfig {
            speech_program: "sleep".into(),
            speech_args: Vec::new(),
            playback_program: "true".into(),
            playback_args: Vec::new(),
            beep_path: PathBuf::from("beep.wav"),
        }
    }

    fn speak(player: &mut AudioPlayer, seconds: &str) -> JobId {
        player.play(vec![Clip::Text(seconds.into())])
    }

    async fn next_event(rx: &mut EventReceiver) -> Option<Event> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_natural_completion_is_reported() {
        let (tx, mut rx) = events::channel();
        let (mut player, task) = AudioPlayer::spawn(&config(), tx).unwrap();

        let job = speak(&mut player, "0");
        assert_eq!(next_event(&mut rx).await, Some(Event::AudioDone { job }));

        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_multi_clip_job_reports_once() {
        let (tx, mut rx) = events::channel();
        let (mut player, task) = AudioPlayer::spawn(&config(), tx).unwrap();

        let job = player.play(vec![
            Clip::Text("0".into()),
            Clip::File(PathBuf::from("message.wav")),
        ]);
        assert_eq!(next_event(&mut rx).await, Some(Event::AudioDone { job }));

        task.shutdown().await;
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_stop_suppresses_completion() {
        let (tx, mut rx) = events::channel();
        let (mut player, task) = AudioPlayer::spawn(&config(), tx).unwrap();

        let stopped = speak(&mut player, "30");
        tokio::time::sleep(Duration::from_millis(100)).await;
        player.stop();

        let next = speak(&mut player, "0");
        assert_ne!(stopped, next);
        assert_eq!(next_event(&mut rx).await, Some(Event::AudioDone { job: next }));

        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_noop() {
        let (tx, mut rx) = events::channel();
        let (mut player, task) = AudioPlayer::spawn(&config(), tx).unwrap();

        player.stop();
        player.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_none());

        let job = speak(&mut player, "0");
        assert_eq!(next_event(&mut rx).await, Some(Event::AudioDone { job }));

        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_kills_running_job() {
        let (tx, mut rx) = events::channel();
        let (mut player, task) = AudioPlayer::spawn(&config(), tx).unwrap();

        speak(&mut player, "30");
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::time::timeout(Duration::from_secs(5), task.shutdown())
            .await
            .expect("player did not shut down");
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_missing_program_is_fatal() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let (tx, _rx) = events::channel();
        let mut config = config();
        config.speech_program = "no-such-speech-synth".into();
        let err = AudioPlayer::spawn(&config, tx).unwrap_err();
        assert!(matches!(err, AudioError::MissingProgram(p) if p == "no-such-speech-synth"));
    }
}
