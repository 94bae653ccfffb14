//! Call control through a baresip child process
//!
//! baresip is driven over its interactive console: `d <uri>` dials, `b`
//! hangs up, `q` quits. Progress is recognised from its log lines.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{CallControl, CallError};
use crate::audio::find_program;
use crate::config::CallConfig;
use crate::events::{CallState, Event, EventSender};

/// How long to wait for baresip to quit before killing it
const QUIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum CallCommand {
    Dial(String),
    Hangup,
    Shutdown,
}

/// What a console line from baresip means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineEvent {
    Registered,
    Established,
    Ended,
}

fn classify(line: &str) -> Option<LineEvent> {
    if line.contains("registered successfully") {
        Some(LineEvent::Registered)
    } else if line.contains("Call established") {
        Some(LineEvent::Established)
    } else if (line.contains("Call with") && line.contains("terminated"))
        || line.contains("terminate call")
    {
        Some(LineEvent::Ended)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Startup,
    Ready,
    Dialing,
    OnCall,
}

/// Call progress as seen from baresip's console
#[derive(Debug)]
struct Session {
    phase: Phase,
}

impl Session {
    fn new() -> Self {
        Self {
            phase: Phase::Startup,
        }
    }

    /// Apply a console line, returning the notifications it produces
    fn on_line(&mut self, event: LineEvent) -> Vec<CallState> {
        match (self.phase, event) {
            (Phase::Startup, LineEvent::Registered) => {
                self.phase = Phase::Ready;
                vec![CallState::Ready]
            }
            (Phase::Dialing, LineEvent::Established) => {
                self.phase = Phase::OnCall;
                vec![CallState::OnCall]
            }
            (Phase::Dialing | Phase::OnCall, LineEvent::Ended) => {
                self.phase = Phase::Ready;
                vec![CallState::Terminated, CallState::Ready]
            }
            (phase, event) => {
                debug!(?phase, ?event, "console line ignored");
                Vec::new()
            }
        }
    }

    fn can_dial(&self) -> bool {
        self.phase == Phase::Ready
    }

    fn in_call(&self) -> bool {
        matches!(self.phase, Phase::Dialing | Phase::OnCall)
    }
}

/// Handle for sending commands to the call task
#[derive(Debug, Clone)]
pub struct CallController {
    tx: mpsc::UnboundedSender<CallCommand>,
}

/// Owner of the call task, used to shut it down
#[derive(Debug)]
pub struct CallTask {
    tx: mpsc::UnboundedSender<CallCommand>,
    task: JoinHandle<()>,
}

impl CallController {
    pub fn spawn(config: &CallConfig, bus: EventSender) -> Result<(Self, CallTask), CallError> {
        let program = find_program(&config.program)
            .ok_or_else(|| CallError::MissingProgram(config.program.clone()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_call(
            program,
            config.config_dir.clone(),
            config.register_timeout(),
            config.dial_timeout(),
            rx,
            bus,
        ));

        Ok((Self { tx: tx.clone() }, CallTask { tx, task }))
    }

    fn send(&self, command: CallCommand) {
        if self.tx.send(command).is_err() {
            warn!("call task is gone");
        }
    }
}

impl CallControl for CallController {
    fn dial(&mut self, destination: &str) {
        self.send(CallCommand::Dial(destination.to_owned()));
    }

    fn hangup(&mut self) {
        self.send(CallCommand::Hangup);
    }
}

impl CallTask {
    /// Quit baresip and wait for the task to exit
    pub async fn shutdown(self) {
        let _ = self.tx.send(CallCommand::Shutdown);
        if let Err(e) = self.task.await {
            warn!(?e, "call task ended abnormally");
        }
        info!("call subsystem stopped");
    }
}

async fn send_line(stdin: &mut ChildStdin, line: &str) {
    let mut bytes = line.as_bytes().to_vec();
    bytes.push(b'\n');
    if let Err(e) = stdin.write_all(&bytes).await {
        warn!(error = %e, "failed to write to baresip");
    }
    let _ = stdin.flush().await;
}

async fn run_call(
    program: PathBuf,
    config_dir: PathBuf,
    register_timeout: Duration,
    dial_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<CallCommand>,
    bus: EventSender,
) {
    let spawned = Command::new(&program)
        .arg("-f")
        .arg(&config_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            warn!(?program, error = %e, "failed to start call client, calls disabled");
            bus.send(Event::CallState {
                state: CallState::Terminated,
            });
            drain_commands(rx).await;
            return;
        }
    };

    let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        warn!("call client has no console pipes, calls disabled");
        let _ = child.kill().await;
        drain_commands(rx).await;
        return;
    };
    let mut lines = BufReader::new(stdout).lines();

    info!(?program, ?config_dir, "call client started");

    let mut session = Session::new();
    let register_deadline = Instant::now() + register_timeout;
    let mut dial_deadline = Instant::now();
    let mut quit = false;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let Some(event) = classify(&line) else { continue };
                    for state in session.on_line(event) {
                        info!(%state, "call state");
                        bus.send(Event::CallState { state });
                    }
                }
                Ok(None) => {
                    warn!("call client exited");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read call client output");
                    break;
                }
            },

            command = rx.recv() => match command {
                Some(CallCommand::Dial(destination)) => {
                    if session.can_dial() {
                        info!(%destination, "dialing");
                        send_line(&mut stdin, &format!("d {}", destination)).await;
                        session.phase = Phase::Dialing;
                        dial_deadline = Instant::now() + dial_timeout;
                        bus.send(Event::CallState { state: CallState::Dialing });
                    } else {
                        warn!(phase = ?session.phase, %destination, "cannot dial now");
                    }
                }
                Some(CallCommand::Hangup) => {
                    if session.in_call() {
                        info!("hanging up");
                        send_line(&mut stdin, "b").await;
                    } else {
                        debug!(phase = ?session.phase, "hangup with no call");
                    }
                }
                Some(CallCommand::Shutdown) | None => {
                    quit = true;
                    break;
                }
            },

            _ = tokio::time::sleep_until(register_deadline), if session.phase == Phase::Startup => {
                warn!(?register_timeout, "call client failed to register, calls disabled");
                break;
            }

            _ = tokio::time::sleep_until(dial_deadline), if session.phase == Phase::Dialing => {
                info!(?dial_timeout, "call not answered, hanging up");
                send_line(&mut stdin, "b").await;
                // Wait for the terminated line rather than firing again
                dial_deadline = Instant::now() + dial_timeout;
            }
        }
    }

    if quit && session.in_call() {
        send_line(&mut stdin, "b").await;
    }
    send_line(&mut stdin, "q").await;
    drop(stdin);

    match tokio::time::timeout(QUIT_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "call client exited"),
        _ => {
            let _ = child.kill().await;
        }
    }

    bus.send(Event::CallState {
        state: CallState::Terminated,
    });

    if !quit {
        drain_commands(rx).await;
    }
}

/// Swallow commands until shutdown once the client is gone
async fn drain_commands(mut rx: mpsc::UnboundedReceiver<CallCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            CallCommand::Shutdown => break,
            other => warn!(command = ?other, "call subsystem unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, EventReceiver};

    #[test]
    fn test_classify_console_lines() {
        assert_eq!(
            classify("sip:me@example.org: 200 OK (registered successfully)"),
            Some(LineEvent::Registered)
        );
        assert_eq!(
            classify("sip:me@example.org: Call established: sip:you@example.org"),
            Some(LineEvent::Established)
        );
        assert_eq!(
            classify("sip:me@example.org: Call with sip:you@example.org terminated (duration: 5 sec)"),
            Some(LineEvent::Ended)
        );
        assert_eq!(classify("session: terminate call"), Some(LineEvent::Ended));
        assert_eq!(classify("ua: starting"), None);
    }

    #[test]
    fn test_session_transitions() {
        let mut session = Session::new();
        assert!(!session.can_dial());
        assert!(session.on_line(LineEvent::Established).is_empty());

        assert_eq!(session.on_line(LineEvent::Registered), vec![CallState::Ready]);
        assert!(session.can_dial());

        session.phase = Phase::Dialing;
        assert!(session.in_call());
        assert_eq!(session.on_line(LineEvent::Established), vec![CallState::OnCall]);
        assert_eq!(
            session.on_line(LineEvent::Ended),
            vec![CallState::Terminated, CallState::Ready]
        );
        assert!(!session.in_call());
    }

    /// A shell script standing in for baresip. The controller runs
    /// `<program> -f <config_dir>`, which with `sh` means "run this script".
    const FAKE_BARESIP: &str = r#"
echo "ua: registered successfully"
while read -r cmd arg; do
  case "$cmd" in
    d) echo "Call established: $arg" ;;
    b) echo "Call with peer terminated" ;;
    q) exit 0 ;;
  esac
done
"#;

    async fn next_state(rx: &mut EventReceiver) -> Option<CallState> {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Event::CallState { state })) => Some(state),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_dial_and_hangup_against_fake_client() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("baresip.sh");
        std::fs::write(&script, FAKE_BARESIP).unwrap();

        let config = CallConfig {
            enabled: true,
            program: "sh".into(),
            config_dir: script,
            register_timeout_secs: 5,
            dial_timeout_secs: 60,
        };

        let (tx, mut rx) = events::channel();
        let (mut controller, task) = CallController::spawn(&config, tx).unwrap();

        assert_eq!(next_state(&mut rx).await, Some(CallState::Ready));

        controller.dial("5551234");
        assert_eq!(next_state(&mut rx).await, Some(CallState::Dialing));
        assert_eq!(next_state(&mut rx).await, Some(CallState::OnCall));

        controller.hangup();
        assert_eq!(next_state(&mut rx).await, Some(CallState::Terminated));
        assert_eq!(next_state(&mut rx).await, Some(CallState::Ready));

        tokio::time::timeout(Duration::from_secs(5), task.shutdown())
            .await
            .expect("call task did not stop");
        assert_eq!(next_state(&mut rx).await, Some(CallState::Terminated));
    }

    #[test]
    fn test_missing_program() {
        let config = CallConfig {
            program: "no-such-sip-client".into(),
            ..CallConfig::default()
        };
        let (tx, _rx) = events::channel();
        let err = CallController::spawn(&config, tx).unwrap_err();
        assert!(matches!(err, CallError::MissingProgram(_)));
    }
}
