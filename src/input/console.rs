//! Emulated hook and dial lines driven from stdin
//!
//! Lets the full decoding pipeline run on a workstation. Commands:
//!
//! - `off` lifts the handset, `on` puts it back
//! - `dial 0123` turns the dial once per digit
//!
//! Every synthesized edge carries a little contact bounce so the
//! debouncers see what real hardware produces.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{DebouncedEdgeSource, InputError};
use crate::config::GpioConfig;
use crate::lifecycle::ShutdownToken;

/// Break (line high) portion of one dial pulse
const PULSE_BREAK: Duration = Duration::from_millis(60);
/// Make (line low) portion of one dial pulse
const PULSE_MAKE: Duration = Duration::from_millis(40);
/// Pause between two dialed digits
const INTER_DIGIT: Duration = Duration::from_millis(600);
/// Spacing of the synthetic bounce edges
const BOUNCE_STEP: Duration = Duration::from_millis(1);

/// Parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    HookOff,
    HookOn,
    Dial(Vec<u8>),
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    match words.next()? {
        "off" => Some(Command::HookOff),
        "on" => Some(Command::HookOn),
        "dial" => {
            let digits: Option<Vec<u8>> = words
                .flat_map(|word| word.chars())
                .map(|c| c.to_digit(10).map(|d| d as u8))
                .collect();
            match digits {
                Some(digits) if !digits.is_empty() => Some(Command::Dial(digits)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Stdin-backed stand-in for the GPIO lines
pub struct ConsoleLines {
    task: Option<JoinHandle<()>>,
}

impl ConsoleLines {
    pub fn open(_config: &GpioConfig) -> Result<Self, InputError> {
        info!("using emulated lines on stdin (commands: off, on, dial <digits>)");
        Ok(Self { task: None })
    }

    /// The emulated handset starts on hook
    pub fn hook_level(&self) -> bool {
        false
    }

    /// The emulated dial rests with the line low
    pub fn dial_level(&self) -> bool {
        false
    }

    pub fn attach(
        &mut self,
        hook: DebouncedEdgeSource,
        dial: DebouncedEdgeSource,
        shutdown: ShutdownToken,
    ) -> Result<(), InputError> {
        if self.task.is_some() {
            return Err(InputError::AlreadyAttached);
        }
        self.task = Some(tokio::spawn(read_commands(hook, dial, shutdown)));
        Ok(())
    }

    pub async fn release(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                debug!(?e, "console task ended abnormally");
            }
        }
        info!("emulated lines released");
    }
}

async fn read_commands(
    hook: DebouncedEdgeSource,
    dial: DebouncedEdgeSource,
    mut shutdown: ShutdownToken,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut hook_level = hook.accepted_level();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed");
                // Keep the daemon alive until it is told to stop
                shutdown.cancelled().await;
                break;
            }
            Err(e) => {
                warn!(error = %e, "failed to read stdin");
                break;
            }
        };

        let Some(command) = parse_command(&line) else {
            warn!(input = %line.trim(), "unknown command");
            continue;
        };

        match command {
            Command::HookOff => {
                if !hook_level {
                    bounce_to(&hook, true).await;
                    hook_level = true;
                }
            }
            Command::HookOn => {
                if hook_level {
                    bounce_to(&hook, false).await;
                    hook_level = false;
                }
            }
            Command::Dial(digits) => {
                for digit in digits {
                    let pulses = if digit == 0 { 10 } else { digit };
                    for _ in 0..pulses {
                        bounce_to(&dial, true).await;
                        tokio::time::sleep(PULSE_BREAK).await;
                        bounce_to(&dial, false).await;
                        tokio::time::sleep(PULSE_MAKE).await;
                    }
                    tokio::time::sleep(INTER_DIGIT).await;
                }
            }
        }
    }
}

/// Drive a line to `level` with a short bounce
async fn bounce_to(line: &DebouncedEdgeSource, level: bool) {
    for raw in [level, !level, level] {
        line.on_raw_transition(raw);
        tokio::time::sleep(BOUNCE_STEP).await;
    }
}
