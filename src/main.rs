//! tattle-phone: rotary-dial phone controller
//!
//! Turns a rotary telephone into a voice message box:
//! - Hook and dial lines are debounced and decoded into events
//! - A single state machine consumes the events and drives the menus
//! - Messages are recorded and played back through external programs
//! - Outbound calls go through an optional baresip client
//!
//! Build with `--features gpio` on a Raspberry Pi. Without it, the lines
//! are emulated from stdin.

mod audio;
mod call;
mod config;
mod events;
mod input;
mod lifecycle;
mod state;
mod storage;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::{AudioPlayer, ProcessRecorder};
use crate::call::{CallControl, CallController};
use crate::config::Config;
use crate::events::{Event, HookState};
use crate::input::{DebouncedEdgeSource, HookTracker, Lines, PulseDigitDecoder};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::state::{Collaborators, StateMachine};
use crate::storage::{ContactList, RecordingStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "tattle-phone starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        recordings = ?config.recording.directory,
        contacts = ?config.contacts_path,
        "configuration loaded"
    );

    let shutdown = Shutdown::new();
    let (bus, events) = events::channel();

    let contacts = ContactList::load(&config.contacts_path);
    info!(count = contacts.len(), "contacts loaded");

    let (player, player_task) =
        AudioPlayer::spawn(&config.audio, bus.clone()).context("audio output unavailable")?;
    let recorder = ProcessRecorder::new(&config.recording).context("recorder unavailable")?;

    let (call, call_task) = if config.call.enabled {
        match CallController::spawn(&config.call, bus.clone()) {
            Ok((controller, task)) => (Some(Box::new(controller) as Box<dyn CallControl>), Some(task)),
            Err(e) => {
                warn!(error = %e, "continuing without outbound calls");
                (None, None)
            }
        }
    } else {
        info!("outbound calls disabled");
        (None, None)
    };

    // Input pipeline: lines -> debouncers -> hook tracker / pulse decoder -> bus
    let mut lines = Lines::open(&config.gpio)?;
    let initial_level = lines.hook_level();
    let tracker = HookTracker::new(HookState::from_level(initial_level), bus.clone());
    let decoder =
        PulseDigitDecoder::spawn(config.input.pulse_timeout(), bus.clone(), shutdown.token());

    let hook_source = {
        let tracker = tracker.clone();
        DebouncedEdgeSource::new(initial_level, config.input.bounce(), move |level| {
            tracker.on_level_changed(level)
        })
    };
    let dial_source =
        input::dial_source(lines.dial_level(), config.input.bounce(), decoder.input());
    lines.attach(hook_source, dial_source, shutdown.token())?;

    let mut machine = StateMachine::new(
        tracker.current_state(),
        Collaborators {
            audio: Box::new(player),
            recorder: Box::new(recorder),
            call,
        },
        contacts,
        RecordingStore::new(&config.recording.directory, config.recording.extension.clone()),
        config.audio.beep_path.clone(),
    );

    // Signals become the poison event so the machine drains in order
    {
        let bus = bus.clone();
        tokio::spawn(async move {
            match ShutdownSignal::new().wait().await {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(error = %e, "failed to listen for signals"),
            }
            bus.send(Event::Shutdown);
        });
    }

    info!(hook = %tracker.current_state(), "initialized, entering main loop");
    machine.run(events).await;

    // Cleanup
    info!("shutting down...");

    shutdown.trigger();
    decoder.join().await;
    lines.release().await;
    if let Some(task) = call_task {
        task.shutdown().await;
    }
    player_task.shutdown().await;

    info!("tattle-phone stopped");

    Ok(())
}
