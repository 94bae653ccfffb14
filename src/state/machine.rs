//! Core state machine implementation
//!
//! The single consumer of the event bus. It owns the session state, the
//! outstanding audio job, and the active recording, so none of them need a
//! lock. Each event is handled to completion before the next is dequeued.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Instant;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use super::prompts;
use crate::audio::{AudioSink, Clip, Recorder, RecordingHandle};
use crate::call::CallControl;
use crate::events::{CallState, Digit, Event, EventReceiver, HookState, JobId};
use crate::storage::{ContactList, Recording, RecordingStore};

/// Session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handset on hook, waiting to be lifted
    Idle,
    /// Speaking the main menu, waiting for a choice
    MenuRoot,
    /// Capturing a voice message
    Recording,
    /// Playing stored messages, newest first
    Playback,
    /// Speaking the contact menu, waiting for a choice
    MakeCall,
}

impl SessionState {
    /// Where a session starts for a given hook position
    pub fn initial(hook: HookState) -> Self {
        match hook {
            HookState::Off => SessionState::MenuRoot,
            HookState::On => SessionState::Idle,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::MenuRoot => write!(f, "MenuRoot"),
            SessionState::Recording => write!(f, "Recording"),
            SessionState::Playback => write!(f, "Playback"),
            SessionState::MakeCall => write!(f, "MakeCall"),
        }
    }
}

/// Choices offered by the root menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Record,
    Playback,
    MakeCall,
}

impl MenuChoice {
    pub fn from_digit(digit: Digit) -> Option<Self> {
        match digit.value() {
            1 => Some(MenuChoice::Record),
            2 => Some(MenuChoice::Playback),
            3 => Some(MenuChoice::MakeCall),
            _ => None,
        }
    }

    pub fn digit(self) -> u8 {
        match self {
            MenuChoice::Record => 1,
            MenuChoice::Playback => 2,
            MenuChoice::MakeCall => 3,
        }
    }
}

/// Digit that skips to the next message during playback
const SKIP_DIGIT: u8 = 1;

/// External collaborators driven by the state machine
pub struct Collaborators {
    pub audio: Box<dyn AudioSink>,
    pub recorder: Box<dyn Recorder>,
    pub call: Option<Box<dyn CallControl>>,
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

/// The state machine that sequences menus, recording, playback and calls
pub struct StateMachine {
    /// Current state
    state: SessionState,
    /// Time when current state was entered
    state_entered_at: Instant,
    audio: Box<dyn AudioSink>,
    recorder: Box<dyn Recorder>,
    call: Option<Box<dyn CallControl>>,
    contacts: ContactList,
    store: RecordingStore,
    beep_path: PathBuf,
    clock: Clock,
    /// The one audio job that may be outstanding
    audio_job: Option<JobId>,
    /// The one recording that may be active, only while in Recording
    recording: Option<Box<dyn RecordingHandle>>,
    /// Messages still to play in Playback
    playlist: VecDeque<Recording>,
    /// Last state reported by the call subsystem
    call_state: Option<CallState>,
}

impl StateMachine {
    /// Create a state machine seeded from the hook position at startup
    pub fn new(
        initial_hook: HookState,
        collaborators: Collaborators,
        contacts: ContactList,
        store: RecordingStore,
        beep_path: PathBuf,
    ) -> Self {
        Self {
            state: SessionState::initial(initial_hook),
            state_entered_at: Instant::now(),
            audio: collaborators.audio,
            recorder: collaborators.recorder,
            call: collaborators.call,
            contacts,
            store,
            beep_path,
            clock: Box::new(|| chrono::Local::now().naive_local()),
            audio_job: None,
            recording: None,
            playlist: VecDeque::new(),
            call_state: None,
        }
    }

    /// Replace the wall clock used to name recordings
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Get the current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the initial state's entry action
    pub fn start(&mut self) {
        info!(state = %self.state, "state machine started");
        if self.state == SessionState::MenuRoot {
            self.speak_menu(None);
        }
    }

    /// Process events until the poison event arrives or the bus closes
    pub async fn run(&mut self, mut events: EventReceiver) {
        self.start();

        while let Some(event) = events.recv().await {
            if self.handle_event(event).await.is_break() {
                info!("state machine stopped");
                return;
            }
        }

        warn!("event bus closed without a shutdown event");
        self.drain().await;
    }

    /// Handle one event to completion
    pub async fn handle_event(&mut self, event: Event) -> ControlFlow<()> {
        debug!(state = %self.state, %event, "event");

        let event = match event {
            Event::Shutdown => {
                self.drain().await;
                return ControlFlow::Break(());
            }
            Event::CallState { state } => {
                info!(%state, "call state changed");
                self.call_state = Some(state);
                return ControlFlow::Continue(());
            }
            Event::AudioDone { job } if self.audio_job != Some(job) => {
                debug!(job, current = ?self.audio_job, "stale audio completion");
                return ControlFlow::Continue(());
            }
            Event::AudioDone { job } => {
                self.audio_job = None;
                Event::AudioDone { job }
            }
            event => event,
        };

        match self.state {
            SessionState::Idle => self.handle_idle(event),
            SessionState::MenuRoot => self.handle_menu_root(event).await,
            SessionState::Recording => self.handle_recording(event).await,
            SessionState::Playback => self.handle_playback(event).await,
            SessionState::MakeCall => self.handle_make_call(event).await,
        }

        ControlFlow::Continue(())
    }

    fn handle_idle(&mut self, event: Event) {
        match event {
            Event::Hook {
                state: HookState::Off,
            } => self.enter_menu_root(None),
            other => self.unhandled(&other),
        }
    }

    async fn handle_menu_root(&mut self, event: Event) {
        match event {
            Event::AudioDone { .. } => {
                debug!("no selection made, repeating menu");
                self.speak_menu(None);
            }
            Event::Hook {
                state: HookState::On,
            } => self.hang_up().await,
            Event::Dial { digit } => {
                self.stop_audio();
                match MenuChoice::from_digit(digit) {
                    Some(MenuChoice::Record) => self.enter_recording(),
                    Some(MenuChoice::Playback) => self.enter_playback(),
                    Some(MenuChoice::MakeCall) => self.enter_make_call(),
                    None => {
                        warn!(%digit, "invalid menu selection");
                        self.speak_menu(Some(prompts::INVALID_SELECTION.to_string()));
                    }
                }
            }
            other => self.unhandled(&other),
        }
    }

    async fn handle_recording(&mut self, event: Event) {
        match event {
            Event::Hook {
                state: HookState::On,
            } => self.hang_up().await,
            other => debug!(%other, "ignored while recording"),
        }
    }

    async fn handle_playback(&mut self, event: Event) {
        match event {
            Event::AudioDone { .. } => self.play_next_message(),
            Event::Dial { digit } if digit.value() == SKIP_DIGIT => {
                debug!("skipping message");
                self.stop_audio();
                self.play_next_message();
            }
            Event::Hook {
                state: HookState::On,
            } => self.hang_up().await,
            other => self.unhandled(&other),
        }
    }

    async fn handle_make_call(&mut self, event: Event) {
        match event {
            Event::AudioDone { .. } => {
                debug!("no contact chosen, repeating contact menu");
                self.play(vec![Clip::Text(prompts::contact_menu(&self.contacts))]);
            }
            Event::Dial { digit } => {
                self.stop_audio();
                match self.contacts.select(digit).cloned() {
                    Some(contact) => {
                        let preface = if self.place_call(&contact.destination) {
                            prompts::calling(&contact.name)
                        } else {
                            warn!(name = %contact.name, call_state = ?self.call_state, "calling unavailable");
                            prompts::CALLING_UNAVAILABLE.to_string()
                        };
                        self.enter_menu_root(Some(preface));
                    }
                    None => {
                        warn!(%digit, contacts = self.contacts.len(), "invalid contact selection");
                        self.play(vec![
                            Clip::Text(prompts::INVALID_SELECTION.to_string()),
                            Clip::Text(prompts::contact_menu(&self.contacts)),
                        ]);
                    }
                }
            }
            Event::Hook {
                state: HookState::On,
            } => self.hang_up().await,
            other => self.unhandled(&other),
        }
    }

    fn unhandled(&self, event: &Event) {
        debug!(state = %self.state, %event, "unhandled event");
    }

    fn enter_menu_root(&mut self, preface: Option<String>) {
        self.transition_to(SessionState::MenuRoot);
        self.speak_menu(preface);
    }

    fn speak_menu(&mut self, preface: Option<String>) {
        let mut clips: Vec<Clip> = preface.into_iter().map(Clip::Text).collect();
        clips.push(Clip::Text(prompts::root_menu()));
        self.play(clips);
    }

    fn enter_recording(&mut self) {
        debug_assert!(self.recording.is_none(), "recording already active");
        self.transition_to(SessionState::Recording);

        let beep = Clip::File(self.beep_path.clone());
        self.play(vec![beep]);

        let path = self.store.path_for((self.clock)());
        match self.recorder.start(&path) {
            Ok(handle) => {
                info!(?path, "recording message");
                self.recording = Some(handle);
            }
            Err(e) => {
                error!(error = %e, "failed to start recording");
                self.stop_audio();
                self.enter_menu_root(Some(prompts::RECORDING_UNAVAILABLE.to_string()));
            }
        }
    }

    fn enter_playback(&mut self) {
        self.transition_to(SessionState::Playback);
        self.playlist = self.store.list_newest_first().into();
        info!(messages = self.playlist.len(), "starting playback");

        if self.playlist.is_empty() {
            self.enter_menu_root(Some(prompts::NO_MESSAGES.to_string()));
        } else {
            self.play_next_message();
        }
    }

    fn play_next_message(&mut self) {
        match self.playlist.pop_front() {
            Some(message) => {
                debug!(path = ?message.path, "playing message");
                self.play(vec![
                    Clip::Text(message.stamp.introduction()),
                    Clip::File(message.path),
                ]);
            }
            None => self.enter_menu_root(Some(prompts::END_OF_MESSAGES.to_string())),
        }
    }

    fn enter_make_call(&mut self) {
        self.transition_to(SessionState::MakeCall);
        if self.contacts.is_empty() {
            self.enter_menu_root(Some(prompts::NO_CONTACTS.to_string()));
        } else {
            self.play(vec![Clip::Text(prompts::contact_menu(&self.contacts))]);
        }
    }

    /// Handset went back on the hook: silence everything and go idle
    async fn hang_up(&mut self) {
        self.stop_audio();
        self.finish_recording().await;
        self.hang_up_call();
        self.playlist.clear();
        self.transition_to(SessionState::Idle);
    }

    /// Dial out if the call subsystem is registered and idle
    fn place_call(&mut self, destination: &str) -> bool {
        if self.call_state != Some(CallState::Ready) {
            return false;
        }
        let Some(call) = self.call.as_mut() else {
            return false;
        };
        info!(%destination, "placing call");
        call.dial(destination);
        // The controller reports Dialing later; a hang-up may be dequeued first
        self.call_state = Some(CallState::Dialing);
        true
    }

    fn hang_up_call(&mut self) {
        let active = matches!(
            self.call_state,
            Some(CallState::Dialing | CallState::OnCall)
        );
        if !active {
            return;
        }
        if let Some(call) = self.call.as_mut() {
            info!("hanging up call");
            call.hangup();
        }
    }

    /// Stop and join the active recording, if any
    async fn finish_recording(&mut self) {
        if let Some(mut handle) = self.recording.take() {
            handle.stop();
            match handle.join().await {
                Ok(()) => info!("recording saved"),
                Err(e) => warn!(error = %e, "recording did not finish cleanly"),
            }
        }
    }

    /// Release every collaborator before the process exits
    async fn drain(&mut self) {
        info!(state = %self.state, "draining collaborators");
        self.stop_audio();
        self.finish_recording().await;
        self.hang_up_call();
        self.playlist.clear();
    }

    fn play(&mut self, clips: Vec<Clip>) {
        if self.audio_job.is_some() {
            warn!(job = ?self.audio_job, "new audio job while one is outstanding");
            self.stop_audio();
        }
        self.audio_job = Some(self.audio.play(clips));
    }

    fn stop_audio(&mut self) {
        if let Some(job) = self.audio_job.take() {
            debug!(job, "stopping audio");
            self.audio.stop();
        }
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: SessionState) {
        let old_state = self.state;
        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        self.state = new_state;
        self.state_entered_at = Instant::now();
    }
}
