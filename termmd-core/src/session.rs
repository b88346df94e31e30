use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;

use crate::editor_state::{EditorSnapshot, EditorState};
use crate::error::FileOpError;
use crate::file_ops::{self, SavePrompt};
use crate::fs::FileSystem;
use crate::poller::Poller;
use crate::prompt;
use crate::selection::{Selection, SelectionOffsets};
use crate::settings::Settings;
use crate::terminal::{self, TerminalSink};
use crate::watcher::{observe, FileSyncWatcher, Observation, TickOutcome};

/// Changes a frontend has to reflect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// The buffer was replaced by disk content (open, reload, adoption).
    ContentReplaced { content: String },
    ConflictRaised,
    ConflictCleared,
    FileChanged { path: Option<String> },
    /// The watched file disappeared.
    WatchStopped,
    /// A file was opened or created; the frontend writes `command` to the
    /// terminal to start the assistant next to it.
    ClaudeLaunch { command: String },
}

/// State before an operation, for working out which events it caused.
struct Before {
    conflict: bool,
    file: Option<PathBuf>,
}

/// The editor session and everything that mutates it.
///
/// A `Session` is the coordination context: all of its methods take
/// `&mut self` and must be called from the one thread that owns it. The
/// background [`Poller`] only reads the filesystem; its observations are
/// applied here by [`Session::pump`], so a save and a tick can never
/// interleave.
pub struct Session {
    state: EditorState,
    watcher: FileSyncWatcher,
    fs: Arc<dyn FileSystem>,
    settings: Settings,
    runtime: Option<Handle>,
    poller: Option<Poller>,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(fs: Arc<dyn FileSystem>, settings: Settings) -> Self {
        Self {
            state: EditorState::new(),
            watcher: FileSyncWatcher::new(),
            fs,
            settings,
            runtime: None,
            poller: None,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn snapshot(&self) -> EditorSnapshot {
        self.state.snapshot()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings. A new poll interval restarts the poller.
    pub fn set_settings(&mut self, settings: Settings) {
        let restart = settings.poll_interval_ms != self.settings.poll_interval_ms;
        self.settings = settings;
        if restart {
            if let Some(handle) = self.runtime.clone() {
                self.attach_poller(&handle);
            }
        }
    }

    pub fn watcher(&self) -> &FileSyncWatcher {
        &self.watcher
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Start background polling on `handle`, replacing any earlier poller.
    pub fn attach_poller(&mut self, handle: &Handle) {
        let poller = Poller::spawn(handle, Arc::clone(&self.fs), self.settings.poll_interval());
        poller.publish(self.watcher.snapshot());
        self.poller = Some(poller);
        self.runtime = Some(handle.clone());
    }

    pub fn detach_poller(&mut self) {
        self.poller = None;
        self.runtime = None;
    }

    // ── Editing surface ─────────────────────────────────────────────────

    pub fn edit(&mut self, content: String) {
        self.state.edit(content);
    }

    pub fn select(&mut self, offsets: SelectionOffsets) {
        self.state.select(offsets);
    }

    /// Select whole lines from the gutter and return the offsets the text
    /// view should show.
    pub fn select_lines(&mut self, start: u32, end: u32) -> SelectionOffsets {
        let offsets = Selection::offsets_for_lines(self.state.content(), start, end);
        self.state.select(offsets);
        offsets
    }

    // ── File operations ─────────────────────────────────────────────────

    pub fn open(&mut self, path: &Path) -> Result<(), FileOpError> {
        self.load_file(|fs, state| file_ops::open(fs, state, path))
    }

    pub fn open_as_markdown(&mut self, source: &Path, dest: &Path) -> Result<(), FileOpError> {
        self.load_file(|fs, state| file_ops::open_as_markdown(fs, state, source, dest))
    }

    pub fn new_file(&mut self, path: &Path) -> Result<(), FileOpError> {
        self.load_file(|fs, state| file_ops::new_file(fs, state, path))
    }

    pub fn save(&mut self, save_prompt: &mut dyn SavePrompt) -> Result<(), FileOpError> {
        self.store_file(|fs, state| file_ops::save(fs, state, save_prompt))
    }

    pub fn save_as(&mut self, save_prompt: &mut dyn SavePrompt) -> Result<(), FileOpError> {
        self.store_file(|fs, state| file_ops::save_as(fs, state, save_prompt))
    }

    pub fn auto_save_if_needed(&mut self, save_prompt: &mut dyn SavePrompt) -> Result<(), FileOpError> {
        let settings = self.settings.clone();
        self.store_file(|fs, state| file_ops::auto_save_if_needed(fs, state, &settings, save_prompt))
    }

    // ── Conflict resolution ─────────────────────────────────────────────

    pub fn reload_from_disk(&mut self) -> bool {
        let before = self.before();
        let reloaded = self.watcher.reload_from_disk(self.fs.as_ref(), &mut self.state);
        if reloaded {
            self.publish_watch();
            self.record(before, true);
        }
        reloaded
    }

    pub fn ignore_conflict(&mut self) {
        let before = self.before();
        self.state.ignore_conflict();
        self.record(before, false);
    }

    // ── Watching ────────────────────────────────────────────────────────

    /// Run one tick inline, for hosts without a runtime.
    pub fn tick(&mut self) -> TickOutcome {
        match self.watcher.snapshot() {
            Some(snapshot) => {
                let observation = observe(&snapshot, self.fs.as_ref());
                self.apply_observation(observation)
            }
            None => TickOutcome::Idle,
        }
    }

    /// Apply every observation the background poller has produced so far.
    pub fn pump(&mut self) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        while let Some(observation) = self.poller.as_mut().and_then(Poller::try_next) {
            outcomes.push(self.apply_observation(observation));
        }
        outcomes
    }

    pub fn apply_observation(&mut self, observation: Observation) -> TickOutcome {
        let before = self.before();
        let outcome = self.watcher.apply(observation, &mut self.state);
        if !matches!(outcome, TickOutcome::Stale | TickOutcome::Idle) {
            self.publish_watch();
        }
        self.record(before, outcome == TickOutcome::Adopted);
        if outcome == TickOutcome::FileMissing {
            self.events.push(SessionEvent::WatchStopped);
        }
        outcome
    }

    // ── Assistant ───────────────────────────────────────────────────────

    /// Start the assistant CLI next to the current file.
    pub fn run_claude(&self, terminal: &dyn TerminalSink) {
        terminal::run_claude(terminal, &self.settings.claude_command, self.state.current_file());
    }

    /// Send the selection with its file path and line range. Returns `false`
    /// when nothing is selected.
    pub fn send_with_line_refs(
        &mut self,
        terminal: &dyn TerminalSink,
        save_prompt: &mut dyn SavePrompt,
    ) -> bool {
        if !self.prepare_send(save_prompt) {
            return false;
        }
        let text = prompt::build_with_line_refs(
            self.state.current_file(),
            self.state.selection_line_range(),
            self.state.selected_text(),
        );
        terminal::inject_prompt(terminal, &text);
        true
    }

    /// Send only the selected text. Returns `false` when nothing is selected.
    pub fn send_selection_only(
        &mut self,
        terminal: &dyn TerminalSink,
        save_prompt: &mut dyn SavePrompt,
    ) -> bool {
        if !self.prepare_send(save_prompt) {
            return false;
        }
        let text = prompt::build_selection_only(self.state.selected_text());
        terminal::inject_prompt(terminal, &text);
        true
    }

    /// A failed or cancelled auto-save does not stop the send.
    fn prepare_send(&mut self, save_prompt: &mut dyn SavePrompt) -> bool {
        if self.state.selected_text().is_empty() {
            return false;
        }
        if let Err(e) = self.auto_save_if_needed(save_prompt) {
            log::info!("Sending without auto-save: {}", e);
        }
        true
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Run an operation that replaces the buffer with a file's content. The
    /// file is watched afresh even if it was already the current one.
    fn load_file(
        &mut self,
        op: impl FnOnce(&dyn FileSystem, &mut EditorState) -> Result<(), FileOpError>,
    ) -> Result<(), FileOpError> {
        let before = self.before();
        op(self.fs.as_ref(), &mut self.state)?;
        self.retarget_watcher();
        self.record(before, true);
        self.events.push(SessionEvent::ClaudeLaunch {
            command: terminal::claude_command_for(
                &self.settings.claude_command,
                self.state.current_file(),
            ),
        });
        Ok(())
    }

    /// Run an operation that writes the buffer out. The watcher only moves
    /// when the file identity changed or it had stopped.
    fn store_file(
        &mut self,
        op: impl FnOnce(&dyn FileSystem, &mut EditorState) -> Result<(), FileOpError>,
    ) -> Result<(), FileOpError> {
        let before = self.before();
        op(self.fs.as_ref(), &mut self.state)?;
        if before.file.as_deref() != self.state.current_file() || !self.watcher.is_watching() {
            self.retarget_watcher();
        }
        self.record(before, false);
        Ok(())
    }

    fn retarget_watcher(&mut self) {
        match self.state.current_file().map(Path::to_path_buf) {
            Some(path) => self.watcher.watch(&path, self.fs.as_ref()),
            None => self.watcher.stop_watching(),
        }
        self.publish_watch();
    }

    fn publish_watch(&self) {
        if let Some(poller) = &self.poller {
            poller.publish(self.watcher.snapshot());
        }
    }

    fn before(&self) -> Before {
        Before {
            conflict: self.state.conflict_visible(),
            file: self.state.current_file().map(Path::to_path_buf),
        }
    }

    fn record(&mut self, before: Before, content_replaced: bool) {
        if before.file.as_deref() != self.state.current_file() {
            self.events.push(SessionEvent::FileChanged {
                path: self
                    .state
                    .current_file()
                    .map(|p| p.to_string_lossy().to_string()),
            });
        }
        if content_replaced {
            self.events.push(SessionEvent::ContentReplaced {
                content: self.state.content().to_string(),
            });
        }
        match (before.conflict, self.state.conflict_visible()) {
            (false, true) => self.events.push(SessionEvent::ConflictRaised),
            (true, false) => self.events.push(SessionEvent::ConflictCleared),
            _ => {}
        }
    }
}
