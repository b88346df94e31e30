//! Poll-based detection of external changes to the open file.
//!
//! A tick is split in two halves so the filesystem reads can happen away
//! from the thread that owns the [`EditorState`]:
//!
//! - [`observe`] takes a [`WatchSnapshot`] and performs the reads. It touches
//!   no shared state and may run on any thread.
//! - [`FileSyncWatcher::apply`] classifies the resulting [`Observation`]
//!   against the editor state. It must run on the owning thread.
//!
//! [`FileSyncWatcher::poll`] does both inline.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::editor_state::EditorState;
use crate::error::FsError;
use crate::fs::{read_text, FileSystem, ModificationMarker};
use crate::hash::fingerprint;

/// Live polling context bound to one file.
#[derive(Debug, Clone)]
struct WatchSession {
    path: PathBuf,
    last_marker: Option<ModificationMarker>,
    generation: u64,
    /// Set when a detected change could not be read; the next tick reads
    /// again even if the marker has not moved.
    retry_read: bool,
}

/// What a tick needs to know about the current session, detached from the
/// watcher so it can be sent to a background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSnapshot {
    pub path: PathBuf,
    pub baseline: Option<ModificationMarker>,
    pub generation: u64,
    pub retry_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Missing,
    Unchanged,
    Changed {
        marker: Option<ModificationMarker>,
        content: Result<String, FsError>,
    },
}

/// Result of the read half of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub generation: u64,
    pub baseline: Option<ModificationMarker>,
    pub probe: Probe,
}

/// What a tick did to the editor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TickOutcome {
    /// Nothing is being watched.
    Idle,
    /// The observation belongs to an older session or baseline.
    Stale,
    Unchanged,
    /// The watched file disappeared; the watcher is now idle.
    FileMissing,
    /// Disk content matches the last save.
    SelfWrite,
    ConflictRaised,
    Adopted,
    /// The change was detected but the file could not be read.
    ReadFailed,
}

/// Perform the filesystem half of a tick.
pub fn observe(snapshot: &WatchSnapshot, fs: &dyn FileSystem) -> Observation {
    let probe = if !fs.exists(&snapshot.path) {
        Probe::Missing
    } else {
        let marker = fs.modification_marker(&snapshot.path).ok();
        if marker == snapshot.baseline && !snapshot.retry_read {
            Probe::Unchanged
        } else {
            Probe::Changed {
                marker,
                content: read_text(fs, &snapshot.path),
            }
        }
    };
    Observation {
        generation: snapshot.generation,
        baseline: snapshot.baseline,
        probe,
    }
}

/// State machine with two states: idle (no session) and watching.
#[derive(Debug, Default)]
pub struct FileSyncWatcher {
    session: Option<WatchSession>,
    generations: u64,
}

impl FileSyncWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_watching(&self) -> bool {
        self.session.is_some()
    }

    pub fn watched_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    /// Start watching `path`, replacing any prior session. The current
    /// marker becomes the baseline; content is not read.
    pub fn watch(&mut self, path: &Path, fs: &dyn FileSystem) {
        self.generations += 1;
        let last_marker = fs.modification_marker(path).ok();
        log::info!("Watching {} for external changes", path.display());
        self.session = Some(WatchSession {
            path: path.to_path_buf(),
            last_marker,
            generation: self.generations,
            retry_read: false,
        });
    }

    pub fn stop_watching(&mut self) {
        if let Some(session) = self.session.take() {
            log::info!("Stopped watching {}", session.path.display());
        }
    }

    pub fn snapshot(&self) -> Option<WatchSnapshot> {
        self.session.as_ref().map(|s| WatchSnapshot {
            path: s.path.clone(),
            baseline: s.last_marker,
            generation: s.generation,
            retry_read: s.retry_read,
        })
    }

    /// Run a full tick inline.
    pub fn poll(&mut self, fs: &dyn FileSystem, state: &mut EditorState) -> TickOutcome {
        match self.snapshot() {
            Some(snapshot) => {
                let observation = observe(&snapshot, fs);
                self.apply(observation, state)
            }
            None => TickOutcome::Idle,
        }
    }

    /// Classify an observation against the editor state and update both.
    pub fn apply(&mut self, observation: Observation, state: &mut EditorState) -> TickOutcome {
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Idle;
        };
        if observation.generation != session.generation
            || observation.baseline != session.last_marker
        {
            return TickOutcome::Stale;
        }

        match observation.probe {
            Probe::Missing => {
                log::info!(
                    "{} no longer exists, stopping watcher",
                    session.path.display()
                );
                state.ignore_conflict();
                self.session = None;
                TickOutcome::FileMissing
            }
            Probe::Unchanged => TickOutcome::Unchanged,
            Probe::Changed { marker, content } => {
                session.last_marker = marker;
                let content = match content {
                    Ok(content) => content,
                    Err(e) => {
                        log::warn!("Detected change could not be read, will retry: {}", e);
                        session.retry_read = true;
                        return TickOutcome::ReadFailed;
                    }
                };
                session.retry_read = false;

                let disk_fp = fingerprint(&content);
                if state.matches_last_saved(&disk_fp) {
                    log::debug!("Ignoring own write to {}", session.path.display());
                    TickOutcome::SelfWrite
                } else if state.is_dirty() {
                    log::debug!("{} changed on disk with unsaved edits", session.path.display());
                    state.raise_conflict();
                    TickOutcome::ConflictRaised
                } else {
                    log::debug!("Adopting external change to {}", session.path.display());
                    state.adopt(content, disk_fp);
                    TickOutcome::Adopted
                }
            }
        }
    }

    /// Replace the buffer with what is on disk now, resolving any conflict.
    ///
    /// Returns `false`, leaving everything untouched, when nothing is watched
    /// or the file cannot be read.
    pub fn reload_from_disk(&mut self, fs: &dyn FileSystem, state: &mut EditorState) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let content = match read_text(fs, &session.path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Reload failed: {}", e);
                return false;
            }
        };
        let fp = fingerprint(&content);
        state.adopt(content, fp);
        session.last_marker = fs.modification_marker(&session.path).ok();
        session.retry_read = false;
        true
    }
}
