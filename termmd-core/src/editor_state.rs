use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::hash::{fingerprint, Fingerprint};
use crate::selection::{LineRange, Selection, SelectionOffsets};

const APP_NAME: &str = "TermMD";
const UNTITLED: &str = "Untitled";
const UNTITLED_FILE_NAME: &str = "Untitled.md";

/// Editor session state. There is exactly one per application and it is only
/// mutated from the coordination context that owns it.
#[derive(Debug, Clone, Default)]
pub struct EditorState {
    content: String,
    is_dirty: bool,
    current_file: Option<PathBuf>,
    selection: Selection,
    last_saved_fingerprint: Fingerprint,
    conflict_visible: bool,
}

/// Serializable view of [`EditorState`] for frontends.
#[derive(Debug, Clone, Serialize)]
pub struct EditorSnapshot {
    pub content: String,
    pub is_dirty: bool,
    pub current_file: Option<String>,
    pub selected_text: String,
    pub selection_line_range: Option<LineRange>,
    pub conflict_visible: bool,
    pub window_title: String,
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    pub fn selected_text(&self) -> &str {
        &self.selection.text
    }

    pub fn selection_line_range(&self) -> Option<LineRange> {
        self.selection.line_range
    }

    pub fn selection_offsets(&self) -> SelectionOffsets {
        self.selection.offsets
    }

    pub fn last_saved_fingerprint(&self) -> &Fingerprint {
        &self.last_saved_fingerprint
    }

    pub fn conflict_visible(&self) -> bool {
        self.conflict_visible
    }

    /// Content-change event from the editing surface. The selection is
    /// re-derived so it always describes the current buffer.
    pub fn edit(&mut self, content: String) {
        self.content = content;
        self.is_dirty = true;
        self.reselect();
    }

    /// Selection-change event from the editing surface.
    pub fn select(&mut self, offsets: SelectionOffsets) {
        self.selection = Selection::compute(&self.content, offsets);
    }

    /// Replace the buffer with content that is known to match disk.
    ///
    /// Used for open, reload and clean adoption: content, fingerprint, dirty
    /// flag and conflict flag change together.
    pub(crate) fn adopt(&mut self, content: String, fp: Fingerprint) {
        self.content = content;
        self.last_saved_fingerprint = fp;
        self.is_dirty = false;
        self.conflict_visible = false;
        self.reselect();
    }

    /// Collapse the selection to the start of the buffer, as when another
    /// file is loaded.
    pub(crate) fn clear_selection(&mut self) {
        self.selection = Selection::default();
    }

    fn reselect(&mut self) {
        self.selection = Selection::compute(&self.content, self.selection.offsets);
    }

    /// Record that the current buffer was written to `path`.
    pub(crate) fn mark_saved(&mut self, path: PathBuf, fp: Fingerprint) {
        self.current_file = Some(path);
        self.last_saved_fingerprint = fp;
        self.is_dirty = false;
        self.conflict_visible = false;
    }

    pub(crate) fn set_current_file(&mut self, path: Option<PathBuf>) {
        self.current_file = path;
    }

    pub(crate) fn raise_conflict(&mut self) {
        self.conflict_visible = true;
    }

    /// Hide the conflict banner without touching the buffer. Buffer and disk
    /// stay diverged until the next save or reload.
    pub fn ignore_conflict(&mut self) {
        self.conflict_visible = false;
    }

    /// Whether `fp` is the fingerprint of the last save or adoption.
    pub fn matches_last_saved(&self, fp: &Fingerprint) -> bool {
        !self.last_saved_fingerprint.is_none() && *fp == self.last_saved_fingerprint
    }

    pub fn content_fingerprint(&self) -> Fingerprint {
        fingerprint(&self.content)
    }

    /// File name offered by the save dialog.
    pub fn suggested_file_name(&self) -> String {
        self.current_file
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| UNTITLED_FILE_NAME.to_string())
    }

    pub fn window_title(&self) -> String {
        let name = self
            .current_file
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| UNTITLED.to_string());
        let dirty = if self.is_dirty { " (edited)" } else { "" };
        format!("{}{} — {}", name, dirty, APP_NAME)
    }

    pub fn snapshot(&self) -> EditorSnapshot {
        EditorSnapshot {
            content: self.content.clone(),
            is_dirty: self.is_dirty,
            current_file: self
                .current_file
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
            selected_text: self.selection.text.clone(),
            selection_line_range: self.selection.line_range,
            conflict_visible: self.conflict_visible,
            window_title: self.window_title(),
        }
    }
}
