use std::path::Path;

use crate::selection::LineRange;

/// Shown in place of a path when the buffer has no backing file.
pub const UNSAVED_PLACEHOLDER: &str = "Untitled (unsaved)";

/// Shown in place of a line range when none is known.
pub const UNKNOWN_LINES: &str = "unknown lines";

/// Build the prompt that tells Claude which file and lines the selection came
/// from. The wording is what the CLI sees verbatim.
///
/// Callers must not pass an empty selection; no guard is performed here.
pub fn build_with_line_refs(
    file_path: Option<&Path>,
    line_range: Option<LineRange>,
    selected_text: &str,
) -> String {
    let file_path = file_path
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| UNSAVED_PLACEHOLDER.to_string());
    let lines = match line_range {
        Some(range) => format!("lines {}-{}", range.start, range.end),
        None => UNKNOWN_LINES.to_string(),
    };
    format!(
        "I am working on the file: {}\n\nThe selected text at {} is:\n\n```\n{}\n```\n\nPlease read this file first, then make the following change: ",
        file_path, lines, selected_text
    )
}

/// Build the prompt that only carries the snippet, without file metadata.
pub fn build_selection_only(selected_text: &str) -> String {
    format!(
        "Here is a snippet I'm working on:\n\n```\n{}\n```\n\nPlease make the following change: ",
        selected_text
    )
}
