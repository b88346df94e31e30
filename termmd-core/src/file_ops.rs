//! Open, save and save-as against a [`FileSystem`].
//!
//! Every operation does its filesystem work first and only then updates the
//! [`EditorState`], so a failed operation leaves the state exactly as it was.

use std::path::{Path, PathBuf};

use crate::editor_state::EditorState;
use crate::error::FileOpError;
use crate::fs::{read_text, FileSystem};
use crate::hash::fingerprint;
use crate::settings::Settings;

/// Asks the user where to save. Returning `None` means the dialog was
/// dismissed.
pub trait SavePrompt {
    fn choose_save_path(&mut self, suggested_name: &str) -> Option<PathBuf>;
}

/// A prompt that already knows its answer.
impl SavePrompt for Option<PathBuf> {
    fn choose_save_path(&mut self, _suggested_name: &str) -> Option<PathBuf> {
        self.take()
    }
}

/// Whether `path` has a Markdown extension.
pub fn is_markdown_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
        .unwrap_or(false)
}

pub fn open(fs: &dyn FileSystem, state: &mut EditorState, path: &Path) -> Result<(), FileOpError> {
    let content = read_text(fs, path)?;
    adopt_file(state, path, content);
    log::info!("Opened {}", path.display());
    Ok(())
}

/// Save-dialog name for converting `source` to Markdown: its stem with an
/// `.md` extension.
pub fn markdown_file_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());
    format!("{}.md", stem)
}

/// Open `source` by copying its content into the Markdown file `dest`, which
/// becomes the current file.
pub fn open_as_markdown(
    fs: &dyn FileSystem,
    state: &mut EditorState,
    source: &Path,
    dest: &Path,
) -> Result<(), FileOpError> {
    let content = read_text(fs, source)?;
    fs.write_file(dest, content.as_bytes())?;
    adopt_file(state, dest, content);
    log::info!("Opened {} as {}", source.display(), dest.display());
    Ok(())
}

/// Create an empty file at `path` and make it the current file.
pub fn new_file(fs: &dyn FileSystem, state: &mut EditorState, path: &Path) -> Result<(), FileOpError> {
    fs.write_file(path, b"")?;
    adopt_file(state, path, String::new());
    log::info!("Created {}", path.display());
    Ok(())
}

/// Save to the current file, or ask for a destination when there is none.
pub fn save(
    fs: &dyn FileSystem,
    state: &mut EditorState,
    prompt: &mut dyn SavePrompt,
) -> Result<(), FileOpError> {
    match state.current_file().map(Path::to_path_buf) {
        Some(path) => save_to(fs, state, &path),
        None => save_as(fs, state, prompt),
    }
}

pub fn save_as(
    fs: &dyn FileSystem,
    state: &mut EditorState,
    prompt: &mut dyn SavePrompt,
) -> Result<(), FileOpError> {
    let path = prompt
        .choose_save_path(&state.suggested_file_name())
        .ok_or(FileOpError::Cancelled)?;
    save_to(fs, state, &path)
}

/// Write the buffer to `path`, which becomes the current file.
pub fn save_to(fs: &dyn FileSystem, state: &mut EditorState, path: &Path) -> Result<(), FileOpError> {
    fs.write_file(path, state.content().as_bytes())?;
    let fp = state.content_fingerprint();
    state.mark_saved(path.to_path_buf(), fp);
    log::debug!("Saved {}", path.display());
    Ok(())
}

/// Save before sending a selection, when the settings ask for it.
///
/// Succeeds without doing anything when auto-save is off, or when there is
/// neither a file nor any content.
pub fn auto_save_if_needed(
    fs: &dyn FileSystem,
    state: &mut EditorState,
    settings: &Settings,
    prompt: &mut dyn SavePrompt,
) -> Result<(), FileOpError> {
    if !settings.auto_save_before_send {
        return Ok(());
    }
    if state.current_file().is_some() {
        save(fs, state, prompt)
    } else if !state.content().is_empty() {
        save_as(fs, state, prompt)
    } else {
        Ok(())
    }
}

fn adopt_file(state: &mut EditorState, path: &Path, content: String) {
    let fp = fingerprint(&content);
    state.clear_selection();
    state.adopt(content, fp);
    state.set_current_file(Some(path.to_path_buf()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsError;
    use crate::fs::memory::MemoryFileSystem;
    use crate::selection::SelectionOffsets;

    /// Records the suggested name and answers with a fixed path.
    struct ScriptedPrompt {
        answer: Option<PathBuf>,
        asked: Vec<String>,
    }

    impl ScriptedPrompt {
        fn answering(path: Option<&str>) -> Self {
            Self {
                answer: path.map(PathBuf::from),
                asked: Vec::new(),
            }
        }
    }

    impl SavePrompt for ScriptedPrompt {
        fn choose_save_path(&mut self, suggested_name: &str) -> Option<PathBuf> {
            self.asked.push(suggested_name.to_string());
            self.answer.clone()
        }
    }

    #[test]
    fn open_adopts_content_and_identity() {
        let fs = MemoryFileSystem::new();
        fs.put("/n/a.md", "# A\n");
        let mut state = EditorState::new();
        state.edit("scratch".to_string());
        state.raise_conflict();

        open(&fs, &mut state, Path::new("/n/a.md")).unwrap();
        assert_eq!(state.content(), "# A\n");
        assert_eq!(state.current_file(), Some(Path::new("/n/a.md")));
        assert_eq!(state.last_saved_fingerprint(), &fingerprint("# A\n"));
        assert!(!state.is_dirty());
        assert!(!state.conflict_visible());
    }

    #[test]
    fn failed_open_leaves_state_untouched() {
        let fs = MemoryFileSystem::new();
        let mut state = EditorState::new();
        state.edit("scratch".to_string());

        let err = open(&fs, &mut state, Path::new("/missing.md")).unwrap_err();
        assert_eq!(err, FileOpError::Fs(FsError::NotFound(PathBuf::from("/missing.md"))));
        assert_eq!(state.content(), "scratch");
        assert!(state.is_dirty());
        assert!(state.current_file().is_none());
    }

    #[test]
    fn save_writes_and_clears_dirty() {
        let fs = MemoryFileSystem::new();
        fs.put("/n/a.md", "old");
        let mut state = EditorState::new();
        open(&fs, &mut state, Path::new("/n/a.md")).unwrap();
        state.edit("new".to_string());
        state.raise_conflict();

        let mut prompt = ScriptedPrompt::answering(None);
        save(&fs, &mut state, &mut prompt).unwrap();
        assert!(prompt.asked.is_empty());
        assert_eq!(fs.content("/n/a.md").as_deref(), Some("new"));
        assert_eq!(state.last_saved_fingerprint(), &fingerprint("new"));
        assert!(!state.is_dirty());
        assert!(!state.conflict_visible());
    }

    #[test]
    fn save_without_file_asks_for_destination() {
        let fs = MemoryFileSystem::new();
        let mut state = EditorState::new();
        state.edit("draft".to_string());

        let mut prompt = ScriptedPrompt::answering(Some("/n/draft.md"));
        save(&fs, &mut state, &mut prompt).unwrap();
        assert_eq!(prompt.asked, vec!["Untitled.md".to_string()]);
        assert_eq!(state.current_file(), Some(Path::new("/n/draft.md")));
        assert_eq!(fs.content("/n/draft.md").as_deref(), Some("draft"));
    }

    #[test]
    fn cancelled_save_as_changes_nothing() {
        let fs = MemoryFileSystem::new();
        let mut state = EditorState::new();
        state.edit("draft".to_string());

        let mut prompt = ScriptedPrompt::answering(None);
        assert_eq!(save_as(&fs, &mut state, &mut prompt), Err(FileOpError::Cancelled));
        assert!(state.is_dirty());
        assert!(state.current_file().is_none());
        assert!(state.last_saved_fingerprint().is_none());
    }

    #[test]
    fn failed_write_keeps_previous_identity() {
        let fs = MemoryFileSystem::new();
        fs.put("/n/a.md", "a");
        fs.set_read_only("/n/locked.md");
        let mut state = EditorState::new();
        open(&fs, &mut state, Path::new("/n/a.md")).unwrap();
        state.edit("changed".to_string());

        let mut prompt = ScriptedPrompt::answering(Some("/n/locked.md"));
        let err = save_as(&fs, &mut state, &mut prompt).unwrap_err();
        assert!(matches!(err, FileOpError::Fs(FsError::PermissionDenied(_))));
        assert_eq!(prompt.asked, vec!["a.md".to_string()]);
        assert_eq!(state.current_file(), Some(Path::new("/n/a.md")));
        assert!(state.is_dirty());
        assert_eq!(state.last_saved_fingerprint(), &fingerprint("a"));
    }

    #[test]
    fn auto_save_disabled_is_a_noop() {
        let fs = MemoryFileSystem::new();
        let mut state = EditorState::new();
        state.edit("draft".to_string());
        let settings = Settings {
            auto_save_before_send: false,
            ..Settings::default()
        };
        let mut prompt = ScriptedPrompt::answering(Some("/n/x.md"));
        auto_save_if_needed(&fs, &mut state, &settings, &mut prompt).unwrap();
        assert!(prompt.asked.is_empty());
        assert!(state.is_dirty());
    }

    #[test]
    fn auto_save_with_file_saves_in_place() {
        let fs = MemoryFileSystem::new();
        fs.put("/n/a.md", "a");
        let mut state = EditorState::new();
        open(&fs, &mut state, Path::new("/n/a.md")).unwrap();
        state.edit("b".to_string());

        let mut prompt = ScriptedPrompt::answering(None);
        auto_save_if_needed(&fs, &mut state, &Settings::default(), &mut prompt).unwrap();
        assert_eq!(fs.content("/n/a.md").as_deref(), Some("b"));
        assert!(!state.is_dirty());
    }

    #[test]
    fn auto_save_untitled_with_content_asks() {
        let fs = MemoryFileSystem::new();
        let mut state = EditorState::new();
        state.edit("draft".to_string());
        let mut prompt = ScriptedPrompt::answering(None);
        assert_eq!(
            auto_save_if_needed(&fs, &mut state, &Settings::default(), &mut prompt),
            Err(FileOpError::Cancelled)
        );
        assert_eq!(prompt.asked.len(), 1);
    }

    #[test]
    fn auto_save_empty_untitled_is_a_noop() {
        let fs = MemoryFileSystem::new();
        let mut state = EditorState::new();
        let mut prompt = ScriptedPrompt::answering(Some("/n/x.md"));
        auto_save_if_needed(&fs, &mut state, &Settings::default(), &mut prompt).unwrap();
        assert!(prompt.asked.is_empty());
        assert!(!fs.exists(Path::new("/n/x.md")));
    }

    #[test]
    fn new_file_creates_empty_clean_buffer() {
        let fs = MemoryFileSystem::new();
        let mut state = EditorState::new();
        state.edit("old".to_string());
        new_file(&fs, &mut state, Path::new("/n/new.md")).unwrap();
        assert_eq!(fs.content("/n/new.md").as_deref(), Some(""));
        assert_eq!(state.content(), "");
        assert!(!state.is_dirty());
        assert_eq!(state.last_saved_fingerprint(), &fingerprint(""));
    }

    #[test]
    fn open_as_markdown_copies_into_destination() {
        let fs = MemoryFileSystem::new();
        fs.put("/n/notes.txt", "plain");
        let mut state = EditorState::new();
        open_as_markdown(&fs, &mut state, Path::new("/n/notes.txt"), Path::new("/n/notes.md"))
            .unwrap();
        assert_eq!(fs.content("/n/notes.md").as_deref(), Some("plain"));
        assert_eq!(state.current_file(), Some(Path::new("/n/notes.md")));
        assert_eq!(state.content(), "plain");
    }

    #[test]
    fn failed_markdown_conversion_leaves_state_untouched() {
        let fs = MemoryFileSystem::new();
        fs.put("/n/a.md", "a");
        fs.put("/n/notes.txt", "plain");
        fs.set_read_only("/n/notes.md");
        let mut state = EditorState::new();
        open(&fs, &mut state, Path::new("/n/a.md")).unwrap();
        state.edit("a!".to_string());

        let err = open_as_markdown(
            &fs,
            &mut state,
            Path::new("/n/notes.txt"),
            Path::new("/n/notes.md"),
        )
        .unwrap_err();
        assert!(matches!(err, FileOpError::Fs(FsError::PermissionDenied(_))));
        assert_eq!(state.content(), "a!");
        assert!(state.is_dirty());
        assert_eq!(state.current_file(), Some(Path::new("/n/a.md")));
        assert_eq!(state.last_saved_fingerprint(), &fingerprint("a"));
        assert!(!fs.exists(Path::new("/n/notes.md")));
    }

    #[test]
    fn markdown_file_name_swaps_extension() {
        assert_eq!(markdown_file_name(Path::new("/n/notes.txt")), "notes.md");
        assert_eq!(markdown_file_name(Path::new("/n/archive.tar.gz")), "archive.tar.md");
        assert_eq!(markdown_file_name(Path::new("/n/README")), "README.md");
        assert_eq!(markdown_file_name(Path::new("/")), "Untitled.md");
    }

    #[test]
    fn opening_another_file_resets_selection() {
        let fs = MemoryFileSystem::new();
        fs.put("/n/a.md", "one\nsecret two\n");
        fs.put("/n/b.md", "b");
        let mut state = EditorState::new();
        open(&fs, &mut state, Path::new("/n/a.md")).unwrap();
        state.select(SelectionOffsets {
            location: 4,
            length: 10,
        });
        assert_eq!(state.selected_text(), "secret two");

        open(&fs, &mut state, Path::new("/n/b.md")).unwrap();
        assert_eq!(state.selected_text(), "");
        assert_eq!(state.selection_line_range(), None);
        assert_eq!(state.selection_offsets(), SelectionOffsets::default());
    }

    #[test]
    fn markdown_extension_detection() {
        assert!(is_markdown_path(Path::new("/a/b.md")));
        assert!(is_markdown_path(Path::new("/a/b.MARKDOWN")));
        assert!(!is_markdown_path(Path::new("/a/b.txt")));
        assert!(!is_markdown_path(Path::new("/a/README")));
    }

    #[test]
    fn option_prompt_answers_once() {
        let mut prompt: Option<PathBuf> = Some(PathBuf::from("/x.md"));
        assert_eq!(prompt.choose_save_path("a.md"), Some(PathBuf::from("/x.md")));
        assert_eq!(prompt.choose_save_path("a.md"), None);
    }
}
