use std::path::{Path, PathBuf};

/// Terminal pane collaborator. `send` writes raw text to the PTY as if the
/// user had typed it. Process management stays with the frontend.
pub trait TerminalSink {
    fn send(&self, text: &str);
}

/// Command line that starts the assistant in `directory`, passing the open
/// file when there is one.
pub fn claude_launch_command(directory: &Path, command: &str, file_path: Option<&Path>) -> String {
    let mut cmd = format!("cd \"{}\" && {}", directory.display(), command);
    if let Some(path) = file_path {
        cmd.push_str(&format!(" \"{}\"", path.display()));
    }
    cmd.push('\n');
    cmd
}

/// Directory the assistant is started in: the file's parent, else home.
pub fn launch_directory(file_path: Option<&Path>) -> PathBuf {
    file_path
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Launch command for `file_path`, run from [`launch_directory`].
pub fn claude_command_for(command: &str, file_path: Option<&Path>) -> String {
    claude_launch_command(&launch_directory(file_path), command, file_path)
}

pub fn run_claude(terminal: &dyn TerminalSink, command: &str, file_path: Option<&Path>) {
    log::info!("Starting '{}' for {:?}", command, file_path);
    terminal.send(&claude_command_for(command, file_path));
}

/// Submit a prompt as input to whatever is running in the terminal.
pub fn inject_prompt(terminal: &dyn TerminalSink, prompt: &str) {
    terminal.send(&format!("{}\n", prompt));
}

/// Sink that records everything sent, for frontends that write the text to
/// the PTY themselves and for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: std::cell::RefCell<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<String> {
        self.sent.take()
    }

    /// Everything sent so far, concatenated.
    pub fn joined(&self) -> String {
        self.sent.borrow().concat()
    }
}

impl TerminalSink for RecordingSink {
    fn send(&self, text: &str) {
        self.sent.borrow_mut().push(text.to_string());
    }
}
