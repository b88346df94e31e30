pub mod editor_state;
pub mod error;
pub mod file_ops;
pub mod fs;
pub mod hash;
pub mod poller;
pub mod prompt;
pub mod selection;
pub mod session;
pub mod settings;
pub mod terminal;
pub mod watcher;
