//! C-compatible FFI wrappers around termmd-core for the macOS frontend.
//!
//! All functions use C strings for input/output and JSON encoding for
//! complex types. Callers must free returned strings with `termmd_free_string`.
//!
//! All extern "C" functions are wrapped in `ffi_catch` to prevent Rust
//! panics from crossing the FFI boundary (which is undefined behavior).
//! Panic payloads are logged before returning the fallback value.
//!
//! A session handle must only be used from the thread that created it (the
//! AppKit main thread). Disk polling runs on a private Tokio runtime; call
//! `termmd_session_pump` from a main-thread timer to apply its results.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use termmd_core::error::FileOpError;
use termmd_core::fs::LocalFileSystem;
use termmd_core::selection::{self, LineRange, Selection, SelectionOffsets};
use termmd_core::session::Session;
use termmd_core::settings::{self, Settings};
use termmd_core::terminal::RecordingSink;
use tokio::runtime::Runtime;

/// Run `f` inside `catch_unwind`, logging the panic payload before returning the
/// fallback value.
fn ffi_catch<T>(fallback: T, f: impl FnOnce() -> T + std::panic::UnwindSafe) -> T {
    match catch_unwind(f) {
        Ok(v) => v,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            log::error!("FFI panic caught: {}", msg);
            fallback
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_rust_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: Caller guarantees `ptr` is a valid, null-terminated C string
    // whose memory remains valid for the duration of this call.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(String::from)
}

fn to_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => {
            log::warn!(
                "String contains interior NUL bytes, sanitizing ({} chars)",
                s.len()
            );
            let sanitized: String = s.chars().filter(|&c| c != '\0').collect();
            CString::new(sanitized).unwrap_or_default().into_raw()
        }
    }
}

fn to_json_c_string<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => to_c_string(&json),
        Err(e) => {
            log::error!("JSON serialization failed: {}", e);
            to_c_string(&serde_json::json!({ "error": e.to_string() }).to_string())
        }
    }
}

/// Map a file operation result to a status code: 0 on success, 1 when the
/// user cancelled, -1 on failure.
fn op_status(op: &str, result: Result<(), FileOpError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(FileOpError::Cancelled) => 1,
        Err(e) => {
            log::warn!("{} failed: {}", op, e);
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// Memory management and logging
// ---------------------------------------------------------------------------

/// Free a string previously returned by a `termmd_*` function.
#[no_mangle]
pub extern "C" fn termmd_free_string(s: *mut c_char) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if !s.is_null() {
                // SAFETY: `s` was previously returned by `CString::into_raw` from
                // one of the `termmd_*` functions, so it is valid to reclaim it.
                unsafe {
                    drop(CString::from_raw(s));
                }
            }
        }),
    );
}

/// Install the `env_logger` backend. `RUST_LOG` controls the filter.
/// Safe to call more than once.
#[no_mangle]
pub extern "C" fn termmd_init_logging() {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            let _ = env_logger::try_init();
        }),
    );
}

// ---------------------------------------------------------------------------
// Prompt building
// ---------------------------------------------------------------------------

/// Build the "with line refs" prompt.
///
/// `file_path` may be null for an unsaved buffer. A `start_line` or
/// `end_line` of 0 means the line range is unknown.
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_build_prompt_with_line_refs(
    file_path: *const c_char,
    start_line: u32,
    end_line: u32,
    selected_text: *const c_char,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let selected_text = match to_rust_str(selected_text) {
                Some(s) => s,
                None => return std::ptr::null_mut(),
            };
            let file_path = to_rust_str(file_path).map(PathBuf::from);
            let line_range = (start_line > 0 && end_line > 0).then_some(LineRange {
                start: start_line,
                end: end_line,
            });
            to_c_string(&termmd_core::prompt::build_with_line_refs(
                file_path.as_deref(),
                line_range,
                &selected_text,
            ))
        }),
    )
}

/// Build the "selection only" prompt.
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_build_prompt_selection_only(selected_text: *const c_char) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| match to_rust_str(selected_text) {
            Some(text) => to_c_string(&termmd_core::prompt::build_selection_only(&text)),
            None => std::ptr::null_mut(),
        }),
    )
}

/// Return the SHA-256 fingerprint of `text` as lowercase hex.
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_fingerprint(text: *const c_char) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| match to_rust_str(text) {
            Some(text) => to_c_string(termmd_core::hash::fingerprint(&text).as_str()),
            None => std::ptr::null_mut(),
        }),
    )
}

/// Whether `path` has a Markdown extension. Used to decide whether to offer
/// converting an opened file.
#[no_mangle]
pub extern "C" fn termmd_is_markdown_path(path: *const c_char) -> bool {
    ffi_catch(
        false,
        AssertUnwindSafe(|| {
            to_rust_str(path)
                .map(|p| termmd_core::file_ops::is_markdown_path(Path::new(&p)))
                .unwrap_or(false)
        }),
    )
}

/// Save-dialog name for converting `path` to Markdown (`{stem}.md`).
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_markdown_file_name(path: *const c_char) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| match to_rust_str(path) {
            Some(p) => to_c_string(&termmd_core::file_ops::markdown_file_name(Path::new(&p))),
            None => std::ptr::null_mut(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Line selection
// ---------------------------------------------------------------------------

/// 1-based line containing the UTF-16 offset `index` of `buffer`, for
/// mapping a gutter click to a line. Returns 0 if `buffer` is null.
#[no_mangle]
pub extern "C" fn termmd_line_at(buffer: *const c_char, index: u64) -> u32 {
    ffi_catch(
        0,
        AssertUnwindSafe(|| match to_rust_str(buffer) {
            Some(buffer) => selection::line_at(&buffer, index as usize),
            None => 0,
        }),
    )
}

/// UTF-16 offsets covering lines `start_line..=end_line` of `buffer`, as
/// JSON `{"location": .., "length": ..}`.
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_selection_for_lines(
    buffer: *const c_char,
    start_line: u32,
    end_line: u32,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| match to_rust_str(buffer) {
            Some(buffer) => to_json_c_string(&Selection::offsets_for_lines(
                &buffer, start_line, end_line,
            )),
            None => std::ptr::null_mut(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Load settings from the default location as JSON.
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_settings_load() -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| to_json_c_string(&settings::load())),
    )
}

/// Persist settings given as JSON. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn termmd_settings_save(settings_json: *const c_char) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(parsed) = parse_settings(settings_json) else {
                return -1;
            };
            match settings::save(&parsed) {
                Ok(()) => 0,
                Err(e) => {
                    log::warn!("Failed to save settings: {}", e);
                    -1
                }
            }
        }),
    )
}

/// Return the JSON Schema of the settings object.
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_settings_schema() -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| to_json_c_string(&settings::settings_schema())),
    )
}

/// Whether the shell path in the given settings JSON is an executable file.
#[no_mangle]
pub extern "C" fn termmd_settings_shell_path_valid(settings_json: *const c_char) -> bool {
    ffi_catch(
        false,
        AssertUnwindSafe(|| {
            parse_settings(settings_json)
                .map(|s| s.shell_path_is_executable())
                .unwrap_or(false)
        }),
    )
}

fn parse_settings(settings_json: *const c_char) -> Option<Settings> {
    let json = to_rust_str(settings_json)?;
    match serde_json::from_str(&json) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            log::warn!("Invalid settings JSON: {}", e);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Editor session
// ---------------------------------------------------------------------------

/// Inner data for a session handle, stored in the global registry.
struct SessionInner {
    session: parking_lot::Mutex<Session>,
    // Keeps the poller's runtime alive for as long as the session.
    _runtime: Runtime,
}

/// Global registry mapping handle addresses to their inner data.
/// Handles are never dereferenced; the pointer is only an opaque key.
/// Uses `parking_lot::Mutex` to avoid mutex poisoning issues.
fn session_registry() -> &'static parking_lot::Mutex<HashMap<usize, Arc<SessionInner>>> {
    static REGISTRY: OnceLock<parking_lot::Mutex<HashMap<usize, Arc<SessionInner>>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| parking_lot::Mutex::new(HashMap::new()))
}

/// Look up a handle in the global registry and run `f` with its session.
/// Returns `default` if the handle is null or freed.
fn with_session<T>(handle: *mut SessionHandle, default: T, f: impl FnOnce(&mut Session) -> T) -> T {
    if handle.is_null() {
        return default;
    }
    let key = handle as usize;
    let guard = session_registry().lock();
    match guard.get(&key) {
        Some(inner) => {
            let inner = Arc::clone(inner);
            drop(guard); // Release lock before calling f
            let mut session = inner.session.lock();
            f(&mut session)
        }
        None => {
            log::warn!("Attempted to use invalid or freed session handle");
            default
        }
    }
}

/// Opaque handle token for the C API, used only as a registry key.
/// Not zero-sized, so every boxed handle gets its own address.
pub struct SessionHandle {
    _private: u8,
}

/// Create an editor session with background disk polling.
///
/// `settings_json` may be null to load settings from the default location.
/// Returns an opaque handle. The caller must free it with `termmd_session_free`.
#[no_mangle]
pub extern "C" fn termmd_session_new(settings_json: *const c_char) -> *mut SessionHandle {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let settings = if settings_json.is_null() {
                settings::load()
            } else {
                match parse_settings(settings_json) {
                    Some(s) => s,
                    None => return std::ptr::null_mut(),
                }
            };

            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("termmd-poll")
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to create Tokio runtime for file polling: {}", e);
                    return std::ptr::null_mut();
                }
            };

            let mut session = Session::new(Arc::new(LocalFileSystem), settings);
            session.attach_poller(runtime.handle());

            let inner = Arc::new(SessionInner {
                session: parking_lot::Mutex::new(session),
                _runtime: runtime,
            });

            // Allocate a stable address to use as an opaque handle key
            let handle = Box::into_raw(Box::new(SessionHandle { _private: 0 }));
            session_registry().lock().insert(handle as usize, inner);
            handle
        }),
    )
}

/// Free a session handle and stop its poller.
#[no_mangle]
pub extern "C" fn termmd_session_free(handle: *mut SessionHandle) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| {
            if handle.is_null() {
                return;
            }
            let key = handle as usize;
            let inner = session_registry().lock().remove(&key);
            match inner {
                Some(inner) => {
                    inner.session.lock().detach_poller();
                    drop(inner);
                }
                None => {
                    log::warn!("termmd_session_free called on already-freed handle");
                    return; // Don't double-free
                }
            }
            // SAFETY: `handle` was allocated by `Box::into_raw` in `termmd_session_new`.
            // The registry removal above ensures this only happens once per handle.
            unsafe {
                drop(Box::from_raw(handle));
            }
        }),
    );
}

/// Return the session state as JSON: content, dirty flag, current file,
/// selection, conflict banner visibility and window title.
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_session_state(handle: *mut SessionHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_session(handle, std::ptr::null_mut(), |session| {
                to_json_c_string(&session.snapshot())
            })
        }),
    )
}

/// Content-change event from the text view. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn termmd_session_edit(handle: *mut SessionHandle, content: *const c_char) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(content) = to_rust_str(content) else {
                return -1;
            };
            with_session(handle, -1, |session| {
                session.edit(content);
                0
            })
        }),
    )
}

/// Selection-change event from the text view. `location` and `length` are
/// UTF-16 offsets (`NSRange`). Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn termmd_session_select(
    handle: *mut SessionHandle,
    location: u64,
    length: u64,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            with_session(handle, -1, |session| {
                session.select(SelectionOffsets {
                    location: location as usize,
                    length: length as usize,
                });
                0
            })
        }),
    )
}

/// Select whole lines from the gutter. Returns the applied offsets as JSON
/// so the text view can show the same range.
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_session_select_lines(
    handle: *mut SessionHandle,
    start_line: u32,
    end_line: u32,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_session(handle, std::ptr::null_mut(), |session| {
                to_json_c_string(&session.select_lines(start_line, end_line))
            })
        }),
    )
}

/// Open `path`. Returns 0 on success, -1 on error.
///
/// On success a `ClaudeLaunch` event carrying the assistant's launch command
/// is queued; it is returned by the next `termmd_session_pump`.
#[no_mangle]
pub extern "C" fn termmd_session_open(handle: *mut SessionHandle, path: *const c_char) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(path) = to_rust_str(path) else {
                return -1;
            };
            with_session(handle, -1, |session| {
                op_status("Open", session.open(Path::new(&path)))
            })
        }),
    )
}

/// Open `source` by saving its content as the Markdown file `dest`.
/// Returns 0 on success, -1 on error.
///
/// On success a `ClaudeLaunch` event carrying the assistant's launch command
/// is queued; it is returned by the next `termmd_session_pump`.
#[no_mangle]
pub extern "C" fn termmd_session_open_as_markdown(
    handle: *mut SessionHandle,
    source: *const c_char,
    dest: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let (Some(source), Some(dest)) = (to_rust_str(source), to_rust_str(dest)) else {
                return -1;
            };
            with_session(handle, -1, |session| {
                op_status(
                    "Open as Markdown",
                    session.open_as_markdown(Path::new(&source), Path::new(&dest)),
                )
            })
        }),
    )
}

/// Create an empty file at `path` and make it current.
/// Returns 0 on success, -1 on error.
///
/// On success a `ClaudeLaunch` event carrying the assistant's launch command
/// is queued; it is returned by the next `termmd_session_pump`.
#[no_mangle]
pub extern "C" fn termmd_session_new_file(handle: *mut SessionHandle, path: *const c_char) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(path) = to_rust_str(path) else {
                return -1;
            };
            with_session(handle, -1, |session| {
                op_status("New file", session.new_file(Path::new(&path)))
            })
        }),
    )
}

/// Save the buffer. `save_path` answers the save dialog when the buffer has
/// no file yet; pass null to mean the dialog was cancelled.
///
/// Returns 0 on success, 1 if cancelled, -1 on error.
#[no_mangle]
pub extern "C" fn termmd_session_save(handle: *mut SessionHandle, save_path: *const c_char) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let mut answer = to_rust_str(save_path).map(PathBuf::from);
            with_session(handle, -1, |session| op_status("Save", session.save(&mut answer)))
        }),
    )
}

/// Save the buffer to `path`, which becomes the current file. A null path
/// means the dialog was cancelled.
///
/// Returns 0 on success, 1 if cancelled, -1 on error.
#[no_mangle]
pub extern "C" fn termmd_session_save_as(handle: *mut SessionHandle, path: *const c_char) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let mut answer = to_rust_str(path).map(PathBuf::from);
            with_session(handle, -1, |session| {
                op_status("Save as", session.save_as(&mut answer))
            })
        }),
    )
}

/// Save if auto-save before send is enabled. Returns 0 when saved or when
/// no save was needed, 1 if cancelled, -1 on error.
#[no_mangle]
pub extern "C" fn termmd_session_auto_save(
    handle: *mut SessionHandle,
    save_path: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let mut answer = to_rust_str(save_path).map(PathBuf::from);
            with_session(handle, -1, |session| {
                op_status("Auto-save", session.auto_save_if_needed(&mut answer))
            })
        }),
    )
}

/// "Reload" button of the conflict banner. Returns 0 on success, -1 if the
/// file could not be read.
#[no_mangle]
pub extern "C" fn termmd_session_reload(handle: *mut SessionHandle) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            with_session(handle, -1, |session| {
                if session.reload_from_disk() {
                    0
                } else {
                    -1
                }
            })
        }),
    )
}

/// "Ignore" button of the conflict banner.
#[no_mangle]
pub extern "C" fn termmd_session_ignore_conflict(handle: *mut SessionHandle) {
    ffi_catch(
        (),
        AssertUnwindSafe(|| with_session(handle, (), |session| session.ignore_conflict())),
    );
}

/// Apply pending disk observations and return the resulting session events
/// as a JSON array (possibly empty).
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_session_pump(handle: *mut SessionHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_session(handle, std::ptr::null_mut(), |session| {
                session.pump();
                to_json_c_string(&session.take_events())
            })
        }),
    )
}

/// Replace the session's settings with the given JSON.
/// Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn termmd_session_update_settings(
    handle: *mut SessionHandle,
    settings_json: *const c_char,
) -> i32 {
    ffi_catch(
        -1,
        AssertUnwindSafe(|| {
            let Some(parsed) = parse_settings(settings_json) else {
                return -1;
            };
            with_session(handle, -1, |session| {
                session.set_settings(parsed);
                0
            })
        }),
    )
}

/// Return the text to write to the terminal to start the assistant next to
/// the current file.
/// The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_session_claude_command(handle: *mut SessionHandle) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            with_session(handle, std::ptr::null_mut(), |session| {
                let sink = RecordingSink::new();
                session.run_claude(&sink);
                to_c_string(&sink.joined())
            })
        }),
    )
}

/// "Send to Claude (with line refs)". Auto-saves when configured, using
/// `save_path` to answer the save dialog for an untitled buffer.
///
/// Returns the text to write to the terminal, or null when nothing is
/// selected. The caller must free the returned string with `termmd_free_string`.
#[no_mangle]
pub extern "C" fn termmd_session_send_with_line_refs(
    handle: *mut SessionHandle,
    save_path: *const c_char,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let mut answer = to_rust_str(save_path).map(PathBuf::from);
            with_session(handle, std::ptr::null_mut(), |session| {
                let sink = RecordingSink::new();
                if session.send_with_line_refs(&sink, &mut answer) {
                    to_c_string(&sink.joined())
                } else {
                    std::ptr::null_mut()
                }
            })
        }),
    )
}

/// "Send to Claude (selection only)". Same contract as
/// `termmd_session_send_with_line_refs`.
#[no_mangle]
pub extern "C" fn termmd_session_send_selection_only(
    handle: *mut SessionHandle,
    save_path: *const c_char,
) -> *mut c_char {
    ffi_catch(
        std::ptr::null_mut(),
        AssertUnwindSafe(|| {
            let mut answer = to_rust_str(save_path).map(PathBuf::from);
            with_session(handle, std::ptr::null_mut(), |session| {
                let sink = RecordingSink::new();
                if session.send_selection_only(&sink, &mut answer) {
                    to_c_string(&sink.joined())
                } else {
                    std::ptr::null_mut()
                }
            })
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    /// Take ownership of a returned string.
    fn take(ptr: *mut c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        termmd_free_string(ptr);
        Some(s)
    }

    fn test_settings() -> CString {
        c(r#"{"claude_command":"claude","auto_save_before_send":true,"shell_path":"/bin/sh","poll_interval_ms":50}"#)
    }

    #[test]
    fn prompt_with_line_refs_over_ffi() {
        let path = c("/tmp/a.md");
        let text = c("foo\nbar");
        let out = take(termmd_build_prompt_with_line_refs(path.as_ptr(), 3, 5, text.as_ptr()));
        assert_eq!(
            out.unwrap(),
            "I am working on the file: /tmp/a.md\n\nThe selected text at lines 3-5 is:\n\n```\nfoo\nbar\n```\n\nPlease read this file first, then make the following change: "
        );
    }

    #[test]
    fn prompt_with_null_path_and_zero_lines() {
        let text = c("x");
        let out = take(termmd_build_prompt_with_line_refs(
            std::ptr::null(),
            0,
            0,
            text.as_ptr(),
        ))
        .unwrap();
        assert!(out.contains("Untitled (unsaved)"));
        assert!(out.contains("unknown lines"));
    }

    #[test]
    fn selection_only_null_input_returns_null() {
        assert!(termmd_build_prompt_selection_only(std::ptr::null()).is_null());
    }

    #[test]
    fn fingerprint_over_ffi() {
        let text = c("abc");
        assert_eq!(
            take(termmd_fingerprint(text.as_ptr())).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn markdown_path_over_ffi() {
        assert!(termmd_is_markdown_path(c("/a/b.md").as_ptr()));
        assert!(!termmd_is_markdown_path(c("/a/b.txt").as_ptr()));
        assert!(!termmd_is_markdown_path(std::ptr::null()));
    }

    #[test]
    fn null_and_freed_handles_are_rejected() {
        assert_eq!(termmd_session_reload(std::ptr::null_mut()), -1);
        assert!(termmd_session_state(std::ptr::null_mut()).is_null());

        let settings = test_settings();
        let first = termmd_session_new(settings.as_ptr());
        let second = termmd_session_new(settings.as_ptr());
        assert!(!first.is_null());
        assert_ne!(first, second);

        termmd_session_free(first);
        assert_eq!(termmd_session_edit(second, c("still alive").as_ptr()), 0);
        termmd_session_free(second);
        // Double free is logged and ignored.
        termmd_session_free(second);
    }

    #[test]
    fn invalid_settings_json_fails_session_creation() {
        let bad = c("{nope");
        assert!(termmd_session_new(bad.as_ptr()).is_null());
    }

    #[test]
    fn session_open_edit_select_send() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plan.md");
        std::fs::write(&file, "one\ntwo\nthree\n").unwrap();
        let file_c = c(&file.to_string_lossy());

        let settings = test_settings();
        let handle = termmd_session_new(settings.as_ptr());
        assert_eq!(termmd_session_open(handle, file_c.as_ptr()), 0);

        let state: serde_json::Value =
            serde_json::from_str(&take(termmd_session_state(handle)).unwrap()).unwrap();
        assert_eq!(state["content"], "one\ntwo\nthree\n");
        assert_eq!(state["is_dirty"], false);
        assert_eq!(state["window_title"], "plan.md — TermMD");

        let edited = c("one\ntwo!\nthree\n");
        assert_eq!(termmd_session_edit(handle, edited.as_ptr()), 0);
        assert_eq!(termmd_session_select(handle, 4, 4), 0);

        let sent = take(termmd_session_send_with_line_refs(handle, std::ptr::null())).unwrap();
        assert!(sent.contains(&format!("I am working on the file: {}", file.display())));
        assert!(sent.contains("lines 2-2"));
        assert!(sent.ends_with("make the following change: \n"));

        // Auto-save wrote the edit.
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "one\ntwo!\nthree\n");

        termmd_session_free(handle);
    }

    #[test]
    fn session_send_without_selection_returns_null() {
        let settings = test_settings();
        let handle = termmd_session_new(settings.as_ptr());
        assert!(termmd_session_send_selection_only(handle, std::ptr::null()).is_null());
        termmd_session_free(handle);
    }

    #[test]
    fn session_save_as_cancel_and_success() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("draft.md");
        let dest_c = c(&dest.to_string_lossy());

        let settings = test_settings();
        let handle = termmd_session_new(settings.as_ptr());
        let content = c("draft");
        termmd_session_edit(handle, content.as_ptr());

        assert_eq!(termmd_session_save(handle, std::ptr::null()), 1);
        assert_eq!(termmd_session_save_as(handle, dest_c.as_ptr()), 0);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "draft");

        let events: serde_json::Value =
            serde_json::from_str(&take(termmd_session_pump(handle)).unwrap()).unwrap();
        assert_eq!(events[0]["type"], "FileChanged");

        termmd_session_free(handle);
    }

    #[test]
    fn claude_command_over_ffi() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.md");
        let file_c = c(&file.to_string_lossy());
        let settings = test_settings();
        let handle = termmd_session_new(settings.as_ptr());
        assert_eq!(termmd_session_new_file(handle, file_c.as_ptr()), 0);

        let cmd = take(termmd_session_claude_command(handle)).unwrap();
        assert_eq!(
            cmd,
            format!("cd \"{}\" && claude \"{}\"\n", dir.path().display(), file.display())
        );
        termmd_session_free(handle);
    }

    #[test]
    fn line_selection_over_ffi() {
        let buffer = c("one\ntwo\nthree");
        assert_eq!(termmd_line_at(buffer.as_ptr(), 5), 2);
        assert_eq!(termmd_line_at(std::ptr::null(), 5), 0);

        let offsets: serde_json::Value = serde_json::from_str(
            &take(termmd_selection_for_lines(buffer.as_ptr(), 2, 3)).unwrap(),
        )
        .unwrap();
        assert_eq!(offsets, serde_json::json!({ "location": 4, "length": 9 }));
    }

    #[test]
    fn session_gutter_selection_and_launch_event() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plan.md");
        std::fs::write(&file, "one\ntwo\n").unwrap();
        let file_c = c(&file.to_string_lossy());

        let settings = test_settings();
        let handle = termmd_session_new(settings.as_ptr());
        assert_eq!(termmd_session_open(handle, file_c.as_ptr()), 0);

        let offsets: serde_json::Value =
            serde_json::from_str(&take(termmd_session_select_lines(handle, 2, 2)).unwrap())
                .unwrap();
        assert_eq!(offsets, serde_json::json!({ "location": 4, "length": 4 }));
        let state: serde_json::Value =
            serde_json::from_str(&take(termmd_session_state(handle)).unwrap()).unwrap();
        assert_eq!(state["selected_text"], "two\n");

        let events: serde_json::Value =
            serde_json::from_str(&take(termmd_session_pump(handle)).unwrap()).unwrap();
        let launch = events
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["type"] == "ClaudeLaunch")
            .unwrap();
        assert_eq!(
            launch["command"],
            format!("cd \"{}\" && claude \"{}\"\n", dir.path().display(), file.display())
        );
        termmd_session_free(handle);
    }

    #[test]
    fn markdown_file_name_over_ffi() {
        let path = c("/n/notes.txt");
        assert_eq!(take(termmd_markdown_file_name(path.as_ptr())).unwrap(), "notes.md");
    }

    #[test]
    fn settings_schema_is_json_object() {
        let schema: serde_json::Value =
            serde_json::from_str(&take(termmd_settings_schema()).unwrap()).unwrap();
        assert!(schema["properties"]["claude_command"].is_object());
    }
}
