use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::error::FsError;

/// Comparable marker of a file's last modification.
///
/// For the local filesystem this is the mtime in nanoseconds since the Unix
/// epoch. Only equality is meaningful to the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ModificationMarker(pub u128);

/// Filesystem collaborator used by the file operations and the watcher.
pub trait FileSystem: Send + Sync + 'static {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError>;
    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), FsError>;
    fn exists(&self, path: &Path) -> bool;
    fn modification_marker(&self, path: &Path) -> Result<ModificationMarker, FsError>;
}

/// Read `path` as UTF-8 text. Invalid UTF-8 is reported as [`FsError::Io`].
pub fn read_text(fs: &dyn FileSystem, path: &Path) -> Result<String, FsError> {
    let bytes = fs.read_file(path)?;
    String::from_utf8(bytes).map_err(|e| FsError::Io {
        path: path.to_path_buf(),
        message: format!("File is not valid UTF-8: {}", e),
    })
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        fs::read(path).map_err(|e| FsError::from_io(path, &e))
    }

    /// Writes to a temporary file in the same directory and renames it over
    /// `path`, so a crash mid-write never leaves a truncated file. Existing
    /// permissions are preserved.
    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), FsError> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let tmp_path = parent.join(format!(
            ".{}.termmd-tmp-{}",
            file_name,
            uuid::Uuid::new_v4().as_simple()
        ));

        let cleanup = |e: std::io::Error| {
            let _ = fs::remove_file(&tmp_path);
            FsError::from_io(path, &e)
        };

        {
            let mut tmp_file = File::create(&tmp_path).map_err(|e| FsError::from_io(path, &e))?;
            tmp_file.write_all(bytes).map_err(cleanup)?;
            tmp_file.sync_all().map_err(cleanup)?;
        }

        if let Ok(metadata) = fs::metadata(path) {
            fs::set_permissions(&tmp_path, metadata.permissions()).map_err(cleanup)?;
        }

        fs::rename(&tmp_path, path).map_err(cleanup)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn modification_marker(&self, path: &Path) -> Result<ModificationMarker, FsError> {
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| FsError::from_io(path, &e))?;
        let nanos = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(ModificationMarker(nanos))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        let fs = LocalFileSystem;

        fs.write_file(&path, b"# Title\n").unwrap();
        assert!(fs.exists(&path));
        assert_eq!(read_text(&fs, &path).unwrap(), "# Title\n");
    }

    #[test]
    fn local_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        LocalFileSystem.write_file(&path, b"a").unwrap();
        LocalFileSystem.write_file(&path, b"b").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["note.md".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn local_write_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.sh");
        std::fs::write(&path, "echo hi\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        LocalFileSystem.write_file(&path, b"echo bye\n").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn local_read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.md");
        let err = LocalFileSystem.read_file(&path).unwrap_err();
        assert!(err.is_not_found());
        assert!(LocalFileSystem.modification_marker(&path).unwrap_err().is_not_found());
        assert!(!LocalFileSystem.exists(&path));
    }

    #[test]
    fn read_text_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.dat");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        match read_text(&LocalFileSystem, &path) {
            Err(FsError::Io { message, .. }) => assert!(message.contains("UTF-8")),
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn local_marker_is_stable_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "x").unwrap();
        let a = LocalFileSystem.modification_marker(&path).unwrap();
        let b = LocalFileSystem.modification_marker(&path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn memory_fs_markers_advance_on_every_write() {
        let fs = memory::MemoryFileSystem::new();
        fs.put("/a.md", "one");
        let first = fs.modification_marker(Path::new("/a.md")).unwrap();
        fs.touch("/a.md");
        let second = fs.modification_marker(Path::new("/a.md")).unwrap();
        assert_ne!(first, second);
        assert_eq!(fs.content("/a.md").as_deref(), Some("one"));
    }
}
