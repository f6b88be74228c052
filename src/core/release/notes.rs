//! Transient release notes file.

use std::io::Write;
use std::path::Path;
use tempfile::TempPath;

use crate::error::{Error, Result};

/// Notes written next to the project for `--notes-file`. The file is removed
/// when this value drops, on every exit path.
pub struct NotesFile {
    path: TempPath,
}

impl NotesFile {
    pub fn create(dir: &Path, prefix: &str, notes: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".md")
            .tempfile_in(dir)
            .map_err(|e| Error::internal_io(e.to_string(), Some("create release notes".to_string())))?;

        file.write_all(notes.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| Error::internal_io(e.to_string(), Some("write release notes".to_string())))?;

        // Close our handle so the release tool can open the file on every platform.
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn arg(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn file_holds_notes_until_dropped() {
        let dir = TempDir::new().unwrap();
        let notes = NotesFile::create(dir.path(), "temp_release_notes", "Patch release").unwrap();
        let path = notes.path().to_path_buf();

        assert!(path.starts_with(dir.path()));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("temp_release_notes"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "Patch release");

        drop(notes);
        assert!(!path.exists());
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let result = NotesFile::create(&dir.path().join("nope"), "temp_release_notes", "x");
        assert_eq!(result.err().unwrap().code.as_str(), "internal.io_error");
    }
}
