use crate::error::{MmsMediaError, Result};
use filetime::FileTime;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Writes decoded media under `<output_root>/<folder key>/`, creating each
/// folder on first use and stamping written files with the message's logical
/// timestamp.
pub struct MediaWriter {
    output_root: PathBuf,
    // Folder keys already handled this run, so concurrent workers neither
    // race on creation nor double-count it.
    seen_folders: Mutex<HashSet<String>>,
}

impl MediaWriter {
    pub fn new<P: Into<PathBuf>>(output_root: P) -> Self {
        Self {
            output_root: output_root.into(),
            seen_folders: Mutex::new(HashSet::new()),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Ensure the folder for a key exists. Returns the folder path and
    /// whether this call created a previously-absent directory.
    pub fn ensure_folder(&self, folder_key: &str) -> Result<(PathBuf, bool)> {
        let folder = self.output_root.join(folder_key);

        let mut seen = self.seen_folders.lock().expect("folder set poisoned");
        if seen.contains(folder_key) {
            return Ok((folder, false));
        }

        // Folders surviving from a previous run count as reused, not created.
        let created = if folder.is_dir() {
            false
        } else {
            fs::create_dir_all(&folder)
                .map_err(|e| MmsMediaError::classify_write(e, &folder))?;
            true
        };

        seen.insert(folder_key.to_string());
        Ok((folder, created))
    }

    /// Write the bytes, then set the file's timestamps from the message's
    /// logical time. Returns the target path; a timestamp failure after a
    /// successful write surfaces as `Timestamp` so the caller can count it
    /// separately from a failed write.
    pub fn write_media(
        &self,
        folder: &Path,
        filename: &str,
        bytes: &[u8],
        date_ms: Option<i64>,
    ) -> Result<PathBuf> {
        let target = folder.join(filename);

        fs::write(&target, bytes).map_err(|e| MmsMediaError::classify_write(e, &target))?;

        if let Some(ms) = date_ms {
            set_logical_timestamp(&target, ms)?;
        }

        Ok(target)
    }
}

fn set_logical_timestamp(path: &Path, date_ms: i64) -> Result<()> {
    let seconds = date_ms.div_euclid(1000);
    let nanos = (date_ms.rem_euclid(1000) * 1_000_000) as u32;
    let logical = FileTime::from_unix_time(seconds, nanos);

    filetime::set_file_times(path, logical, logical).map_err(|e| MmsMediaError::Timestamp {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_folder_created_once() {
        let dir = TempDir::new().unwrap();
        let writer = MediaWriter::new(dir.path());

        let (folder, created) = writer.ensure_folder("Alice").unwrap();
        assert!(created);
        assert!(folder.is_dir());

        let (_, created_again) = writer.ensure_folder("Alice").unwrap();
        assert!(!created_again);
    }

    #[test]
    fn test_preexisting_folder_not_counted_as_created() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Alice")).unwrap();

        let writer = MediaWriter::new(dir.path());
        let (_, created) = writer.ensure_folder("Alice").unwrap();
        assert!(!created);
    }

    #[test]
    fn test_write_sets_logical_timestamp() {
        let dir = TempDir::new().unwrap();
        let writer = MediaWriter::new(dir.path());
        let (folder, _) = writer.ensure_folder("Alice").unwrap();

        let date_ms = 1416680324000i64;
        let path = writer
            .write_media(&folder, "photo.jpg", b"pixels", Some(date_ms))
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"pixels");

        let mtime = FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
        assert_eq!(mtime.unix_seconds(), date_ms / 1000);
    }

    #[test]
    fn test_write_without_date_leaves_current_time() {
        let dir = TempDir::new().unwrap();
        let writer = MediaWriter::new(dir.path());
        let (folder, _) = writer.ensure_folder("Alice").unwrap();

        let path = writer
            .write_media(&folder, "clip.3gpp", b"frames", None)
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_into_missing_folder_is_classified() {
        let dir = TempDir::new().unwrap();
        let writer = MediaWriter::new(dir.path());
        let missing = dir.path().join("never-created");

        let error = writer
            .write_media(&missing, "a.jpg", b"x", None)
            .unwrap_err();
        assert!(matches!(
            error,
            MmsMediaError::Io(_) | MmsMediaError::Permission { .. }
        ));
    }
}
