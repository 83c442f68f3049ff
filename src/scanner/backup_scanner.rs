use crate::error::{MmsMediaError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One backup document queued for extraction.
#[derive(Debug, Clone)]
pub struct BackupFile {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
}

impl BackupFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        Self {
            path,
            filename,
            size,
        }
    }
}

/// Discovers backup documents: a single `.xml` file, or every `.xml` under a
/// directory up to an optional depth limit.
pub struct BackupScanner {
    max_depth: Option<usize>,
}

impl BackupScanner {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self { max_depth }
    }

    pub fn scan<P: AsRef<Path>>(&self, input: P) -> Result<Vec<BackupFile>> {
        let input = input.as_ref();

        if !input.exists() {
            return Err(MmsMediaError::InvalidPath {
                path: input.display().to_string(),
            });
        }

        if input.is_file() {
            let size = std::fs::metadata(input)?.len();
            return Ok(vec![BackupFile::new(input.to_path_buf(), size)]);
        }

        let mut walker = WalkDir::new(input).follow_links(false);
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut backups = Vec::new();
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if !is_xml(entry.path()) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            backups.push(BackupFile::new(entry.path().to_path_buf(), size));
        }

        if backups.is_empty() {
            return Err(MmsMediaError::NoBackupsFound {
                path: input.display().to_string(),
            });
        }

        // Deterministic processing order across runs
        backups.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(backups)
    }
}

fn is_xml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_single_file_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sms-20141122183844.xml");
        fs::write(&path, "<smses/>").unwrap();

        let backups = BackupScanner::new(None).scan(&path).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].filename, "sms-20141122183844.xml");
    }

    #[test]
    fn test_directory_input_finds_only_xml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.xml"), "<smses/>").unwrap();
        fs::write(dir.path().join("b.XML"), "<smses/>").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let nested = dir.path().join("old");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("c.xml"), "<smses/>").unwrap();

        let backups = BackupScanner::new(None).scan(dir.path()).unwrap();
        let names: Vec<_> = backups.iter().map(|b| b.filename.as_str()).collect();
        assert_eq!(names, vec!["a.xml", "b.XML", "c.xml"]);
    }

    #[test]
    fn test_max_depth_limits_recursion() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("top.xml"), "<smses/>").unwrap();
        let nested = dir.path().join("deep");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("below.xml"), "<smses/>").unwrap();

        let backups = BackupScanner::new(Some(1)).scan(dir.path()).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].filename, "top.xml");
    }

    #[test]
    fn test_empty_directory_is_fatal() {
        let dir = TempDir::new().unwrap();
        let error = BackupScanner::new(None).scan(dir.path()).unwrap_err();
        assert!(matches!(error, MmsMediaError::NoBackupsFound { .. }));
        assert!(error.is_startup_fatal());
    }

    #[test]
    fn test_missing_input_is_invalid_path() {
        let error = BackupScanner::new(None)
            .scan("/definitely/not/here")
            .unwrap_err();
        assert!(matches!(error, MmsMediaError::InvalidPath { .. }));
    }
}
