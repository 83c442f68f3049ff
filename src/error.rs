use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MmsMediaError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },

    #[error("No backup documents found under: {path}")]
    NoBackupsFound { path: String },

    #[error("Fingerprint store exists but could not be read: {path}")]
    StoreUnreadable { path: String, message: String },

    #[error("XML parse error in {path}: {message}")]
    XmlParse { path: String, message: String },

    #[error("Attachment payload is not valid base64: {context}")]
    Base64Decode { context: String },

    #[error("Device out of space while writing: {path}")]
    StorageFull { path: String },

    #[error("Permission denied: {path}")]
    Permission { path: String },

    #[error("Failed to set file timestamp on {path}: {message}")]
    Timestamp { path: String, message: String },

    #[error("Worker panicked while processing a record: {message}")]
    WorkerPanic { message: String },

    #[error("Failed to persist fingerprint store to {path}: {message}")]
    StorePersist { path: String, message: String },
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for MmsMediaError {
    fn user_message(&self) -> String {
        match self {
            MmsMediaError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            MmsMediaError::InvalidPath { path } => {
                format!("Invalid path: {}", path)
            }
            MmsMediaError::NoBackupsFound { path } => {
                format!("No .xml backup documents found under: {}", path)
            }
            MmsMediaError::StoreUnreadable { path, message } => {
                format!("Fingerprint store at {} is unreadable: {}", path, message)
            }
            MmsMediaError::StorageFull { path } => {
                format!("The device ran out of space while writing: {}", path)
            }
            MmsMediaError::Permission { path } => {
                format!("Permission denied accessing: {}", path)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            MmsMediaError::Config { .. } => Some(
                "Check your configuration file syntax, or regenerate one with --generate-config."
                    .to_string(),
            ),
            MmsMediaError::NoBackupsFound { .. } => Some(
                "Point the input path at an SMS Backup & Restore XML export, or a directory \
                 containing them. Use --max-depth to recurse deeper."
                    .to_string(),
            ),
            MmsMediaError::StoreUnreadable { .. } => Some(
                "The saved-hashes file is corrupt or inaccessible. Delete it to reset the \
                 duplicate history, or pass a different path with --saved-hashes."
                    .to_string(),
            ),
            MmsMediaError::StorageFull { .. } => Some(
                "Free up disk space on the output volume, or choose a different output folder."
                    .to_string(),
            ),
            MmsMediaError::Permission { .. } => Some(
                "Ensure you have read/write permission for the input and output directories."
                    .to_string(),
            ),
            MmsMediaError::XmlParse { .. } => Some(
                "The backup may be malformed or truncated. Try --permissive, or repair the \
                 document with an entity-fixer tool before extracting."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for MmsMediaError {
    fn from(error: toml::de::Error) -> Self {
        MmsMediaError::Config {
            message: error.to_string(),
        }
    }
}

impl MmsMediaError {
    /// Classify a write failure so out-of-space and permission problems get a
    /// specific, actionable message instead of a generic IO error.
    pub fn classify_write(error: std::io::Error, path: &Path) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::PermissionDenied => MmsMediaError::Permission {
                path: path.display().to_string(),
            },
            ErrorKind::StorageFull => MmsMediaError::StorageFull {
                path: path.display().to_string(),
            },
            _ => MmsMediaError::Io(error),
        }
    }

    /// Startup-fatal errors abort the run before the pipeline starts; all
    /// others are isolated to an attachment, record, or persistence attempt.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            MmsMediaError::Config { .. }
                | MmsMediaError::InvalidPath { .. }
                | MmsMediaError::NoBackupsFound { .. }
                | MmsMediaError::StoreUnreadable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MmsMediaError>;
