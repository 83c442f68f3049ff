pub mod backup_scanner;

pub use backup_scanner::{BackupFile, BackupScanner};
