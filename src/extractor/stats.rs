use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Thread-safe run counters, incremented by any worker and read once at the
/// end of the run. No ordering is required among increments; only the final
/// totals matter.
pub struct RunStats {
    folders_created: AtomicU64,
    files_created: AtomicU64,
    duplicates_skipped: AtomicU64,
    errors: AtomicU64,
    error_details: Mutex<Vec<String>>,
    started: Instant,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            folders_created: AtomicU64::new(0),
            files_created: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            error_details: Mutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    pub fn folder_created(&self) {
        self.folders_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_created(&self) {
        self.files_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error<S: Into<String>>(&self, detail: S) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.error_details
            .lock()
            .expect("error list poisoned")
            .push(detail.into());
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            folders_created: self.folders_created.load(Ordering::Relaxed),
            files_created: self.files_created.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            error_details: self
                .error_details
                .lock()
                .expect("error list poisoned")
                .clone(),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Final totals for one run, reported to the user and serializable for JSON
/// output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub folders_created: u64,
    pub files_created: u64,
    pub duplicates_skipped: u64,
    pub errors: u64,
    pub error_details: Vec<String>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

/// Format a duration using the largest applicable unit.
pub fn format_elapsed(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 86_400 {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3_600)
    } else if secs >= 3_600 {
        format!("{}h {}m", secs / 3_600, (secs % 3_600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = RunStats::new();
        stats.folder_created();
        stats.file_created();
        stats.file_created();
        stats.duplicate_skipped();
        stats.error("boom");

        let summary = stats.summary();
        assert_eq!(summary.folders_created, 1);
        assert_eq!(summary.files_created, 2);
        assert_eq!(summary.duplicates_skipped, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.error_details, vec!["boom".to_string()]);
    }

    #[test]
    fn test_concurrent_increments() {
        use std::sync::Arc;

        let stats = Arc::new(RunStats::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    stats.file_created();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.summary().files_created, 8000);
    }

    #[test]
    fn test_format_elapsed_units() {
        assert_eq!(format_elapsed(Duration::from_millis(450)), "450ms");
        assert_eq!(format_elapsed(Duration::from_secs(30)), "30s");
        assert_eq!(format_elapsed(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_elapsed(Duration::from_secs(3_700)), "1h 1m");
        assert_eq!(format_elapsed(Duration::from_secs(90_000)), "1d 1h");
    }
}
