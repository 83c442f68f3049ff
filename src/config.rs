use crate::error::{MmsMediaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Worker pool size; 0 means one worker per logical CPU.
    pub workers: usize,
    /// Maximum directory depth when the input path is a directory.
    pub max_depth: Option<usize>,
    /// Tolerate sloppy markup in oversized backup documents.
    pub permissive: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub base_directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Fingerprint store location; defaults to saved_hashes.json under the
    /// output root when unset.
    pub path: Option<PathBuf>,
    pub cadence: PersistCadence,
}

/// How often the fingerprint store is flushed to disk. More frequent flushing
/// is safer against crashes but serializes the whole store proportionally
/// more often.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum PersistCadence {
    PerAttachment,
    PerRecord,
    PerDocument,
    #[default]
    PerRun,
}

impl fmt::Display for PersistCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PersistCadence::PerAttachment => "per-attachment",
            PersistCadence::PerRecord => "per-record",
            PersistCadence::PerDocument => "per-document",
            PersistCadence::PerRun => "per-run",
        };
        write!(f, "{}", s)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_depth: None,
            permissive: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            cadence: PersistCadence::PerRun,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(MmsMediaError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| MmsMediaError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| MmsMediaError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["mmsmedia.toml", ".mmsmedia.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(workers) = cli_args.workers {
            self.extraction.workers = workers;
        }

        if let Some(max_depth) = cli_args.max_depth {
            self.extraction.max_depth = Some(max_depth);
        }

        if let Some(permissive) = cli_args.permissive {
            self.extraction.permissive = permissive;
        }

        if let Some(ref output_dir) = cli_args.output_dir {
            self.output.base_directory = output_dir.clone();
        }

        if let Some(ref store_path) = cli_args.store_path {
            self.store.path = Some(store_path.clone());
        }

        if let Some(cadence) = cli_args.cadence {
            self.store.cadence = cadence;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| MmsMediaError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| MmsMediaError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(depth) = self.extraction.max_depth {
            if depth == 0 {
                return Err(MmsMediaError::Config {
                    message: "Maximum directory depth must be greater than 0".to_string(),
                });
            }
        }

        if self.extraction.workers > 512 {
            return Err(MmsMediaError::Config {
                message: format!(
                    "Worker count {} is unreasonably large (max: 512)",
                    self.extraction.workers
                ),
            });
        }

        if let Some(parent) = self.output.base_directory.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(MmsMediaError::Config {
                    message: format!("Parent directory does not exist: {}", parent.display()),
                });
            }
        }

        Ok(())
    }

    /// Worker pool size with the 0-means-auto default resolved.
    pub fn effective_workers(&self) -> usize {
        if self.extraction.workers == 0 {
            num_cpus::get()
        } else {
            self.extraction.workers
        }
    }

    /// Fingerprint store path, defaulting to saved_hashes.json next to the
    /// extracted media.
    pub fn store_path(&self, output_root: &Path) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| output_root.join("saved_hashes.json"))
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub workers: Option<usize>,
    pub max_depth: Option<usize>,
    pub permissive: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    pub cadence: Option<PersistCadence>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_permissive(mut self, permissive: Option<bool>) -> Self {
        self.permissive = permissive;
        self
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_store_path(mut self, store_path: Option<PathBuf>) -> Self {
        self.store_path = store_path;
        self
    }

    pub fn with_cadence(mut self, cadence: Option<PersistCadence>) -> Self {
        self.cadence = cadence;
        self
    }
}
