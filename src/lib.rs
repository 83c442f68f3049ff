pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod parser;
pub mod scanner;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, PersistCadence};
pub use error::{MmsMediaError, Result, UserFriendlyError};

// Core functionality re-exports
pub use extractor::{
    ExtractionPipeline, Fingerprint, FingerprintStore, MediaWriter, RunStats, RunSummary,
};
pub use parser::{Attachment, MessageRecord, MessageStream};
pub use scanner::{BackupFile, BackupScanner};
pub use ui::{OutputFormatter, OutputMode, ProgressManager};

use std::path::Path;

/// Main library interface for MmsMedia functionality
pub struct MmsMedia {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
}

impl MmsMedia {
    /// Create a new MmsMedia instance with the provided configuration
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet);

        Self {
            config,
            output_formatter,
            progress_manager,
        }
    }

    /// Create MmsMedia instance from CLI arguments
    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            crate::cli::OutputFormat::Human => OutputMode::Human,
            crate::cli::OutputFormat::Json => OutputMode::Json,
            crate::cli::OutputFormat::Plain => OutputMode::Plain,
        };

        Ok(Self::new(
            config,
            output_mode,
            cli_args.verbose,
            cli_args.quiet,
        ))
    }

    /// Extract all media attachments from the backups under `input` into
    /// per-sender folders under `output_root`.
    ///
    /// Startup problems (no backups, unreadable fingerprint store) abort
    /// before any file is written. Once extraction starts, per-attachment
    /// and per-document failures are counted in the returned summary and
    /// never abort the run.
    pub fn extract_media(&self, input: &Path, output_root: &Path) -> Result<RunSummary> {
        self.output_formatter
            .start_operation("Starting media extraction");

        // Step 1: Discover backup documents
        let scanner = BackupScanner::new(self.config.extraction.max_depth);
        let backups = scanner.scan(input)?;
        self.output_formatter
            .info(&format!("Found {} backup document(s)", backups.len()));

        // Step 2: Load the fingerprint store
        let store_path = self.config.store_path(output_root);
        let store = FingerprintStore::load(&store_path)?;
        if store.fingerprint_count() > 0 {
            self.output_formatter.debug(&format!(
                "Fingerprint store: {} known attachment(s) across {} folder(s)",
                store.fingerprint_count(),
                store.folder_count()
            ));
        }

        // Step 3: Run the extraction pipeline
        let writer = MediaWriter::new(output_root);
        let stats = RunStats::new();
        let pipeline = ExtractionPipeline::new(
            &writer,
            &store,
            &stats,
            self.config.store.cadence,
            &self.output_formatter,
            &self.progress_manager,
        );
        pipeline.run(
            &backups,
            self.config.effective_workers(),
            self.config.extraction.permissive,
        )?;

        // Step 4: Final flush, regardless of cadence. A no-op when the last
        // cadence point already wrote everything.
        if let Err(error) = store.persist() {
            stats.error(error.to_string());
            self.output_formatter.error(&error.user_message());
        }

        self.progress_manager.clear();
        Ok(stats.summary())
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config).map_err(MmsMediaError::Io)?;
        Ok(())
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get output formatter reference
    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &MmsMediaError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Get version information
pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
