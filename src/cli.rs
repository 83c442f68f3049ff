use crate::config::{CliOverrides, Config, PersistCadence};
use crate::error::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mmsmedia")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract media attachments from SMS Backup & Restore XML exports")]
#[command(
    long_about = "MmsMedia reads SMS Backup & Restore XML documents, decodes every image and \
                       video attachment, and writes each one into a per-sender folder. A \
                       persisted fingerprint store skips content already extracted, so the same \
                       backups can be processed again without producing duplicates."
)]
#[command(before_help = "📱 MmsMedia - MMS Attachment Extraction Tool")]
#[command(after_help = "EXAMPLES:\n  \
    mmsmedia backups/ extracted-media\n  \
    mmsmedia sms-20141122183844.xml extracted-media --threads 8\n  \
    mmsmedia backups/ extracted-media --saved-hashes /var/lib/mmsmedia/hashes.json\n  \
    mmsmedia backups/ extracted-media --cadence per-document --permissive\n\n\
    Backups are discovered recursively when the input path is a directory.")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Backup XML file, or a directory searched for .xml files
    #[arg(required_unless_present = "generate_config")]
    pub input_path: Option<PathBuf>,

    /// Directory receiving per-sender media folders
    #[arg(required_unless_present = "generate_config")]
    pub output_folder: Option<PathBuf>,

    /// Worker thread count (0 = one per logical CPU)
    #[arg(short, long, help = "Number of extraction workers (0 = auto)")]
    pub threads: Option<usize>,

    /// Fingerprint store location
    #[arg(
        long,
        help = "Path to the fingerprint store (default: saved_hashes.json in the output folder)"
    )]
    pub saved_hashes: Option<PathBuf>,

    /// How often the fingerprint store is flushed to disk
    #[arg(long, value_enum)]
    pub cadence: Option<PersistCadence>,

    /// Maximum directory depth when scanning for backups
    #[arg(long, help = "Limit recursion depth when the input is a directory")]
    pub max_depth: Option<usize>,

    /// Tolerate sloppy markup in oversized backup documents
    #[arg(long, help = "Relax end-tag checking for malformed exports")]
    pub permissive: bool,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Dry run (show what would be done without executing)
    #[arg(long, help = "List discovered backups without extracting anything")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_workers(self.threads)
            .with_max_depth(self.max_depth)
            .with_permissive(if self.permissive { Some(true) } else { None })
            .with_output_dir(self.output_folder.clone())
            .with_store_path(self.saved_hashes.clone())
            .with_cadence(self.cadence)
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_positional_arguments() {
        let cli = parse(&["mmsmedia", "backups", "out"]);
        assert_eq!(cli.input_path, Some(PathBuf::from("backups")));
        assert_eq!(cli.output_folder, Some(PathBuf::from("out")));
        assert!(!cli.permissive);
    }

    #[test]
    fn test_missing_positionals_rejected() {
        assert!(Cli::try_parse_from(["mmsmedia", "backups"]).is_err());
        assert!(Cli::try_parse_from(["mmsmedia"]).is_err());
    }

    #[test]
    fn test_generate_config_needs_no_positionals() {
        let cli = parse(&["mmsmedia", "--generate-config"]);
        assert!(cli.generate_config);
        assert!(cli.input_path.is_none());
    }

    #[test]
    fn test_cadence_values() {
        let cli = parse(&["mmsmedia", "b", "o", "--cadence", "per-document"]);
        assert_eq!(cli.cadence, Some(PersistCadence::PerDocument));

        assert!(Cli::try_parse_from(["mmsmedia", "b", "o", "--cadence", "sometimes"]).is_err());
    }

    #[test]
    fn test_overrides_reflect_flags() {
        let cli = parse(&[
            "mmsmedia",
            "backups",
            "out",
            "--threads",
            "8",
            "--permissive",
            "--max-depth",
            "2",
        ]);
        let overrides = cli.create_cli_overrides();
        assert_eq!(overrides.workers, Some(8));
        assert_eq!(overrides.permissive, Some(true));
        assert_eq!(overrides.max_depth, Some(2));
        assert_eq!(overrides.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["mmsmedia", "b", "o", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_verbosity_level() {
        let cli = parse(&["mmsmedia", "b", "o", "-vv"]);
        assert_eq!(cli.verbosity_level(), 2);

        let cli = parse(&["mmsmedia", "b", "o", "-q"]);
        assert_eq!(cli.verbosity_level(), 0);
    }
}
