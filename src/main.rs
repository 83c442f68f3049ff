use clap::Parser;
use mmsmedia::{Cli, MmsMedia, MmsMediaError, OutputFormatter, OutputMode, UserFriendlyError};
use std::path::PathBuf;
use std::process;

fn main() {
    let exit_code = run();
    process::exit(exit_code);
}

fn run() -> i32 {
    let cli = Cli::parse();

    // Handle special commands first
    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    // Positionals are enforced by clap unless --generate-config was given
    let (Some(input_path), Some(output_folder)) = (&cli.input_path, &cli.output_folder) else {
        eprintln!("error: input path and output folder are required");
        return 2;
    };

    let app = match MmsMedia::from_cli(&cli) {
        Ok(app) => app,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    if cli.dry_run {
        return handle_dry_run(input_path, &app);
    }

    match app.extract_media(input_path, output_folder) {
        Ok(summary) => {
            // Attachment-level failures are visible in the summary counts
            // and log lines; a completed run always exits cleanly.
            app.output_formatter().print_run_summary(&summary);
            0
        }
        Err(e) => {
            app.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

/// Map error types to distinct exit codes so scripts can react to the
/// startup-fatal classes.
fn exit_code_for(error: &MmsMediaError) -> i32 {
    match error {
        MmsMediaError::Config { .. } => 2,
        MmsMediaError::InvalidPath { .. } => 3,
        MmsMediaError::NoBackupsFound { .. } => 4,
        MmsMediaError::StoreUnreadable { .. } => 5,
        MmsMediaError::Permission { .. } => 6,
        MmsMediaError::StorageFull { .. } => 7,
        _ => 1, // General error
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("mmsmedia.toml"));

    match MmsMedia::generate_sample_config(&config_path) {
        Ok(()) => {
            println!(
                "Generated sample configuration file: {}",
                config_path.display()
            );
            println!("\nTo use this configuration:");
            println!(
                "  mmsmedia <input-path> <output-folder> --config {}",
                config_path.display()
            );
            println!("\nEdit the file to customize settings for your needs.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(input_path: &PathBuf, app: &MmsMedia) -> i32 {
    let formatter = app.output_formatter();
    let config = app.config();

    formatter.info("DRY RUN MODE - No files will be extracted");
    formatter.print_separator();

    let scanner = mmsmedia::BackupScanner::new(config.extraction.max_depth);
    let backups = match scanner.scan(input_path) {
        Ok(backups) => backups,
        Err(e) => {
            formatter.print_user_friendly_error(&e);
            return exit_code_for(&e);
        }
    };

    formatter.info(&format!("Would process {} backup document(s):", backups.len()));
    for backup in &backups {
        println!("  {} ({} bytes)", backup.path.display(), backup.size);
    }

    formatter.print_separator();
    formatter.info("Configuration that would be used:");
    println!("  Workers: {}", config.effective_workers());
    println!("  Persist cadence: {}", config.store.cadence);
    println!("  Permissive parsing: {}", config.extraction.permissive);
    println!(
        "  Fingerprint store: {}",
        config.store_path(&config.output.base_directory).display()
    );

    formatter.print_separator();
    formatter.success("Dry run completed successfully");
    formatter.info("Run without --dry-run to perform actual extraction");

    0
}

fn print_startup_error(error: &MmsMediaError) {
    // Create a basic formatter for startup errors
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}
