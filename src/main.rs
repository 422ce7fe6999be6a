use clap::Parser;
use ragsession::cli::{Cli, Commands};
use ragsession::config::app_dir;
use ragsession::logging::{init_logging, log_error, LogRotation, LoggingConfig};
use std::path::PathBuf;
use tracing::Level;

fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (ignore errors if missing)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut logging_config = match &cli.command {
        Commands::Repair { .. }
        | Commands::Query { .. }
        | Commands::Show { .. }
        | Commands::Config { .. } => {
            // Output commands: keep stdout clean, log to ~/.ragsession/logs
            let log_file = app_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("logs")
                .join("ragsession.log");
            LoggingConfig::from_env()
                .with_stdout(false)
                .with_file(log_file)
                .with_rotation(LogRotation::Daily)
        }
        _ => LoggingConfig::from_env(),
    };
    if cli.verbose {
        logging_config = logging_config.with_level(Level::DEBUG);
    }
    if cli.json_logs {
        logging_config = logging_config.with_json_format(true);
    }

    let _guard = init_logging(logging_config)?;

    let result = cli.run();
    if let Err(e) = &result {
        log_error(e, "command failed");
    }
    result
}
