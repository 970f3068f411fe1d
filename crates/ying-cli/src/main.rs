//! ying - personal operations toolkit.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ying_cli::{commands, config::Config, logging};
use ying_core::StorageSizer;
use ying_types::{DisplayMode, Engine};

use logging::{LogConfig, LogFormat};

/// ying - progress logging and bucket-size reporting.
#[derive(Parser, Debug)]
#[command(name = "ying")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (INFO level for all targets)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable trace logging, including every output chunk
    #[arg(long, global = true)]
    trace: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "relay=debug").
    /// Targets are prefixed with "ying::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL", global = true)]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a shell command and mirror its output to the chat
    Plog {
        /// Shell command to run
        cmd: String,

        /// `a` appends output to the message, `r` replaces it
        #[arg(short, long, value_enum, default_value = "a")]
        mode: DisplayMode,
    },
    /// Print size and object count of one bucket
    BucketSize {
        /// Bucket URI, e.g. gs://bucket or s3://bucket
        uri: String,

        #[arg(short, long, value_enum, default_value = "auto")]
        engine: Engine,

        /// Google Cloud project for the metrics engine
        #[arg(long, env = "YING_GOOGLE_PROJECT_ID")]
        project_id: Option<String>,
    },
    /// Refresh bucket sizes in the report sheet
    BucketReport {
        /// Sheet file, overriding the configured path
        #[arg(long, value_name = "FILE")]
        sheet: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env(|key| std::env::var(key).ok());
    tracing::debug!(target: "ying::startup", "Loaded configuration");

    match cli.command {
        Command::Plog { cmd, mode } => commands::plog(&config, &cmd, mode, std::io::stdout()),
        Command::BucketSize {
            uri,
            engine,
            project_id,
        } => {
            let sizer = StorageSizer::system();
            commands::bucket_size(&config, &sizer, &uri, engine, project_id, std::io::stdout())
                .map(|_| ())
        }
        Command::BucketReport { sheet } => {
            let sizer = StorageSizer::system();
            commands::bucket_report(&config, &sizer, sheet)
        }
    }
}
