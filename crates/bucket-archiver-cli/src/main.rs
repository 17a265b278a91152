//! bucket-archiver CLI - generate, persist and re-archive objects as one
//! streamed pipeline run.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use bucket_archiver::{ArchiverError, Config, Orchestrator, S3Store};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "bucket-archiver")]
#[command(about = "Persist synthetic CSV objects and re-upload them as a streamed zip archive")]
#[command(version)]
struct Cli {
    /// Destination bucket (overrides the config file)
    bucket: Option<String>,

    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override number of generated files
    #[arg(long)]
    files: Option<usize>,

    /// Override rows per generated file
    #[arg(long)]
    rows: Option<usize>,

    /// Override the key the archive is uploaded under
    #[arg(long)]
    archive_key: Option<String>,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), ArchiverError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| ArchiverError::Config(e.to_string()))?;

    // Load configuration, then apply CLI overrides
    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    if let Some(bucket) = cli.bucket {
        config.bucket = bucket;
    }
    if let Some(files) = cli.files {
        config.generator.file_count = files;
    }
    if let Some(rows) = cli.rows {
        config.generator.rows_per_file = rows;
    }
    if let Some(key) = cli.archive_key {
        config.pipeline.archive_key = key;
    }
    config.validate()?;

    // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
    let cancel_token = setup_signal_handler().await?;

    let store = Arc::new(
        S3Store::from_env()
            .await
            .with_part_size(config.pipeline.part_size),
    );
    let orchestrator = Orchestrator::new(store, config);

    let result = orchestrator.run(Some(cancel_token)).await?;

    if cli.output_json {
        println!("{}", result.to_json()?);
    } else {
        println!("\nArchive run completed!");
        println!("  Run ID: {}", result.run_id);
        println!("  Duration: {:.2}s", result.duration_seconds);
        println!(
            "  Puts: {}/{}",
            result.puts_succeeded, result.files_total
        );
        println!(
            "  Archive: {} ({} entries, {} bytes)",
            result.archive_key, result.archive_entries, result.archive_bytes
        );
        if !result.failed_keys.is_empty() {
            println!("  Failed puts: {:?}", result.failed_keys);
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, ArchiverError> {
    let cancel_token = CancellationToken::new();

    // Clone token for each signal handler
    let token_int = cancel_token.clone();
    let token_term = cancel_token.clone();

    // SIGINT handler (Ctrl-C)
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Shutting down gracefully...");
        token_int.cancel();
    });

    // SIGTERM handler
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Shutting down gracefully...");
        token_term.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only SIGINT/Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, ArchiverError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to setup Ctrl-C handler");
        eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
        token.cancel();
    });

    Ok(cancel_token)
}
