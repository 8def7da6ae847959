//! GFS forecast acquisition service.
//!
//! Periodically fetches a regional GFS subset from NOMADS with:
//! - Cycle resolution with bounded fallback to older runs
//! - One artifact per run, finalized by atomic rename
//! - Age-based cleanup of the output directory
//! - Run history persistence and an HTTP status API

mod artifact;
mod config;
mod download;
mod resolver;
mod retention;
mod scheduler;
mod server;
mod source;
mod state;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use scheduler::Scheduler;
use server::ServerState;
use source::NomadsSource;
use state::RunHistory;

#[derive(Parser, Debug)]
#[command(name = "grib-downloader")]
#[command(about = "Scheduled GFS GRIB acquisition for a configured region")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "GRIB_CONFIG", default_value = "config/grib.yaml")]
    config: PathBuf,

    /// Override the output directory from the configuration file
    #[arg(long, env = "GRIB_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Run once and exit (vs continuous scheduling)
    #[arg(long)]
    once: bool,

    /// Directory for run history database
    #[arg(long, default_value = "/data/downloader")]
    state_dir: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Port for status HTTP server
    #[arg(long, env = "STATUS_PORT", default_value = "8081")]
    status_port: u16,

    /// Disable status HTTP server
    #[arg(long)]
    no_status_server: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!(config = %args.config.display(), "Starting GRIB downloader");

    let config = match config::load_config(&args.config, args.output_dir.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Invalid configuration, not starting");
            return Err(e);
        }
    };

    info!(
        output_dir = %config.output_dir.display(),
        days = config.days,
        variables = config.variables.len(),
        interval_minutes = config.run_interval.as_secs() / 60,
        "Configuration loaded"
    );

    // Open run history
    tokio::fs::create_dir_all(&args.state_dir).await?;
    let history = Arc::new(RunHistory::open(&args.state_dir.join("runs.db")).await?);

    let source = Arc::new(NomadsSource::new(&config)?);
    let scheduler = Scheduler::new(config.clone(), source).with_history(history.clone());

    // Start status server (unless disabled or in --once mode)
    if !args.no_status_server && !args.once {
        let server_state = Arc::new(ServerState {
            history: history.clone(),
            config: config.clone(),
        });
        let status_port = args.status_port;
        tokio::spawn(async move {
            if let Err(e) = server::run_server(server_state, status_port).await {
                error!(error = %e, "Status server failed");
            }
        });
    }

    if args.once {
        info!("Running single acquisition");
        scheduler.run_and_record().await?;
    } else {
        info!("Starting scheduled acquisition");

        // Handle Ctrl+C
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            signal.cancel();
        });

        scheduler.run_forever(shutdown).await?;
    }

    let stats = history.stats().await?;
    info!(
        total = stats.total,
        completed = stats.completed,
        partial = stats.partial,
        no_cycle = stats.no_cycle,
        failed = stats.failed,
        total_bytes = stats.total_bytes,
        "Downloader session complete"
    );

    Ok(())
}
