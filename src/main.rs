use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ufc_ranker::api::{router, ApiState};
use ufc_ranker::clock::{Clock, SystemClock};
use ufc_ranker::config::{
    Config, DEFAULT_API_PORT, DEFAULT_EVENT_CARDS_LIMIT, DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_PROFILE_LIMIT,
};
use ufc_ranker::db::{migrate, snapshot, Store, StoreLock};
use ufc_ranker::error::Result;
use ufc_ranker::fetcher::{FetchPolicy, Fetcher};
use ufc_ranker::jobs::{self, IngestOptions, JobKind};

#[derive(Parser)]
#[command(name = "ufc-ranker", version, about = "UFC ingestion pipeline, store tooling and read API")]
struct Cli {
    /// Log filter (RUST_LOG takes precedence when set)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an ingest job against the store
    Ingest {
        #[arg(value_enum)]
        job: JobKind,
        /// Event pages visited by event-cards
        #[arg(long, default_value_t = DEFAULT_EVENT_CARDS_LIMIT)]
        limit: usize,
        /// Fighter profile pages visited by profiles
        #[arg(long, default_value_t = DEFAULT_PROFILE_LIMIT)]
        profile_limit: usize,
        /// Wall-clock budget per job
        #[arg(long, default_value_t = DEFAULT_JOB_TIMEOUT_SECS)]
        job_timeout_secs: u64,
    },
    /// Copy the store into the snapshot directory
    Snapshot,
    /// Replace the store with a snapshot (file name or path)
    Restore { file: String },
    /// Bring the store to the current schema version
    Migrate,
    /// List snapshots, newest first
    ListSnapshots,
    /// Serve the read API
    Serve {
        #[arg(long, default_value_t = DEFAULT_API_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Config error: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    match run(cli.command, cfg).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("Fatal error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(command: Command, cfg: Config) -> Result<u8> {
    match command {
        Command::Ingest {
            job,
            limit,
            profile_limit,
            job_timeout_secs,
        } => {
            let fetcher = Fetcher::new(FetchPolicy::from_config(&cfg))?;
            let opts = IngestOptions {
                card_limit: limit,
                profile_limit,
                job_timeout: Duration::from_secs(job_timeout_secs),
                ..IngestOptions::default()
            };
            let report = jobs::ingest(&cfg, fetcher, Arc::new(SystemClock), job, opts).await?;
            let quarantined = report.quarantined();
            if quarantined > 0 {
                warn!("[JOBS] {quarantined} records quarantined; see orphan_round_stats / orphan_fights");
            }
            Ok(report.exit_code())
        }

        Command::Snapshot => {
            let _lock = StoreLock::acquire(&cfg.db_path)?;
            let path = snapshot::create(&cfg, SystemClock.now()).await?;
            info!("Snapshot written to {}", path.display());
            Ok(0)
        }

        Command::Restore { file } => {
            let _lock = StoreLock::acquire(&cfg.db_path)?;
            let source = snapshot::restore(&cfg, &file).await?;
            info!("Store restored from {}", source.display());
            Ok(0)
        }

        Command::Migrate => {
            let _lock = StoreLock::acquire(&cfg.db_path)?;
            let report = migrate::migrate(&cfg, SystemClock.now()).await?;
            if report.is_noop() {
                info!("[MIGRATE] already at schema v{}", report.to);
            } else {
                let snapshot = report
                    .snapshot
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "none".to_string());
                info!(
                    "[MIGRATE] v{} -> v{}: {} rows rebuilt (snapshot: {snapshot})",
                    report.from, report.to, report.rows_rebuilt
                );
            }
            Ok(0)
        }

        Command::ListSnapshots => {
            let snapshots = snapshot::list(&cfg)?;
            if snapshots.is_empty() {
                info!("No snapshots in {}", cfg.snapshot_dir().display());
            }
            for s in snapshots {
                println!("{}\t{} bytes", s.name, s.size_bytes);
            }
            Ok(0)
        }

        Command::Serve { port } => {
            let store = Store::open(&cfg).await?;
            let app = router(ApiState { store });
            let bind_addr = format!("0.0.0.0:{port}");
            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            info!("HTTP API listening on {bind_addr}");
            axum::serve(listener, app).await?;
            Ok(0)
        }
    }
}
