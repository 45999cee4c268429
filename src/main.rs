//! Hourglass - embeddable job scheduler
//!
//! Main entry point for the hourglass CLI.

mod cli;
mod jobs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use hourglass_config::{Config, ConfigError, ConfigLoader, ConfigValidator, LoggingConfig, StoreConfig};
use hourglass_core::{JobStore, MemoryJobStore};
use hourglass_runtime::{Scheduler, SchedulerConfig};
use hourglass_store_sqlite::SqliteJobStore;

use crate::cli::{Cli, Commands};

/// Initialize tracing with console output and an optional rolling log file.
///
/// `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let console = if logging.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).boxed()
    };

    let file = match &logging.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("hourglass")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The guard flushes buffered lines on drop, so it lives for the whole process.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init()?;

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> anyhow::Result<Config> {
    match ConfigLoader::load(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => Ok(Config::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path.display())),
    }
}

/// Build the job store selected by `[store]`.
async fn open_store(store: &StoreConfig) -> anyhow::Result<Arc<dyn JobStore>> {
    match store.backend.to_ascii_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryJobStore::new())),
        "sqlite" => {
            let sqlite = SqliteJobStore::open(&store.path)
                .await
                .with_context(|| format!("Failed to open store at {}", store.path))?;
            Ok(Arc::new(sqlite))
        }
        other => Err(ConfigError::UnknownBackend(other.to_string()).into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path();
    let config = load_config(&config_path)?;

    match cli.command {
        None | Some(Commands::Run) => {
            init_tracing(&config.logging)?;
            run(config).await
        }
        Some(Commands::Validate) => validate(&config_path, &config),
        Some(Commands::List { db, format }) => list(&config, db, &format).await,
    }
}

/// Run the scheduler until Ctrl-C.
async fn run(config: Config) -> anyhow::Result<()> {
    info!("Starting hourglass v{}", env!("CARGO_PKG_VERSION"));

    let warnings = ConfigValidator::validate(&config).into_result()?;
    for warning in warnings {
        warn!("{}: {}", warning.path, warning.message);
    }

    let store = open_store(&config.store).await?;
    info!("Using {} store", config.store.backend);

    let handlers = Arc::new(jobs::builtin_handlers()?);
    let scheduler = Scheduler::builder(store, handlers)
        .with_config(SchedulerConfig::from(&config))
        .build();

    let registration = jobs::register_jobs(&scheduler, &config.jobs).await?;
    info!(
        jobs = registration.jobs,
        scheduled = registration.scheduled,
        kept = registration.kept,
        skipped = registration.skipped,
        "Registered configured jobs"
    );

    scheduler.start().await?;
    info!("Scheduler started, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.shutdown().await;
    let metrics = scheduler.metrics();
    info!(
        fired = metrics.triggers_fired,
        completed = metrics.jobs_completed,
        failed = metrics.jobs_failed,
        uptime_secs = metrics.uptime_secs,
        "Scheduler stopped"
    );
    Ok(())
}

/// Print the validation result of the config file.
fn validate(path: &Path, config: &Config) -> anyhow::Result<()> {
    let result = ConfigValidator::validate(config);

    println!("Config: {}", path.display());
    for warning in &result.warnings {
        println!("  warning  {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("  error    {}: {}", error.path, error.message);
    }

    if result.is_valid() {
        println!("OK ({} jobs)", config.jobs.len());
        Ok(())
    } else {
        anyhow::bail!("{} validation error(s)", result.errors.len())
    }
}

/// Dump jobs and triggers from a SQLite store.
async fn list(config: &Config, db: Option<PathBuf>, format: &str) -> anyhow::Result<()> {
    let path = db.unwrap_or_else(|| PathBuf::from(&config.store.path));
    if !path.exists() {
        anyhow::bail!("No store at {}", path.display());
    }
    let store = SqliteJobStore::open(&path)
        .await
        .with_context(|| format!("Failed to open store at {}", path.display()))?;

    let jobs = store.list_jobs().await?;
    let triggers = store.list_triggers().await?;

    if format == "json" {
        let output = serde_json::json!({
            "jobs": jobs,
            "triggers": triggers.iter().map(|t| serde_json::json!({
                "key": t.key,
                "job_key": t.job_key,
                "type": t.kind.type_tag(),
                "state": t.state.as_str(),
                "next_fire_time": t.next_fire_time,
                "previous_fire_time": t.previous_fire_time,
                "rounds": t.rounds,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Jobs ({}):", jobs.len());
    for job in &jobs {
        println!("  {:<24} handler={} {}", job.key, job.handler, job.description);
    }
    println!("Triggers ({}):", triggers.len());
    for trigger in &triggers {
        let next = match trigger.next_fire_time {
            Some(_) if trigger.is_parked() => "after completion".to_string(),
            Some(next) => next.to_rfc3339(),
            None => "-".to_string(),
        };
        println!(
            "  {:<24} job={:<16} {:<11} {:<8} rounds={} next={}",
            trigger.key,
            trigger.job_key,
            trigger.kind.type_tag(),
            trigger.state.as_str(),
            trigger.rounds,
            next
        );
    }
    Ok(())
}
