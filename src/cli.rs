//! CLI definitions for hourglass.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Hourglass CLI.
#[derive(Parser)]
#[command(name = "hourglass")]
#[command(about = "Embeddable job scheduler with durable trigger tracking")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HOURGLASS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Explicit `--config`, or `<config dir>/hourglass/config.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("hourglass"))
        .unwrap_or_else(|| PathBuf::from(".hourglass"))
        .join("config.toml")
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler in foreground (default)
    Run,

    /// Validate the configuration file and exit
    Validate,

    /// List jobs and triggers persisted in a SQLite store
    List {
        /// Database path (defaults to store.path from the config)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },
}
