// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tether - session persistence and cross-device synchronization.
//!
//! This is the maintenance binary for the Tether subsystem: database status,
//! online backup/restore, session export, and expiry sweeps.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cleanup;
mod export;
mod status;

use clap::{Parser, Subcommand};

/// Tether - session persistence and cross-device synchronization.
#[derive(Parser, Debug)]
#[command(name = "tether", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show database health and session counts.
    Status,
    /// Back up the session database while it may be in use.
    Backup {
        /// Destination path; defaults to the configured backup path.
        #[arg(long)]
        output: Option<String>,
    },
    /// Restore the session database from a backup file.
    Restore {
        /// Backup file to restore from.
        #[arg(long)]
        from: String,
    },
    /// Export a user's sessions to stdout.
    Export {
        /// User whose sessions to export.
        #[arg(long)]
        user: String,
        /// Output format: json or jsonl.
        #[arg(long, default_value = "json")]
        format: String,
        /// Maximum number of sessions.
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Sweep expired sessions from the database.
    Cleanup,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match tether_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            tether_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(Commands::Status) => status::run_status(&config).await,
        Some(Commands::Backup { output }) => {
            let output = output.unwrap_or_else(|| config.backup.backup_path.clone());
            tether_storage::run_backup(&config.storage.database_path, &output)
        }
        Some(Commands::Restore { from }) => {
            tether_storage::run_restore(&config.storage.database_path, &from)
        }
        Some(Commands::Export {
            user,
            format,
            limit,
        }) => export::run_export(&config, &user, &format, limit).await,
        Some(Commands::Cleanup) => cleanup::run_cleanup(&config).await,
        None => {
            println!("tether: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("tether: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tether={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
