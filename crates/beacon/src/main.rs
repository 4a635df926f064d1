// SPDX-FileCopyrightText: 2026 Beacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Beacon - outbound customer messaging pipeline.
//!
//! This is the binary entry point: the queue worker plus operator commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod app;
mod shutdown;
mod status;
mod work;

use std::path::PathBuf;
use std::str::FromStr;

use beacon_core::{BeaconError, Channel, MessageId};
use clap::{Parser, Subcommand};

use crate::app::App;

/// Beacon - outbound customer messaging pipeline.
#[derive(Parser, Debug)]
#[command(name = "beacon", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Process the queue until SIGINT or SIGTERM.
    Work,
    /// Run a single worker pass and exit.
    RunOnce,
    /// Render an owner's template for an event without storing anything.
    Preview {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        event: String,
        #[arg(long, value_parser = parse_channel)]
        channel: Channel,
        /// Template data as a JSON object.
        #[arg(long)]
        data: Option<String>,
    },
    /// List dead-lettered messages, or requeue one.
    Dead {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Enqueue a fresh copy of this dead message.
        #[arg(long)]
        requeue: Option<i64>,
    },
    /// Cancel a queued message.
    Cancel {
        id: i64,
        #[arg(long, default_value = "cancelled by operator")]
        reason: String,
    },
    /// Return messages with expired claims to the queue.
    Recover,
    /// Show message counts per status.
    Status {
        /// Output structured JSON.
        #[arg(long)]
        json: bool,
    },
}

fn parse_channel(raw: &str) -> Result<Channel, String> {
    Channel::from_str(&raw.to_ascii_lowercase())
        .map_err(|_| format!("unknown channel `{raw}` (expected chat, sms or email)"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => beacon_config::load_and_validate_path(path),
        None => beacon_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            beacon_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log.level);
    beacon_dispatch::metrics::register_metrics();

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(
    command: Commands,
    config: beacon_config::BeaconConfig,
) -> Result<(), BeaconError> {
    let app = App::open(config).await?;

    match command {
        Commands::Work => work::run_work(&app).await,
        Commands::RunOnce => work::run_once(&app).await,
        Commands::Preview {
            owner,
            event,
            channel,
            data,
        } => {
            let content = admin::preview(&app, owner, &event, channel, data.as_deref()).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&content).unwrap_or_else(|_| "{}".to_string())
            );
            Ok(())
        }
        Commands::Dead {
            requeue: Some(id), ..
        } => {
            let fresh = admin::requeue_dead(&app, MessageId(id)).await?;
            println!("requeued dead message {id} as {fresh}");
            Ok(())
        }
        Commands::Dead {
            limit,
            requeue: None,
        } => {
            let dead = admin::list_dead(&app, limit).await?;
            if dead.is_empty() {
                println!("no dead messages");
            }
            for message in &dead {
                println!("{}", admin::format_row(message));
            }
            Ok(())
        }
        Commands::Cancel { id, reason } => {
            admin::cancel(&app, MessageId(id), &reason).await?;
            println!("cancelled message {id}");
            Ok(())
        }
        Commands::Recover => {
            let count = admin::recover(&app).await?;
            println!("recovered {count} messages");
            Ok(())
        }
        Commands::Status { json } => status::run_status(&app, json).await,
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("beacon={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
