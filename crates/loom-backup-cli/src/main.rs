// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Loom backup binary: drives the CSI snapshot exposer from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use loom_backup_config::{BackupConfig, LogFormat, LoggingConfig};
use loom_backup_exposer::{CsiSnapshotExposer, DaemonSetNodeAgent};
use loom_backup_k8s::{K8sClient, KubeClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{CleanupArgs, ExposeArgs, GetArgs, OwnerArgs};

/// Loom backup - exposes CSI volume snapshots to a data mover.
#[derive(Parser, Debug)]
#[command(name = "loom-backup", about = "Expose CSI volume snapshots for backup", version)]
struct Args {
	/// Config file to load instead of /etc/loom/backup.toml
	#[arg(long, global = true, env = "LOOM_BACKUP_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Create the hosting pod for a snapshot
	Expose(ExposeArgs),
	/// Wait for the exposed volume and print where it is mounted
	Get(GetArgs),
	/// Fail when the hosting pod can never make progress
	Peek(OwnerArgs),
	/// Print the state of every object involved in an exposure
	Diagnose(OwnerArgs),
	/// Remove everything an exposure created
	Cleanup(CleanupArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let config = match &args.config {
		Some(path) => loom_backup_config::load_config_with_file(path)?,
		None => loom_backup_config::load_config()?,
	};
	init_logging(&config.logging);

	let client: Arc<dyn K8sClient> = Arc::new(KubeClient::new().await?);
	let exposer = build_exposer(Arc::clone(&client), &config);

	match args.command {
		Command::Expose(expose) => commands::expose(&exposer, &config, expose).await,
		Command::Get(get) => commands::get(&exposer, client, get).await,
		Command::Peek(owner) => commands::peek(&exposer, owner).await,
		Command::Diagnose(owner) => {
			commands::diagnose(&exposer, owner).await;
			Ok(())
		}
		Command::Cleanup(cleanup) => {
			commands::cleanup(&exposer, cleanup).await;
			Ok(())
		}
	}
}

fn init_logging(config: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| config.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);

	match config.format {
		LogFormat::Json => registry
			.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
			.init(),
		LogFormat::Pretty => registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init(),
	}
}

fn build_exposer(client: Arc<dyn K8sClient>, config: &BackupConfig) -> CsiSnapshotExposer {
	let node_agent = Arc::new(DaemonSetNodeAgent::with_names(
		Arc::clone(&client),
		config.exposer.node_agent_daemonset.clone(),
		config.exposer.node_agent_windows_daemonset.clone(),
	));

	tracing::info!(node_agent = %config.exposer.node_agent_daemonset, "starting loom-backup");
	CsiSnapshotExposer::new(client, node_agent, config.exposer.to_exposer_config())
}
