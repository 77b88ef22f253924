// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the Loom backup exposer.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Validation of exposer timing and node-agent settings
//! - Consistent environment variable naming (`LOOM_BACKUP_*`)
//!
//! # Usage
//!
//! ```ignore
//! use loom_backup_config::load_config;
//!
//! let config = load_config()?;
//! let exposer_config = config.exposer.to_exposer_config();
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::BackupConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved backup configuration.
#[derive(Debug, Clone)]
pub struct BackupConfig {
	pub exposer: ExposerSettings,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`LOOM_BACKUP_*`)
/// 2. Config file (`/etc/loom/backup.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<BackupConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	];
	load_from_sources(sources)
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<BackupConfig, ConfigError> {
	let mut merged = BackupConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<BackupConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	];
	load_from_sources(sources)
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<BackupConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = BackupConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: BackupConfigLayer) -> Result<BackupConfig, ConfigError> {
	let exposer = layer.exposer.unwrap_or_default().resolve()?;
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&exposer)?;

	info!(
		poll_interval_ms = exposer.poll_interval.as_millis() as u64,
		cleanup_timeout_secs = exposer.cleanup_timeout.as_secs(),
		expose_timeout_secs = exposer.expose_timeout.as_secs(),
		node_agent = %exposer.node_agent_daemonset,
		backup_pvc_classes = exposer.backup_pvc.len(),
		log_format = %logging.format,
		"Backup configuration loaded"
	);

	Ok(BackupConfig { exposer, logging })
}

/// Validate cross-field configuration rules.
fn validate_config(exposer: &ExposerSettings) -> Result<(), ConfigError> {
	if exposer.node_agent_daemonset == exposer.node_agent_windows_daemonset {
		return Err(ConfigError::Validation(format!(
			"linux and windows node-agent daemonsets are both named '{}'",
			exposer.node_agent_daemonset
		)));
	}

	let longest_wait = exposer.expose_timeout.max(exposer.operation_timeout);
	if exposer.poll_interval > longest_wait {
		return Err(ConfigError::Validation(
			"exposer.poll_interval_ms exceeds every exposer timeout".to_string(),
		));
	}

	Ok(())
}
