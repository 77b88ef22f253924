// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::BackupConfigLayer;
use crate::sections::{ExposerConfigLayer, LogFormat, LoggingConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<BackupConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<BackupConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(BackupConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/loom/backup.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<BackupConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(BackupConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: BackupConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: LOOM_BACKUP_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<BackupConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(BackupConfigLayer {
			exposer: Some(load_exposer_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u32 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

/// Whitespace separated command line.
fn env_words(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|v| v.split_whitespace().map(str::to_string).collect())
}

fn load_exposer_from_env() -> Result<ExposerConfigLayer, ConfigError> {
	Ok(ExposerConfigLayer {
		poll_interval_ms: env_u64("LOOM_BACKUP_POLL_INTERVAL_MS")?,
		cleanup_timeout_secs: env_u64("LOOM_BACKUP_CLEANUP_TIMEOUT_SECS")?,
		operation_timeout_secs: env_u64("LOOM_BACKUP_OPERATION_TIMEOUT_SECS")?,
		expose_timeout_secs: env_u64("LOOM_BACKUP_EXPOSE_TIMEOUT_SECS")?,
		unschedulable_grace_secs: env_u64("LOOM_BACKUP_UNSCHEDULABLE_GRACE_SECS")?,
		max_crash_restarts: env_u32("LOOM_BACKUP_MAX_CRASH_RESTARTS")?,
		data_mover_command: env_words("LOOM_BACKUP_DATA_MOVER_COMMAND"),
		node_agent_daemonset: env_var("LOOM_BACKUP_NODE_AGENT_DAEMONSET"),
		node_agent_windows_daemonset: env_var("LOOM_BACKUP_NODE_AGENT_WINDOWS_DAEMONSET"),
		backup_pvc: None,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = env_var("LOOM_BACKUP_LOG_FORMAT")
		.map(|v| {
			v.parse::<LogFormat>()
				.map_err(|message| ConfigError::InvalidValue {
					key: "LOOM_BACKUP_LOG_FORMAT".to_string(),
					message,
				})
		})
		.transpose()?;

	Ok(LoggingConfigLayer {
		level: env_var("LOOM_BACKUP_LOG_LEVEL"),
		format,
	})
}
