// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Snapshot exposer configuration section.

use std::collections::HashMap;
use std::time::Duration;

use loom_backup_exposer::{
	BackupPvcConfig, ExposerConfig, PodHealthPolicy, DEFAULT_DATA_MOVER_COMMAND,
	DEFAULT_LINUX_DAEMONSET, DEFAULT_WINDOWS_DAEMONSET,
};
use serde::Deserialize;

use crate::error::ConfigError;

/// Exposer configuration layer (for merging).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExposerConfigLayer {
	pub poll_interval_ms: Option<u64>,
	pub cleanup_timeout_secs: Option<u64>,
	pub operation_timeout_secs: Option<u64>,
	pub expose_timeout_secs: Option<u64>,
	pub unschedulable_grace_secs: Option<u64>,
	pub max_crash_restarts: Option<u32>,
	pub data_mover_command: Option<Vec<String>>,
	pub node_agent_daemonset: Option<String>,
	pub node_agent_windows_daemonset: Option<String>,
	/// Per source storage class overrides for the intermediate claim
	pub backup_pvc: Option<HashMap<String, BackupPvcConfig>>,
}

impl ExposerConfigLayer {
	pub fn merge(&mut self, other: ExposerConfigLayer) {
		if other.poll_interval_ms.is_some() {
			self.poll_interval_ms = other.poll_interval_ms;
		}
		if other.cleanup_timeout_secs.is_some() {
			self.cleanup_timeout_secs = other.cleanup_timeout_secs;
		}
		if other.operation_timeout_secs.is_some() {
			self.operation_timeout_secs = other.operation_timeout_secs;
		}
		if other.expose_timeout_secs.is_some() {
			self.expose_timeout_secs = other.expose_timeout_secs;
		}
		if other.unschedulable_grace_secs.is_some() {
			self.unschedulable_grace_secs = other.unschedulable_grace_secs;
		}
		if other.max_crash_restarts.is_some() {
			self.max_crash_restarts = other.max_crash_restarts;
		}
		if other.data_mover_command.is_some() {
			self.data_mover_command = other.data_mover_command;
		}
		if other.node_agent_daemonset.is_some() {
			self.node_agent_daemonset = other.node_agent_daemonset;
		}
		if other.node_agent_windows_daemonset.is_some() {
			self.node_agent_windows_daemonset = other.node_agent_windows_daemonset;
		}
		// Classes are merged individually so a later file can add one override.
		if let Some(classes) = other.backup_pvc {
			self.backup_pvc.get_or_insert_with(HashMap::new).extend(classes);
		}
	}

	/// Resolves this layer into a runtime configuration.
	pub fn resolve(self) -> Result<ExposerSettings, ConfigError> {
		let poll_interval_ms = self.poll_interval_ms.unwrap_or(2000);
		if poll_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"exposer.poll_interval_ms must be greater than zero".to_string(),
			));
		}

		let max_crash_restarts = i32::try_from(self.max_crash_restarts.unwrap_or(3)).map_err(|_| {
			ConfigError::InvalidValue {
				key: "exposer.max_crash_restarts".to_string(),
				message: "value does not fit a container restart count".to_string(),
			}
		})?;

		let data_mover_command = self.data_mover_command.unwrap_or_else(|| {
			DEFAULT_DATA_MOVER_COMMAND
				.iter()
				.map(|s| s.to_string())
				.collect()
		});
		if data_mover_command.is_empty() {
			return Err(ConfigError::Validation(
				"exposer.data_mover_command must not be empty".to_string(),
			));
		}

		let node_agent_daemonset = self
			.node_agent_daemonset
			.unwrap_or_else(|| DEFAULT_LINUX_DAEMONSET.to_string());
		let node_agent_windows_daemonset = self
			.node_agent_windows_daemonset
			.unwrap_or_else(|| DEFAULT_WINDOWS_DAEMONSET.to_string());
		if node_agent_daemonset.is_empty() || node_agent_windows_daemonset.is_empty() {
			return Err(ConfigError::Validation(
				"node-agent daemonset names must not be empty".to_string(),
			));
		}

		Ok(ExposerSettings {
			poll_interval: Duration::from_millis(poll_interval_ms),
			cleanup_timeout: Duration::from_secs(self.cleanup_timeout_secs.unwrap_or(60)),
			operation_timeout: Duration::from_secs(self.operation_timeout_secs.unwrap_or(600)),
			expose_timeout: Duration::from_secs(self.expose_timeout_secs.unwrap_or(600)),
			unschedulable_grace: Duration::from_secs(self.unschedulable_grace_secs.unwrap_or(120)),
			max_crash_restarts,
			data_mover_command,
			node_agent_daemonset,
			node_agent_windows_daemonset,
			backup_pvc: self.backup_pvc.unwrap_or_default(),
		})
	}
}

/// Exposer configuration (runtime, resolved).
#[derive(Debug, Clone)]
pub struct ExposerSettings {
	pub poll_interval: Duration,
	pub cleanup_timeout: Duration,
	/// Bound on each wait for a deleted object to disappear
	pub operation_timeout: Duration,
	/// Bound on the wait for the source snapshot to become ready
	pub expose_timeout: Duration,
	pub unschedulable_grace: Duration,
	pub max_crash_restarts: i32,
	pub data_mover_command: Vec<String>,
	pub node_agent_daemonset: String,
	pub node_agent_windows_daemonset: String,
	pub backup_pvc: HashMap<String, BackupPvcConfig>,
}

impl ExposerSettings {
	pub fn to_exposer_config(&self) -> ExposerConfig {
		ExposerConfig {
			poll_interval: self.poll_interval,
			cleanup_timeout: self.cleanup_timeout,
			health: PodHealthPolicy {
				unschedulable_grace: self.unschedulable_grace,
				max_crash_restarts: self.max_crash_restarts,
			},
			data_mover_command: self.data_mover_command.clone(),
		}
	}
}
