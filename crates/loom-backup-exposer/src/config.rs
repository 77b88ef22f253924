// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exposer configuration.

use std::time::Duration;

use crate::health::PodHealthPolicy;

/// Default data-mover entrypoint run in the hosting pod.
pub const DEFAULT_DATA_MOVER_COMMAND: [&str; 3] = ["/loom-backup", "data-mover", "backup"];

/// Configuration for the snapshot exposer.
#[derive(Debug, Clone)]
pub struct ExposerConfig {
	/// Interval between readiness and deletion checks
	pub poll_interval: Duration,
	/// How long `clean_up` waits for the intermediate volume to be released
	pub cleanup_timeout: Duration,
	/// Classification thresholds used by `peek_exposed`
	pub health: PodHealthPolicy,
	/// Command run by the hosting pod's container
	pub data_mover_command: Vec<String>,
}

impl Default for ExposerConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(2),
			cleanup_timeout: Duration::from_secs(60),
			health: PodHealthPolicy::default(),
			data_mover_command: DEFAULT_DATA_MOVER_COMMAND
				.iter()
				.map(|s| s.to_string())
				.collect(),
		}
	}
}
