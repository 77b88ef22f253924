// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Snapshot exposure types.

use loom_backup_k8s::{LabelSelector, OwnerReference, Pod};
use serde::{Deserialize, Serialize};

use crate::error::ExposeError;

/// Node label carrying the operating system of a node.
pub const NODE_OS_LABEL: &str = "kubernetes.io/os";
/// Label grouping every pod created by an exposer, used for topology spread.
pub const POD_GROUP_LABEL: &str = "loom.dev/exposer-pod-group";
pub const POD_GROUP_SNAPSHOT: &str = "snapshot-exposer";

/// Identity of the object driving an exposure (typically a data upload).
///
/// Every object the exposer derives is named after `name`, so the owner is all
/// a caller needs to find, diagnose or clean up an exposure later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
	pub namespace: String,
	pub name: String,
	pub uid: String,
	pub kind: String,
	pub api_version: String,
}

impl OwnerRef {
	/// Controller owner reference so garbage collection follows the owner.
	pub fn owner_reference(&self) -> OwnerReference {
		OwnerReference {
			api_version: self.api_version.clone(),
			kind: self.kind.clone(),
			name: self.name.clone(),
			uid: self.uid.clone(),
			controller: Some(true),
			block_owner_deletion: None,
		}
	}
}

/// How the data mover reads the exposed volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
	#[default]
	#[serde(rename = "by-file-system")]
	FileSystem,
	#[serde(rename = "by-block-device")]
	Block,
}

impl AccessMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			AccessMode::FileSystem => "by-file-system",
			AccessMode::Block => "by-block-device",
		}
	}

	/// The claim `volumeMode` that serves this access mode.
	pub fn volume_mode(&self) -> &'static str {
		match self {
			AccessMode::FileSystem => "Filesystem",
			AccessMode::Block => "Block",
		}
	}
}

impl std::fmt::Display for AccessMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for AccessMode {
	type Err = ExposeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"by-file-system" => Ok(AccessMode::FileSystem),
			"by-block-device" => Ok(AccessMode::Block),
			other => Err(ExposeError::UnsupportedAccessMode(other.to_string())),
		}
	}
}

/// Operating system of the node the source volume is attached to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeOs {
	#[default]
	Linux,
	Windows,
}

impl NodeOs {
	pub fn as_str(&self) -> &'static str {
		match self {
			NodeOs::Linux => "linux",
			NodeOs::Windows => "windows",
		}
	}

	/// Anything other than `windows` is scheduled as Linux.
	pub fn from_label(value: &str) -> Self {
		if value.eq_ignore_ascii_case("windows") {
			NodeOs::Windows
		} else {
			NodeOs::Linux
		}
	}
}

impl std::fmt::Display for NodeOs {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Overrides for the intermediate claim, keyed by the source storage class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPvcConfig {
	/// Storage class to use instead of the source one; empty keeps the source class.
	#[serde(default)]
	pub storage_class: String,
	/// Mount the claim read-only (`ReadOnlyMany`).
	#[serde(default)]
	pub read_only: bool,
	/// Skip SELinux relabeling; only honoured for read-only claims.
	#[serde(default)]
	pub spc_no_relabeling: bool,
}

/// Placement hint for the hosting pod, expressed over node labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAffinity {
	pub node_selector: LabelSelector,
}

/// Where the exposed volume can be found.
#[derive(Debug, Clone)]
pub struct ExposeByPod {
	pub hosting_pod: Pod,
	pub hosting_container: String,
	pub volume_name: String,
	pub node_os: Option<String>,
}

/// Result of a successful [`crate::Exposer::get_exposed`].
#[derive(Debug, Clone)]
pub struct ExposeResult {
	pub by_pod: ExposeByPod,
}
