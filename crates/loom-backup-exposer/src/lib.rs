// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Snapshot exposure for Loom volume backups.
//!
//! An exposer turns a CSI volume snapshot into a claim mounted by a hosting
//! pod, where the data mover can read it. This crate provides:
//! - The [`Exposer`] interface and its CSI snapshot implementation
//! - A node-agent provider the hosting pod inherits settings from
//! - Pod health classification and diagnostics for stuck exposures

mod affinity;
mod builders;
mod cleanup;
mod config;
mod csi_snapshot;
mod diagnose;
mod error;
mod exposer;
mod health;
mod node_agent;
mod rollback;
mod types;
mod wait;

pub use affinity::to_system_affinity;
pub use builders::{format_go_duration, resolve_claim_settings, ClaimSettings};
pub use config::{ExposerConfig, DEFAULT_DATA_MOVER_COMMAND};
pub use csi_snapshot::{CsiSnapshotExposeParams, CsiSnapshotExposeWaitParams, CsiSnapshotExposer};
pub use error::{ExposeError, NodeAgentError};
pub use exposer::Exposer;
pub use health::{classify_pod, PodHealth, PodHealthPolicy};
pub use node_agent::{
	DaemonSetNodeAgent, InheritedPodInfo, NodeAgent, DEFAULT_LINUX_DAEMONSET,
	DEFAULT_WINDOWS_DAEMONSET,
};
pub use types::{
	AccessMode, BackupPvcConfig, ExposeByPod, ExposeResult, LoadAffinity, NodeOs, OwnerRef,
	NODE_OS_LABEL, POD_GROUP_LABEL, POD_GROUP_SNAPSHOT,
};
pub use wait::deadline_after;
