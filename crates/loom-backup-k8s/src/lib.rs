// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! K8s client abstraction for Loom snapshot exposure.
//!
//! This crate provides:
//! - A trait-based K8s client abstraction for testability
//! - Production implementation using the kube crate
//! - A node-scoped view for callers that must only see local pods
//! - CSI `VolumeSnapshot` / `VolumeSnapshotContent` resource types
//! - An in-memory fake store for tests (`test-util` feature)

mod client;
mod error;
#[cfg(any(test, feature = "test-util"))]
mod fake;
mod kube_client;
mod node_scoped;
mod types;

pub use client::K8sClient;
pub use error::{K8sError, K8sResult};
#[cfg(any(test, feature = "test-util"))]
pub use fake::{FakeK8sClient, FakeOp};
pub use kube_client::KubeClient;
pub use node_scoped::NodeScopedClient;
pub use types::*;
