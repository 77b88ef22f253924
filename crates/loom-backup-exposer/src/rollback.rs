// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Compensation stack for a partially completed expose.

use std::time::Duration;

use loom_backup_k8s::K8sClient;

use crate::cleanup::{delete_pod_if_any, delete_pv_and_pvc_if_any, delete_volume_snapshot_if_any};

/// Undo action for one object created during expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
	DeleteVolumeSnapshot { name: String, namespace: String },
	/// Delete the claim and its bound volume without waiting for release.
	DeletePvAndPvc { name: String, namespace: String },
	DeletePod { name: String, namespace: String },
}

/// Compensations registered so far, run newest first on failure.
pub struct Rollback<'a> {
	client: &'a dyn K8sClient,
	pending: Vec<Compensation>,
}

impl<'a> Rollback<'a> {
	pub fn new(client: &'a dyn K8sClient) -> Self {
		Self {
			client,
			pending: Vec::new(),
		}
	}

	pub fn push(&mut self, compensation: Compensation) {
		self.pending.push(compensation);
	}

	/// Keep everything created so far.
	pub fn commit(mut self) {
		self.pending.clear();
	}

	/// Run every pending compensation in reverse registration order.
	///
	/// Failures are logged by the cleanup helpers and never stop the unwind.
	pub async fn unwind(mut self) {
		while let Some(compensation) = self.pending.pop() {
			tracing::info!(?compensation, "Rolling back expose");
			match compensation {
				Compensation::DeleteVolumeSnapshot { name, namespace } => {
					delete_volume_snapshot_if_any(self.client, &name, &namespace).await
				}
				Compensation::DeletePvAndPvc { name, namespace } => {
					delete_pv_and_pvc_if_any(self.client, &name, &namespace, Duration::ZERO, Duration::ZERO)
						.await
				}
				Compensation::DeletePod { name, namespace } => {
					delete_pod_if_any(self.client, &name, &namespace).await
				}
			}
		}
	}
}
