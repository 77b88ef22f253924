// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Best-effort deletion of exposer objects.
//!
//! Each helper deletes an object if it exists. Absence is logged at debug,
//! any other failure at warn; nothing is returned to the caller.

use std::time::Duration;

use loom_backup_k8s::K8sClient;

use crate::wait::ensure_pv_deleted;

/// Delete a pod immediately, if present.
pub async fn delete_pod_if_any(client: &dyn K8sClient, name: &str, namespace: &str) {
	match client.delete_pod(name, namespace, 0).await {
		Ok(()) => tracing::debug!(pod = %name, namespace = %namespace, "Deleted pod"),
		Err(e) if e.is_not_found() => {
			tracing::debug!(pod = %name, namespace = %namespace, "Pod already deleted")
		}
		Err(e) => {
			tracing::warn!(pod = %name, namespace = %namespace, error = %e, "Failed to delete pod")
		}
	}
}

/// Delete a snapshot, if present.
pub async fn delete_volume_snapshot_if_any(client: &dyn K8sClient, name: &str, namespace: &str) {
	match client.delete_volume_snapshot(name, namespace).await {
		Ok(()) => tracing::debug!(snapshot = %name, namespace = %namespace, "Deleted volume snapshot"),
		Err(e) if e.is_not_found() => {
			tracing::debug!(snapshot = %name, namespace = %namespace, "Volume snapshot already deleted")
		}
		Err(e) => {
			tracing::warn!(snapshot = %name, namespace = %namespace, error = %e, "Failed to delete volume snapshot")
		}
	}
}

/// Delete a claim together with the volume it is bound to.
///
/// The volume's reclaim policy is switched to `Delete` first so the volume
/// goes away with its claim. A zero `timeout` returns right after the claim
/// delete; otherwise the volume is polled until it disappears.
pub async fn delete_pv_and_pvc_if_any(
	client: &dyn K8sClient,
	name: &str,
	namespace: &str,
	timeout: Duration,
	interval: Duration,
) {
	let pvc = match client.get_pvc(name, namespace).await {
		Ok(pvc) => pvc,
		Err(e) if e.is_not_found() => {
			tracing::debug!(pvc = %name, namespace = %namespace, "PVC already deleted");
			return;
		}
		Err(e) => {
			tracing::warn!(pvc = %name, namespace = %namespace, error = %e, "Failed to get PVC");
			return;
		}
	};

	let volume_name = pvc
		.spec
		.and_then(|s| s.volume_name)
		.filter(|v| !v.is_empty());

	if let Some(pv) = &volume_name {
		match client.patch_pv_reclaim_policy(pv, "Delete").await {
			Ok(_) => {}
			Err(e) if e.is_not_found() => {
				tracing::debug!(pv = %pv, "PV already deleted");
			}
			Err(e) => {
				tracing::warn!(pv = %pv, error = %e, "Failed to set PV reclaim policy to Delete");
			}
		}
	}

	match client.delete_pvc(name, namespace).await {
		Ok(()) => tracing::debug!(pvc = %name, namespace = %namespace, "Deleted PVC"),
		Err(e) if e.is_not_found() => {
			tracing::debug!(pvc = %name, namespace = %namespace, "PVC already deleted");
		}
		Err(e) => {
			tracing::warn!(pvc = %name, namespace = %namespace, error = %e, "Failed to delete PVC");
			return;
		}
	}

	if let Some(pv) = volume_name {
		if timeout.is_zero() {
			return;
		}
		if let Err(e) = ensure_pv_deleted(client, &pv, timeout, interval).await {
			tracing::warn!(pv = %pv, error = %e, "PV was not released after PVC deletion");
		}
	}
}
