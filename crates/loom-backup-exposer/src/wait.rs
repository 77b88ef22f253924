// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded polling against the object store.
//!
//! Readiness and deletion are observed by re-reading the object at a fixed
//! interval until an overall deadline, never by watching.

use std::time::Duration;

use loom_backup_k8s::{
	DeletionPolicy, K8sClient, PersistentVolumeClaim, VolumeSnapshot, VolumeSnapshotContent,
};
use tokio::time::Instant;

use crate::error::ExposeError;

/// Used when a timeout is too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The instant `timeout` from now, saturating for timeouts too large to represent.
pub fn deadline_after(timeout: Duration) -> Instant {
	let now = Instant::now();
	now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Paces a poll loop and reports when its deadline has passed.
struct Poller {
	deadline: Instant,
	interval: Duration,
}

impl Poller {
	fn new(timeout: Duration, interval: Duration) -> Self {
		Self {
			deadline: deadline_after(timeout),
			interval,
		}
	}

	/// Sleep until the next check; `false` once the deadline has passed.
	async fn tick(&self) -> bool {
		let now = Instant::now();
		if now >= self.deadline {
			return false;
		}
		tokio::time::sleep(self.interval.min(self.deadline - now)).await;
		true
	}
}

/// Poll a snapshot until it is ready to use and bound to a content.
///
/// Read failures are fatal. An error reported in the snapshot status is not,
/// since the snapshot controller retries, but it is carried into the timeout
/// message.
pub async fn wait_volume_snapshot_ready(
	client: &dyn K8sClient,
	name: &str,
	namespace: &str,
	timeout: Duration,
	interval: Duration,
) -> Result<VolumeSnapshot, ExposeError> {
	let poller = Poller::new(timeout, interval);
	let mut last_error: Option<String> = None;

	loop {
		let snapshot = client.get_volume_snapshot(name, namespace).await?;
		if let Some(status) = &snapshot.status {
			let bound = status
				.bound_volume_snapshot_content_name
				.as_deref()
				.is_some_and(|n| !n.is_empty());
			if bound && status.ready_to_use == Some(true) {
				return Ok(snapshot);
			}
			if let Some(message) = status.error.as_ref().and_then(|e| e.message.clone()) {
				tracing::warn!(snapshot = %name, namespace = %namespace, error = %message, "Volume snapshot reports an error");
				last_error = Some(message);
			}
		}

		if !poller.tick().await {
			let what = match last_error {
				Some(message) => format!("volume snapshot {namespace}/{name} to be ready (last error: {message})"),
				None => format!("volume snapshot {namespace}/{name} to be ready"),
			};
			return Err(ExposeError::Timeout { what });
		}
	}
}

/// Poll a claim until it is bound to a volume.
pub async fn wait_pvc_bound(
	client: &dyn K8sClient,
	name: &str,
	namespace: &str,
	timeout: Duration,
	interval: Duration,
) -> Result<PersistentVolumeClaim, ExposeError> {
	let poller = Poller::new(timeout, interval);

	loop {
		let pvc = client.get_pvc(name, namespace).await?;
		let phase = pvc.status.as_ref().and_then(|s| s.phase.as_deref());
		let volume = pvc.spec.as_ref().and_then(|s| s.volume_name.as_deref());
		if phase == Some("Bound") && volume.is_some_and(|v| !v.is_empty()) {
			return Ok(pvc);
		}

		if !poller.tick().await {
			return Err(ExposeError::Timeout {
				what: format!("PVC {namespace}/{name} to be bound"),
			});
		}
	}
}

/// Delete a snapshot and wait until it is gone.
pub async fn ensure_delete_volume_snapshot(
	client: &dyn K8sClient,
	name: &str,
	namespace: &str,
	timeout: Duration,
	interval: Duration,
) -> Result<(), ExposeError> {
	match client.delete_volume_snapshot(name, namespace).await {
		Ok(()) => {}
		Err(e) if e.is_not_found() => return Ok(()),
		Err(e) => return Err(e.into()),
	}

	let poller = Poller::new(timeout, interval);
	loop {
		match client.get_volume_snapshot(name, namespace).await {
			Err(e) if e.is_not_found() => return Ok(()),
			Err(e) => return Err(e.into()),
			Ok(_) => {}
		}
		if !poller.tick().await {
			return Err(ExposeError::Timeout {
				what: format!("volume snapshot {namespace}/{name} to be deleted"),
			});
		}
	}
}

/// Delete a snapshot content and wait until it is gone.
pub async fn ensure_delete_snapshot_content(
	client: &dyn K8sClient,
	name: &str,
	timeout: Duration,
	interval: Duration,
) -> Result<(), ExposeError> {
	match client.delete_snapshot_content(name).await {
		Ok(()) => {}
		Err(e) if e.is_not_found() => return Ok(()),
		Err(e) => return Err(e.into()),
	}

	let poller = Poller::new(timeout, interval);
	loop {
		match client.get_snapshot_content(name).await {
			Err(e) if e.is_not_found() => return Ok(()),
			Err(e) => return Err(e.into()),
			Ok(_) => {}
		}
		if !poller.tick().await {
			return Err(ExposeError::Timeout {
				what: format!("volume snapshot content {name} to be deleted"),
			});
		}
	}
}

/// Wait for a persistent volume to disappear after its claim was deleted.
pub async fn ensure_pv_deleted(
	client: &dyn K8sClient,
	name: &str,
	timeout: Duration,
	interval: Duration,
) -> Result<(), ExposeError> {
	let poller = Poller::new(timeout, interval);
	loop {
		match client.get_pv(name).await {
			Err(e) if e.is_not_found() => return Ok(()),
			Err(e) => return Err(e.into()),
			Ok(_) => {}
		}
		if !poller.tick().await {
			return Err(ExposeError::Timeout {
				what: format!("PV {name} to be deleted"),
			});
		}
	}
}

/// Switch a content to `Retain` so deleting it keeps the storage snapshot.
///
/// Returns the patched content, or `None` if it was already retained.
pub async fn retain_snapshot_content(
	client: &dyn K8sClient,
	content: &VolumeSnapshotContent,
) -> Result<Option<VolumeSnapshotContent>, ExposeError> {
	if content.spec.deletion_policy == DeletionPolicy::Retain {
		return Ok(None);
	}
	let name = content.metadata.name.as_deref().unwrap_or_default();
	let patched = client
		.patch_snapshot_content_deletion_policy(name, DeletionPolicy::Retain)
		.await?;
	Ok(Some(patched))
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_backup_k8s::{
		FakeK8sClient, FakeOp, VolumeSnapshotContentSpec, VolumeSnapshotSpec, VolumeSnapshotStatus,
	};

	const INTERVAL: Duration = Duration::from_millis(5);

	fn snapshot(ready: bool) -> VolumeSnapshot {
		let mut vs = VolumeSnapshot::new("snap", VolumeSnapshotSpec::default());
		vs.status = Some(VolumeSnapshotStatus {
			bound_volume_snapshot_content_name: Some("content".to_string()),
			ready_to_use: Some(ready),
			..Default::default()
		});
		vs
	}

	#[test]
	fn deadline_saturates_for_huge_timeouts() {
		let before = Instant::now();
		assert!(deadline_after(Duration::MAX) > before + Duration::from_secs(86400 * 365));
		assert!(deadline_after(Duration::from_secs(u64::MAX)) > before);
		assert!(deadline_after(Duration::from_secs(1)) <= Instant::now() + Duration::from_secs(1));
	}

	#[tokio::test]
	async fn ready_snapshot_returns_immediately() {
		let client = FakeK8sClient::new();
		client.insert_volume_snapshot("ns", snapshot(true));
		let vs = wait_volume_snapshot_ready(&client, "snap", "ns", Duration::ZERO, INTERVAL)
			.await
			.unwrap();
		assert_eq!(vs.metadata.name.as_deref(), Some("snap"));
	}

	#[tokio::test]
	async fn unready_snapshot_times_out() {
		let client = FakeK8sClient::new();
		client.insert_volume_snapshot("ns", snapshot(false));
		let err = wait_volume_snapshot_ready(&client, "snap", "ns", Duration::from_millis(20), INTERVAL)
			.await
			.unwrap_err();
		assert!(err.is_retryable());
	}

	#[tokio::test]
	async fn missing_snapshot_is_fatal() {
		let client = FakeK8sClient::new();
		let err = wait_volume_snapshot_ready(&client, "snap", "ns", Duration::from_secs(5), INTERVAL)
			.await
			.unwrap_err();
		assert!(matches!(err, ExposeError::K8s(ref e) if e.is_not_found()));
	}

	#[tokio::test]
	async fn ensure_delete_tolerates_absent_snapshot() {
		let client = FakeK8sClient::new();
		ensure_delete_volume_snapshot(&client, "snap", "ns", Duration::ZERO, INTERVAL)
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn retain_skips_already_retained_content() {
		let client = FakeK8sClient::new();
		let mut content = VolumeSnapshotContent::new("content", VolumeSnapshotContentSpec::default());
		content.spec.deletion_policy = DeletionPolicy::Retain;
		client.insert_snapshot_content(content.clone());

		let patched = retain_snapshot_content(&client, &content).await.unwrap();
		assert!(patched.is_none());
		assert!(!client
			.journal()
			.iter()
			.any(|entry| entry.starts_with(&format!("{:?}", FakeOp::PatchSnapshotContent))));
	}

	#[tokio::test]
	async fn retain_patches_delete_policy() {
		let client = FakeK8sClient::new();
		let content = VolumeSnapshotContent::new("content", VolumeSnapshotContentSpec::default());
		client.insert_snapshot_content(content.clone());

		let patched = retain_snapshot_content(&client, &content).await.unwrap().unwrap();
		assert_eq!(patched.spec.deletion_policy, DeletionPolicy::Retain);
	}
}
