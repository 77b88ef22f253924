// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::K8sError;
use crate::types::{
	DaemonSet, DeletionPolicy, PersistentVolume, PersistentVolumeClaim, Pod, VolumeSnapshot,
	VolumeSnapshotContent,
};

/// Trait for K8s client operations.
///
/// This abstraction allows the exposer to run against an in-memory store in
/// tests. Every lookup reports a missing object as [`K8sError::NotFound`] so
/// callers can branch on absence without inspecting status codes.
#[async_trait]
pub trait K8sClient: Send + Sync {
	/// Create a new pod in the specified namespace.
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError>;

	/// Get a specific pod by name from the specified namespace.
	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError>;

	/// Delete a pod by name from the specified namespace.
	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError>;

	/// List pods in a namespace matching the given label selector.
	async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, K8sError>;

	/// List pods matching the label selector that are assigned to `node_name`.
	async fn list_pods_on_node(
		&self,
		namespace: &str,
		label_selector: &str,
		node_name: &str,
	) -> Result<Vec<Pod>, K8sError>;

	async fn create_pvc(
		&self,
		namespace: &str,
		pvc: PersistentVolumeClaim,
	) -> Result<PersistentVolumeClaim, K8sError>;

	async fn get_pvc(&self, name: &str, namespace: &str) -> Result<PersistentVolumeClaim, K8sError>;

	async fn delete_pvc(&self, name: &str, namespace: &str) -> Result<(), K8sError>;

	async fn get_pv(&self, name: &str) -> Result<PersistentVolume, K8sError>;

	/// Set `spec.persistentVolumeReclaimPolicy` on a persistent volume.
	async fn patch_pv_reclaim_policy(
		&self,
		name: &str,
		policy: &str,
	) -> Result<PersistentVolume, K8sError>;

	async fn create_volume_snapshot(
		&self,
		namespace: &str,
		snapshot: VolumeSnapshot,
	) -> Result<VolumeSnapshot, K8sError>;

	async fn get_volume_snapshot(
		&self,
		name: &str,
		namespace: &str,
	) -> Result<VolumeSnapshot, K8sError>;

	async fn delete_volume_snapshot(&self, name: &str, namespace: &str) -> Result<(), K8sError>;

	async fn create_snapshot_content(
		&self,
		content: VolumeSnapshotContent,
	) -> Result<VolumeSnapshotContent, K8sError>;

	async fn get_snapshot_content(&self, name: &str) -> Result<VolumeSnapshotContent, K8sError>;

	async fn delete_snapshot_content(&self, name: &str) -> Result<(), K8sError>;

	/// Set `spec.deletionPolicy` on a snapshot content.
	async fn patch_snapshot_content_deletion_policy(
		&self,
		name: &str,
		policy: DeletionPolicy,
	) -> Result<VolumeSnapshotContent, K8sError>;

	async fn get_daemonset(&self, name: &str, namespace: &str) -> Result<DaemonSet, K8sError>;
}
