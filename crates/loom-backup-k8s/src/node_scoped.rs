// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::types::{
	DaemonSet, DeletionPolicy, PersistentVolume, PersistentVolumeClaim, Pod, VolumeSnapshot,
	VolumeSnapshotContent,
};

/// Client whose pod view is limited to one node.
///
/// Pod reads go through a `spec.nodeName` field selector, so a pod scheduled
/// elsewhere is reported as [`K8sError::NotFound`]. Every other kind is
/// passed through unchanged.
pub struct NodeScopedClient {
	inner: Arc<dyn K8sClient>,
	node_name: String,
}

impl NodeScopedClient {
	pub fn new(inner: Arc<dyn K8sClient>, node_name: impl Into<String>) -> Self {
		Self {
			inner,
			node_name: node_name.into(),
		}
	}
}

#[async_trait]
impl K8sClient for NodeScopedClient {
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError> {
		self.inner.create_pod(namespace, pod).await
	}

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		self
			.inner
			.list_pods_on_node(namespace, "", &self.node_name)
			.await?
			.into_iter()
			.find(|pod| pod.metadata.name.as_deref() == Some(name))
			.ok_or_else(|| K8sError::not_found("Pod", name))
	}

	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		self.inner.delete_pod(name, namespace, grace_period_seconds).await
	}

	async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, K8sError> {
		self
			.inner
			.list_pods_on_node(namespace, label_selector, &self.node_name)
			.await
	}

	async fn list_pods_on_node(
		&self,
		namespace: &str,
		label_selector: &str,
		node_name: &str,
	) -> Result<Vec<Pod>, K8sError> {
		if node_name != self.node_name {
			return Ok(Vec::new());
		}
		self
			.inner
			.list_pods_on_node(namespace, label_selector, node_name)
			.await
	}

	async fn create_pvc(
		&self,
		namespace: &str,
		pvc: PersistentVolumeClaim,
	) -> Result<PersistentVolumeClaim, K8sError> {
		self.inner.create_pvc(namespace, pvc).await
	}

	async fn get_pvc(&self, name: &str, namespace: &str) -> Result<PersistentVolumeClaim, K8sError> {
		self.inner.get_pvc(name, namespace).await
	}

	async fn delete_pvc(&self, name: &str, namespace: &str) -> Result<(), K8sError> {
		self.inner.delete_pvc(name, namespace).await
	}

	async fn get_pv(&self, name: &str) -> Result<PersistentVolume, K8sError> {
		self.inner.get_pv(name).await
	}

	async fn patch_pv_reclaim_policy(
		&self,
		name: &str,
		policy: &str,
	) -> Result<PersistentVolume, K8sError> {
		self.inner.patch_pv_reclaim_policy(name, policy).await
	}

	async fn create_volume_snapshot(
		&self,
		namespace: &str,
		snapshot: VolumeSnapshot,
	) -> Result<VolumeSnapshot, K8sError> {
		self.inner.create_volume_snapshot(namespace, snapshot).await
	}

	async fn get_volume_snapshot(
		&self,
		name: &str,
		namespace: &str,
	) -> Result<VolumeSnapshot, K8sError> {
		self.inner.get_volume_snapshot(name, namespace).await
	}

	async fn delete_volume_snapshot(&self, name: &str, namespace: &str) -> Result<(), K8sError> {
		self.inner.delete_volume_snapshot(name, namespace).await
	}

	async fn create_snapshot_content(
		&self,
		content: VolumeSnapshotContent,
	) -> Result<VolumeSnapshotContent, K8sError> {
		self.inner.create_snapshot_content(content).await
	}

	async fn get_snapshot_content(&self, name: &str) -> Result<VolumeSnapshotContent, K8sError> {
		self.inner.get_snapshot_content(name).await
	}

	async fn delete_snapshot_content(&self, name: &str) -> Result<(), K8sError> {
		self.inner.delete_snapshot_content(name).await
	}

	async fn patch_snapshot_content_deletion_policy(
		&self,
		name: &str,
		policy: DeletionPolicy,
	) -> Result<VolumeSnapshotContent, K8sError> {
		self
			.inner
			.patch_snapshot_content_deletion_policy(name, policy)
			.await
	}

	async fn get_daemonset(&self, name: &str, namespace: &str) -> Result<DaemonSet, K8sError> {
		self.inner.get_daemonset(name, namespace).await
	}
}
