// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use kube::{
	api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
	Client,
};
use serde_json::json;
use tracing::{debug, instrument};

use crate::client::K8sClient;
use crate::error::{from_kube, K8sError};
use crate::types::{
	DaemonSet, DeletionPolicy, PersistentVolume, PersistentVolumeClaim, Pod, VolumeSnapshot,
	VolumeSnapshotContent,
};

/// Production K8s client implementation using the kube crate.
#[derive(Clone)]
pub struct KubeClient {
	client: Client,
}

impl KubeClient {
	/// Create a new KubeClient that auto-discovers cluster configuration.
	///
	/// This will attempt to load config from:
	/// 1. In-cluster service account (when running in K8s)
	/// 2. KUBECONFIG environment variable
	/// 3. ~/.kube/config
	pub async fn new() -> Result<Self, K8sError> {
		let client = Client::try_default().await?;
		debug!("K8s client initialized");
		Ok(Self { client })
	}

	/// Wrap an already configured kube client.
	pub fn from_client(client: Client) -> Self {
		Self { client }
	}

	fn pods(&self, namespace: &str) -> Api<Pod> {
		Api::namespaced(self.client.clone(), namespace)
	}

	fn pvcs(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
		Api::namespaced(self.client.clone(), namespace)
	}

	fn snapshots(&self, namespace: &str) -> Api<VolumeSnapshot> {
		Api::namespaced(self.client.clone(), namespace)
	}

	fn contents(&self) -> Api<VolumeSnapshotContent> {
		Api::all(self.client.clone())
	}
}

#[async_trait]
impl K8sClient for KubeClient {
	#[instrument(skip(self, pod))]
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError> {
		let name = pod.metadata.name.clone().unwrap_or_default();
		self
			.pods(namespace)
			.create(&PostParams::default(), &pod)
			.await
			.map_err(|e| from_kube(e, "Pod", &name))
	}

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		self
			.pods(namespace)
			.get(name)
			.await
			.map_err(|e| from_kube(e, "Pod", name))
	}

	#[instrument(skip(self))]
	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		let dp = DeleteParams {
			grace_period_seconds: Some(grace_period_seconds),
			..Default::default()
		};
		self
			.pods(namespace)
			.delete(name, &dp)
			.await
			.map(|_| ())
			.map_err(|e| from_kube(e, "Pod", name))
	}

	async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, K8sError> {
		let lp = ListParams::default().labels(label_selector);
		let pod_list = self.pods(namespace).list(&lp).await?;
		Ok(pod_list.items)
	}

	async fn list_pods_on_node(
		&self,
		namespace: &str,
		label_selector: &str,
		node_name: &str,
	) -> Result<Vec<Pod>, K8sError> {
		let lp = ListParams::default()
			.labels(label_selector)
			.fields(&format!("spec.nodeName={node_name}"));
		let pod_list = self.pods(namespace).list(&lp).await?;
		Ok(pod_list.items)
	}

	#[instrument(skip(self, pvc))]
	async fn create_pvc(
		&self,
		namespace: &str,
		pvc: PersistentVolumeClaim,
	) -> Result<PersistentVolumeClaim, K8sError> {
		let name = pvc.metadata.name.clone().unwrap_or_default();
		self
			.pvcs(namespace)
			.create(&PostParams::default(), &pvc)
			.await
			.map_err(|e| from_kube(e, "PersistentVolumeClaim", &name))
	}

	async fn get_pvc(&self, name: &str, namespace: &str) -> Result<PersistentVolumeClaim, K8sError> {
		self
			.pvcs(namespace)
			.get(name)
			.await
			.map_err(|e| from_kube(e, "PersistentVolumeClaim", name))
	}

	#[instrument(skip(self))]
	async fn delete_pvc(&self, name: &str, namespace: &str) -> Result<(), K8sError> {
		self
			.pvcs(namespace)
			.delete(name, &DeleteParams::default())
			.await
			.map(|_| ())
			.map_err(|e| from_kube(e, "PersistentVolumeClaim", name))
	}

	async fn get_pv(&self, name: &str) -> Result<PersistentVolume, K8sError> {
		let pvs: Api<PersistentVolume> = Api::all(self.client.clone());
		pvs
			.get(name)
			.await
			.map_err(|e| from_kube(e, "PersistentVolume", name))
	}

	#[instrument(skip(self))]
	async fn patch_pv_reclaim_policy(
		&self,
		name: &str,
		policy: &str,
	) -> Result<PersistentVolume, K8sError> {
		let pvs: Api<PersistentVolume> = Api::all(self.client.clone());
		let patch = json!({ "spec": { "persistentVolumeReclaimPolicy": policy } });
		pvs
			.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
			.await
			.map_err(|e| from_kube(e, "PersistentVolume", name))
	}

	#[instrument(skip(self, snapshot))]
	async fn create_volume_snapshot(
		&self,
		namespace: &str,
		snapshot: VolumeSnapshot,
	) -> Result<VolumeSnapshot, K8sError> {
		let name = snapshot.metadata.name.clone().unwrap_or_default();
		self
			.snapshots(namespace)
			.create(&PostParams::default(), &snapshot)
			.await
			.map_err(|e| from_kube(e, "VolumeSnapshot", &name))
	}

	async fn get_volume_snapshot(
		&self,
		name: &str,
		namespace: &str,
	) -> Result<VolumeSnapshot, K8sError> {
		self
			.snapshots(namespace)
			.get(name)
			.await
			.map_err(|e| from_kube(e, "VolumeSnapshot", name))
	}

	#[instrument(skip(self))]
	async fn delete_volume_snapshot(&self, name: &str, namespace: &str) -> Result<(), K8sError> {
		self
			.snapshots(namespace)
			.delete(name, &DeleteParams::default())
			.await
			.map(|_| ())
			.map_err(|e| from_kube(e, "VolumeSnapshot", name))
	}

	#[instrument(skip(self, content))]
	async fn create_snapshot_content(
		&self,
		content: VolumeSnapshotContent,
	) -> Result<VolumeSnapshotContent, K8sError> {
		let name = content.metadata.name.clone().unwrap_or_default();
		self
			.contents()
			.create(&PostParams::default(), &content)
			.await
			.map_err(|e| from_kube(e, "VolumeSnapshotContent", &name))
	}

	async fn get_snapshot_content(&self, name: &str) -> Result<VolumeSnapshotContent, K8sError> {
		self
			.contents()
			.get(name)
			.await
			.map_err(|e| from_kube(e, "VolumeSnapshotContent", name))
	}

	#[instrument(skip(self))]
	async fn delete_snapshot_content(&self, name: &str) -> Result<(), K8sError> {
		self
			.contents()
			.delete(name, &DeleteParams::default())
			.await
			.map(|_| ())
			.map_err(|e| from_kube(e, "VolumeSnapshotContent", name))
	}

	#[instrument(skip(self))]
	async fn patch_snapshot_content_deletion_policy(
		&self,
		name: &str,
		policy: DeletionPolicy,
	) -> Result<VolumeSnapshotContent, K8sError> {
		let patch = json!({ "spec": { "deletionPolicy": policy.as_str() } });
		self
			.contents()
			.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
			.await
			.map_err(|e| from_kube(e, "VolumeSnapshotContent", name))
	}

	async fn get_daemonset(&self, name: &str, namespace: &str) -> Result<DaemonSet, K8sError> {
		let daemonsets: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
		daemonsets
			.get(name)
			.await
			.map_err(|e| from_kube(e, "DaemonSet", name))
	}
}
