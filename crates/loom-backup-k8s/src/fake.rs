// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory K8s object store for tests.
//!
//! `FakeK8sClient` keeps every object kind the exposer touches in ordered maps
//! and reproduces the behaviour the exposer relies on: `NotFound` for absent
//! objects, `Conflict` for duplicate creates, cascade of a `Delete`-policy
//! snapshot content when its snapshot goes away, and PV reclamation when a
//! claim is deleted. Failures can be injected per operation (optionally per
//! object name) and the whole store can be made unreachable.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
	PersistentVolumeClaimStatus, PersistentVolumeSpec, PersistentVolumeStatus,
};

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::types::{
	DaemonSet, DeletionPolicy, ObjectMeta, ObjectReference, PersistentVolume,
	PersistentVolumeClaim, Pod, VolumeSnapshot, VolumeSnapshotContent,
};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
	CreatePod,
	GetPod,
	DeletePod,
	ListPods,
	CreatePvc,
	GetPvc,
	DeletePvc,
	GetPv,
	PatchPv,
	CreateVolumeSnapshot,
	GetVolumeSnapshot,
	DeleteVolumeSnapshot,
	CreateSnapshotContent,
	GetSnapshotContent,
	DeleteSnapshotContent,
	PatchSnapshotContent,
	GetDaemonSet,
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
	(namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct FakeState {
	pods: BTreeMap<Key, Pod>,
	pvcs: BTreeMap<Key, PersistentVolumeClaim>,
	pvs: BTreeMap<String, PersistentVolume>,
	snapshots: BTreeMap<Key, VolumeSnapshot>,
	contents: BTreeMap<String, VolumeSnapshotContent>,
	daemonsets: BTreeMap<Key, DaemonSet>,
	failures: Vec<(FakeOp, Option<String>)>,
	unavailable: bool,
	auto_bind_pvcs: bool,
	deleted_contents: Vec<VolumeSnapshotContent>,
	journal: Vec<String>,
	next_uid: u64,
}

impl FakeState {
	fn check(&mut self, op: FakeOp, name: &str) -> Result<(), K8sError> {
		self.journal.push(format!("{op:?} {name}"));
		if self.unavailable {
			return Err(K8sError::ApiError {
				message: "connection refused".to_string(),
			});
		}
		let injected = self
			.failures
			.iter()
			.any(|(o, n)| *o == op && n.as_deref().map_or(true, |n| n == name));
		if injected {
			return Err(K8sError::ApiError {
				message: format!("injected failure: {op:?} {name}"),
			});
		}
		Ok(())
	}

	fn stamp(&mut self, meta: &mut ObjectMeta) {
		self.next_uid += 1;
		if meta.uid.is_none() {
			meta.uid = Some(format!("uid-{}", self.next_uid));
		}
		meta.resource_version = Some(self.next_uid.to_string());
	}

	fn remove_content(&mut self, name: &str) -> Option<VolumeSnapshotContent> {
		let removed = self.contents.remove(name);
		if let Some(content) = &removed {
			self.deleted_contents.push(content.clone());
		}
		removed
	}

	fn bind(&mut self, namespace: &str, pvc: &mut PersistentVolumeClaim) {
		let claim_name = pvc.metadata.name.clone().unwrap_or_default();
		let pv_name = format!(
			"pvc-{}",
			pvc.metadata.uid.clone().unwrap_or_else(|| claim_name.clone())
		);
		let spec = pvc.spec.get_or_insert_with(Default::default);
		spec.volume_name = Some(pv_name.clone());
		let storage_class_name = spec.storage_class_name.clone();
		pvc.status = Some(PersistentVolumeClaimStatus {
			phase: Some("Bound".to_string()),
			..Default::default()
		});

		let mut pv = PersistentVolume {
			metadata: ObjectMeta {
				name: Some(pv_name.clone()),
				..Default::default()
			},
			spec: Some(PersistentVolumeSpec {
				claim_ref: Some(ObjectReference {
					name: Some(claim_name),
					namespace: Some(namespace.to_string()),
					..Default::default()
				}),
				persistent_volume_reclaim_policy: Some("Delete".to_string()),
				storage_class_name,
				..Default::default()
			}),
			status: Some(PersistentVolumeStatus {
				phase: Some("Bound".to_string()),
				..Default::default()
			}),
		};
		self.stamp(&mut pv.metadata);
		self.pvs.insert(pv_name, pv);
	}
}

/// In-memory implementation of [`K8sClient`].
#[derive(Default)]
pub struct FakeK8sClient {
	state: Mutex<FakeState>,
}

impl FakeK8sClient {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, FakeState> {
		self.state.lock().unwrap()
	}

	/// Bind every claim to a freshly provisioned volume as soon as it is created.
	pub fn set_auto_bind_pvcs(&self, enabled: bool) {
		self.state().auto_bind_pvcs = enabled;
	}

	/// Make every call to `op` fail.
	pub fn fail(&self, op: FakeOp) {
		self.state().failures.push((op, None));
	}

	/// Make calls to `op` against the object called `name` fail.
	pub fn fail_named(&self, op: FakeOp, name: &str) {
		self.state().failures.push((op, Some(name.to_string())));
	}

	pub fn clear_failures(&self) {
		self.state().failures.clear();
	}

	/// Simulate losing connectivity to the API server.
	pub fn set_unavailable(&self, unavailable: bool) {
		self.state().unavailable = unavailable;
	}

	/// Every call made so far, as `"<op> <name>"`.
	pub fn journal(&self) -> Vec<String> {
		self.state().journal.clone()
	}

	/// Snapshot contents as they were at the moment they were deleted.
	pub fn deleted_snapshot_contents(&self) -> Vec<VolumeSnapshotContent> {
		self.state().deleted_contents.clone()
	}

	pub fn insert_pod(&self, namespace: &str, mut pod: Pod) {
		let mut state = self.state();
		state.stamp(&mut pod.metadata);
		let name = pod.metadata.name.clone().unwrap_or_default();
		state.pods.insert(key(namespace, &name), pod);
	}

	pub fn insert_pvc(&self, namespace: &str, mut pvc: PersistentVolumeClaim) {
		let mut state = self.state();
		state.stamp(&mut pvc.metadata);
		let name = pvc.metadata.name.clone().unwrap_or_default();
		state.pvcs.insert(key(namespace, &name), pvc);
	}

	pub fn insert_volume_snapshot(&self, namespace: &str, mut snapshot: VolumeSnapshot) {
		let mut state = self.state();
		state.stamp(&mut snapshot.metadata);
		snapshot.metadata.namespace = Some(namespace.to_string());
		let name = snapshot.metadata.name.clone().unwrap_or_default();
		state.snapshots.insert(key(namespace, &name), snapshot);
	}

	pub fn insert_snapshot_content(&self, mut content: VolumeSnapshotContent) {
		let mut state = self.state();
		state.stamp(&mut content.metadata);
		let name = content.metadata.name.clone().unwrap_or_default();
		state.contents.insert(name, content);
	}

	pub fn insert_daemonset(&self, namespace: &str, mut daemonset: DaemonSet) {
		let mut state = self.state();
		state.stamp(&mut daemonset.metadata);
		let name = daemonset.metadata.name.clone().unwrap_or_default();
		state.daemonsets.insert(key(namespace, &name), daemonset);
	}

	/// Mutate a stored pod in place, e.g. to simulate scheduling.
	pub fn update_pod(&self, name: &str, namespace: &str, f: impl FnOnce(&mut Pod)) {
		if let Some(pod) = self.state().pods.get_mut(&key(namespace, name)) {
			f(pod);
		}
	}

	pub fn update_volume_snapshot(
		&self,
		name: &str,
		namespace: &str,
		f: impl FnOnce(&mut VolumeSnapshot),
	) {
		if let Some(snapshot) = self.state().snapshots.get_mut(&key(namespace, name)) {
			f(snapshot);
		}
	}

	pub fn pod(&self, name: &str, namespace: &str) -> Option<Pod> {
		self.state().pods.get(&key(namespace, name)).cloned()
	}

	pub fn pvc(&self, name: &str, namespace: &str) -> Option<PersistentVolumeClaim> {
		self.state().pvcs.get(&key(namespace, name)).cloned()
	}

	pub fn pv(&self, name: &str) -> Option<PersistentVolume> {
		self.state().pvs.get(name).cloned()
	}

	pub fn volume_snapshot(&self, name: &str, namespace: &str) -> Option<VolumeSnapshot> {
		self.state().snapshots.get(&key(namespace, name)).cloned()
	}

	pub fn snapshot_content(&self, name: &str) -> Option<VolumeSnapshotContent> {
		self.state().contents.get(name).cloned()
	}

	/// Every stored object except DaemonSets, as `"<Kind> <namespace>/<name>"`.
	pub fn object_names(&self) -> Vec<String> {
		let state = self.state();
		let mut names = Vec::new();
		names.extend(state.pods.keys().map(|(ns, n)| format!("Pod {ns}/{n}")));
		names.extend(
			state
				.pvcs
				.keys()
				.map(|(ns, n)| format!("PersistentVolumeClaim {ns}/{n}")),
		);
		names.extend(state.pvs.keys().map(|n| format!("PersistentVolume {n}")));
		names.extend(
			state
				.snapshots
				.keys()
				.map(|(ns, n)| format!("VolumeSnapshot {ns}/{n}")),
		);
		names.extend(
			state
				.contents
				.keys()
				.map(|n| format!("VolumeSnapshotContent {n}")),
		);
		names
	}
}

fn labels_match(meta: &ObjectMeta, selector: &str) -> bool {
	let labels = meta.labels.clone().unwrap_or_default();
	selector
		.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.all(|term| match term.split_once('=') {
			Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
			None => labels.contains_key(term),
		})
}

fn already_exists(kind: &str, name: &str) -> K8sError {
	K8sError::Conflict {
		message: format!("{kind} \"{name}\" already exists"),
	}
}

#[async_trait]
impl K8sClient for FakeK8sClient {
	async fn create_pod(&self, namespace: &str, mut pod: Pod) -> Result<Pod, K8sError> {
		let name = pod.metadata.name.clone().unwrap_or_default();
		let mut state = self.state();
		state.check(FakeOp::CreatePod, &name)?;
		if state.pods.contains_key(&key(namespace, &name)) {
			return Err(already_exists("Pod", &name));
		}
		state.stamp(&mut pod.metadata);
		pod.metadata.namespace = Some(namespace.to_string());
		state.pods.insert(key(namespace, &name), pod.clone());
		Ok(pod)
	}

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		let mut state = self.state();
		state.check(FakeOp::GetPod, name)?;
		state
			.pods
			.get(&key(namespace, name))
			.cloned()
			.ok_or_else(|| K8sError::not_found("Pod", name))
	}

	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		_grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		let mut state = self.state();
		state.check(FakeOp::DeletePod, name)?;
		state
			.pods
			.remove(&key(namespace, name))
			.map(|_| ())
			.ok_or_else(|| K8sError::not_found("Pod", name))
	}

	async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, K8sError> {
		let mut state = self.state();
		state.check(FakeOp::ListPods, label_selector)?;
		Ok(
			state
				.pods
				.iter()
				.filter(|((ns, _), pod)| ns == namespace && labels_match(&pod.metadata, label_selector))
				.map(|(_, pod)| pod.clone())
				.collect(),
		)
	}

	async fn list_pods_on_node(
		&self,
		namespace: &str,
		label_selector: &str,
		node_name: &str,
	) -> Result<Vec<Pod>, K8sError> {
		let pods = self.list_pods(namespace, label_selector).await?;
		Ok(
			pods
				.into_iter()
				.filter(|pod| {
					pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(node_name)
				})
				.collect(),
		)
	}

	async fn create_pvc(
		&self,
		namespace: &str,
		mut pvc: PersistentVolumeClaim,
	) -> Result<PersistentVolumeClaim, K8sError> {
		let name = pvc.metadata.name.clone().unwrap_or_default();
		let mut state = self.state();
		state.check(FakeOp::CreatePvc, &name)?;
		if state.pvcs.contains_key(&key(namespace, &name)) {
			return Err(already_exists("PersistentVolumeClaim", &name));
		}
		state.stamp(&mut pvc.metadata);
		pvc.metadata.namespace = Some(namespace.to_string());
		if state.auto_bind_pvcs {
			state.bind(namespace, &mut pvc);
		}
		state.pvcs.insert(key(namespace, &name), pvc.clone());
		Ok(pvc)
	}

	async fn get_pvc(&self, name: &str, namespace: &str) -> Result<PersistentVolumeClaim, K8sError> {
		let mut state = self.state();
		state.check(FakeOp::GetPvc, name)?;
		state
			.pvcs
			.get(&key(namespace, name))
			.cloned()
			.ok_or_else(|| K8sError::not_found("PersistentVolumeClaim", name))
	}

	async fn delete_pvc(&self, name: &str, namespace: &str) -> Result<(), K8sError> {
		let mut state = self.state();
		state.check(FakeOp::DeletePvc, name)?;
		let pvc = state
			.pvcs
			.remove(&key(namespace, name))
			.ok_or_else(|| K8sError::not_found("PersistentVolumeClaim", name))?;

		let volume_name = pvc.spec.and_then(|s| s.volume_name);
		if let Some(volume_name) = volume_name {
			let reclaim = state
				.pvs
				.get(&volume_name)
				.and_then(|pv| pv.spec.as_ref())
				.and_then(|s| s.persistent_volume_reclaim_policy.clone());
			if reclaim.as_deref() == Some("Delete") {
				state.pvs.remove(&volume_name);
			} else if let Some(pv) = state.pvs.get_mut(&volume_name) {
				pv.status.get_or_insert_with(Default::default).phase = Some("Released".to_string());
			}
		}
		Ok(())
	}

	async fn get_pv(&self, name: &str) -> Result<PersistentVolume, K8sError> {
		let mut state = self.state();
		state.check(FakeOp::GetPv, name)?;
		state
			.pvs
			.get(name)
			.cloned()
			.ok_or_else(|| K8sError::not_found("PersistentVolume", name))
	}

	async fn patch_pv_reclaim_policy(
		&self,
		name: &str,
		policy: &str,
	) -> Result<PersistentVolume, K8sError> {
		let mut state = self.state();
		state.check(FakeOp::PatchPv, name)?;
		let pv = state
			.pvs
			.get_mut(name)
			.ok_or_else(|| K8sError::not_found("PersistentVolume", name))?;
		pv.spec.get_or_insert_with(Default::default).persistent_volume_reclaim_policy =
			Some(policy.to_string());
		Ok(pv.clone())
	}

	async fn create_volume_snapshot(
		&self,
		namespace: &str,
		mut snapshot: VolumeSnapshot,
	) -> Result<VolumeSnapshot, K8sError> {
		let name = snapshot.metadata.name.clone().unwrap_or_default();
		let mut state = self.state();
		state.check(FakeOp::CreateVolumeSnapshot, &name)?;
		if state.snapshots.contains_key(&key(namespace, &name)) {
			return Err(already_exists("VolumeSnapshot", &name));
		}
		state.stamp(&mut snapshot.metadata);
		snapshot.metadata.namespace = Some(namespace.to_string());
		state.snapshots.insert(key(namespace, &name), snapshot.clone());
		Ok(snapshot)
	}

	async fn get_volume_snapshot(
		&self,
		name: &str,
		namespace: &str,
	) -> Result<VolumeSnapshot, K8sError> {
		let mut state = self.state();
		state.check(FakeOp::GetVolumeSnapshot, name)?;
		state
			.snapshots
			.get(&key(namespace, name))
			.cloned()
			.ok_or_else(|| K8sError::not_found("VolumeSnapshot", name))
	}

	async fn delete_volume_snapshot(&self, name: &str, namespace: &str) -> Result<(), K8sError> {
		let mut state = self.state();
		state.check(FakeOp::DeleteVolumeSnapshot, name)?;
		let snapshot = state
			.snapshots
			.remove(&key(namespace, name))
			.ok_or_else(|| K8sError::not_found("VolumeSnapshot", name))?;

		// A bound content with the Delete policy goes away with its snapshot.
		let bound = snapshot
			.status
			.and_then(|s| s.bound_volume_snapshot_content_name);
		if let Some(bound) = bound {
			let policy = state.contents.get(&bound).map(|c| c.spec.deletion_policy);
			if policy == Some(DeletionPolicy::Delete) {
				state.remove_content(&bound);
			}
		}
		Ok(())
	}

	async fn create_snapshot_content(
		&self,
		mut content: VolumeSnapshotContent,
	) -> Result<VolumeSnapshotContent, K8sError> {
		let name = content.metadata.name.clone().unwrap_or_default();
		let mut state = self.state();
		state.check(FakeOp::CreateSnapshotContent, &name)?;
		if state.contents.contains_key(&name) {
			return Err(already_exists("VolumeSnapshotContent", &name));
		}
		state.stamp(&mut content.metadata);
		state.contents.insert(name, content.clone());
		Ok(content)
	}

	async fn get_snapshot_content(&self, name: &str) -> Result<VolumeSnapshotContent, K8sError> {
		let mut state = self.state();
		state.check(FakeOp::GetSnapshotContent, name)?;
		state
			.contents
			.get(name)
			.cloned()
			.ok_or_else(|| K8sError::not_found("VolumeSnapshotContent", name))
	}

	async fn delete_snapshot_content(&self, name: &str) -> Result<(), K8sError> {
		let mut state = self.state();
		state.check(FakeOp::DeleteSnapshotContent, name)?;
		state
			.remove_content(name)
			.map(|_| ())
			.ok_or_else(|| K8sError::not_found("VolumeSnapshotContent", name))
	}

	async fn patch_snapshot_content_deletion_policy(
		&self,
		name: &str,
		policy: DeletionPolicy,
	) -> Result<VolumeSnapshotContent, K8sError> {
		let mut state = self.state();
		state.check(FakeOp::PatchSnapshotContent, name)?;
		state.next_uid += 1;
		let version = state.next_uid.to_string();
		let content = state
			.contents
			.get_mut(name)
			.ok_or_else(|| K8sError::not_found("VolumeSnapshotContent", name))?;
		content.spec.deletion_policy = policy;
		content.metadata.resource_version = Some(version);
		Ok(content.clone())
	}

	async fn get_daemonset(&self, name: &str, namespace: &str) -> Result<DaemonSet, K8sError> {
		let mut state = self.state();
		state.check(FakeOp::GetDaemonSet, name)?;
		state
			.daemonsets
			.get(&key(namespace, name))
			.cloned()
			.ok_or_else(|| K8sError::not_found("DaemonSet", name))
	}
}
