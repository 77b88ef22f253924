// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Core and CSI snapshot object types used by the exposer.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

pub use k8s_openapi::api::apps::v1::DaemonSet;
pub use k8s_openapi::api::core::v1::{
	Affinity, Container, EnvFromSource, EnvVar, NodeAffinity, NodeSelector,
	NodeSelectorRequirement, NodeSelectorTerm, ObjectReference, PersistentVolume,
	PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, Pod,
	PodCondition, PodDNSConfig, PodOS, PodSecurityContext, PodSpec, PodStatus,
	ResourceRequirements, SELinuxOptions, Toleration, TopologySpreadConstraint,
	TypedLocalObjectReference, Volume, VolumeDevice, VolumeMount, VolumeResourceRequirements,
	WindowsSecurityContextOptions,
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};

/// API group of the CSI snapshot resources.
pub const SNAPSHOT_API_GROUP: &str = "snapshot.storage.k8s.io";

/// What happens to the storage-side snapshot when its content object is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
	#[default]
	Delete,
	Retain,
}

impl DeletionPolicy {
	pub fn as_str(&self) -> &'static str {
		match self {
			DeletionPolicy::Delete => "Delete",
			DeletionPolicy::Retain => "Retain",
		}
	}
}

impl std::fmt::Display for DeletionPolicy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error reported by the snapshot controller on a snapshot or its content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotError {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time: Option<Time>,
}

/// Either a claim to snapshot dynamically or pre-provisioned content to bind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSource {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub persistent_volume_claim_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub volume_snapshot_content_name: Option<String>,
}

/// `snapshot.storage.k8s.io/v1` VolumeSnapshot.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
	group = "snapshot.storage.k8s.io",
	version = "v1",
	kind = "VolumeSnapshot",
	namespaced,
	status = "VolumeSnapshotStatus",
	schema = "disabled",
	derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSpec {
	pub source: VolumeSnapshotSource,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub volume_snapshot_class_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotStatus {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bound_volume_snapshot_content_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub creation_time: Option<Time>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ready_to_use: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub restore_size: Option<Quantity>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<VolumeSnapshotError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotContentSource {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub volume_handle: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub snapshot_handle: Option<String>,
}

/// `snapshot.storage.k8s.io/v1` VolumeSnapshotContent (cluster scoped).
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
	group = "snapshot.storage.k8s.io",
	version = "v1",
	kind = "VolumeSnapshotContent",
	status = "VolumeSnapshotContentStatus",
	schema = "disabled",
	derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotContentSpec {
	pub volume_snapshot_ref: ObjectReference,
	pub deletion_policy: DeletionPolicy,
	pub driver: String,
	pub source: VolumeSnapshotContentSource,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub volume_snapshot_class_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotContentStatus {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub snapshot_handle: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub creation_time: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ready_to_use: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub restore_size: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<VolumeSnapshotError>,
}
