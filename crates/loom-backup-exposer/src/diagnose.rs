// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One-line summaries of exposer objects for human-readable diagnostics.

use loom_backup_k8s::{
	PersistentVolume, PersistentVolumeClaim, Pod, VolumeSnapshot, VolumeSnapshotContent,
};

fn or_empty(value: Option<&String>) -> &str {
	value.map(String::as_str).unwrap_or_default()
}

/// Pod line followed by one line per pod condition.
pub fn diagnose_pod(pod: &Pod) -> String {
	let status = pod.status.as_ref();
	let mut diag = format!(
		"Pod {}/{}, phase {}, node name {}\n",
		or_empty(pod.metadata.namespace.as_ref()),
		or_empty(pod.metadata.name.as_ref()),
		or_empty(status.and_then(|s| s.phase.as_ref())),
		or_empty(pod.spec.as_ref().and_then(|s| s.node_name.as_ref())),
	);

	for condition in status.and_then(|s| s.conditions.as_ref()).into_iter().flatten() {
		diag.push_str(&format!(
			"Pod condition {}, status {}, reason {}, message {}\n",
			condition.type_,
			condition.status,
			or_empty(condition.reason.as_ref()),
			or_empty(condition.message.as_ref()),
		));
	}
	diag
}

pub fn diagnose_pvc(pvc: &PersistentVolumeClaim) -> String {
	format!(
		"PVC {}/{}, phase {}, binding to {}\n",
		or_empty(pvc.metadata.namespace.as_ref()),
		or_empty(pvc.metadata.name.as_ref()),
		or_empty(pvc.status.as_ref().and_then(|s| s.phase.as_ref())),
		or_empty(pvc.spec.as_ref().and_then(|s| s.volume_name.as_ref())),
	)
}

pub fn diagnose_pv(pv: &PersistentVolume) -> String {
	let status = pv.status.as_ref();
	format!(
		"PV {}, phase {}, reason {}, message {}\n",
		or_empty(pv.metadata.name.as_ref()),
		or_empty(status.and_then(|s| s.phase.as_ref())),
		or_empty(status.and_then(|s| s.reason.as_ref())),
		or_empty(status.and_then(|s| s.message.as_ref())),
	)
}

pub fn diagnose_volume_snapshot(vs: &VolumeSnapshot) -> String {
	let status = vs.status.as_ref();
	format!(
		"VS {}/{}, bind to {}, readyToUse {}, errMessage {}\n",
		or_empty(vs.metadata.namespace.as_ref()),
		or_empty(vs.metadata.name.as_ref()),
		or_empty(status.and_then(|s| s.bound_volume_snapshot_content_name.as_ref())),
		status.and_then(|s| s.ready_to_use).unwrap_or(false),
		or_empty(status.and_then(|s| s.error.as_ref()).and_then(|e| e.message.as_ref())),
	)
}

pub fn diagnose_snapshot_content(vsc: &VolumeSnapshotContent) -> String {
	let status = vsc.status.as_ref();
	format!(
		"VSC {}, readyToUse {}, errMessage {}, handle {}\n",
		or_empty(vsc.metadata.name.as_ref()),
		status.and_then(|s| s.ready_to_use).unwrap_or(false),
		or_empty(status.and_then(|s| s.error.as_ref()).and_then(|e| e.message.as_ref())),
		or_empty(status.and_then(|s| s.snapshot_handle.as_ref())),
	)
}
