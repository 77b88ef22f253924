// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Construction of the objects derived during expose.
//!
//! Every derived object is named after the owner. The hosting pod's
//! container and claim volume are named after the owner UID.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use loom_backup_k8s::{
	Container, DeletionPolicy, LabelSelector, ObjectMeta, ObjectReference, PersistentVolumeClaim,
	PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, Pod, PodOS, PodSecurityContext,
	PodSpec, SELinuxOptions, Toleration, TopologySpreadConstraint, TypedLocalObjectReference,
	Volume, VolumeDevice, VolumeMount, VolumeResourceRequirements, VolumeSnapshot,
	VolumeSnapshotContent, VolumeSnapshotContentSource, VolumeSnapshotContentSpec,
	VolumeSnapshotSource, VolumeSnapshotSpec, WindowsSecurityContextOptions, SNAPSHOT_API_GROUP,
};

use crate::affinity::to_system_affinity;
use crate::csi_snapshot::CsiSnapshotExposeParams;
use crate::error::ExposeError;
use crate::node_agent::InheritedPodInfo;
use crate::types::{
	AccessMode, BackupPvcConfig, NodeOs, OwnerRef, NODE_OS_LABEL, POD_GROUP_LABEL,
	POD_GROUP_SNAPSHOT,
};

const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";
const WINDOWS_RUN_AS_USER: &str = "ContainerAdministrator";
const SPC_SELINUX_TYPE: &str = "spc_t";

/// Effective settings of the intermediate claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSettings {
	pub storage_class: String,
	pub read_only: bool,
	/// Skip SELinux relabeling of the mounted volume
	pub skip_relabel: bool,
	/// Relabel skipping was requested for a writable claim and dropped
	pub ignored_relabel: bool,
}

/// Apply the backup claim overrides registered for `storage_class`.
pub fn resolve_claim_settings(
	storage_class: &str,
	overrides: &HashMap<String, BackupPvcConfig>,
) -> ClaimSettings {
	let mut settings = ClaimSettings {
		storage_class: storage_class.to_string(),
		read_only: false,
		skip_relabel: false,
		ignored_relabel: false,
	};

	if let Some(config) = overrides.get(storage_class) {
		if !config.storage_class.is_empty() {
			settings.storage_class = config.storage_class.clone();
		}
		settings.read_only = config.read_only;
		if config.spc_no_relabeling {
			if config.read_only {
				settings.skip_relabel = true;
			} else {
				settings.ignored_relabel = true;
			}
		}
	}

	settings
}

/// Whether a quantity denotes zero, e.g. `0`, `0Gi` or an empty string.
pub fn quantity_is_zero(quantity: &Quantity) -> bool {
	let number = quantity
		.0
		.trim()
		.trim_end_matches(|c: char| c.is_ascii_alphabetic());
	if number.is_empty() {
		return true;
	}
	number.parse::<f64>().map(|n| n == 0.0).unwrap_or(false)
}

/// Render a duration the way Go's `time.Duration` prints, e.g. `1h2m3s`,
/// `10m0s`, `1.5s` or `250ms`.
pub fn format_go_duration(duration: Duration) -> String {
	if duration.is_zero() {
		return "0s".to_string();
	}

	let nanos = duration.as_nanos();
	if nanos < 1_000 {
		return format!("{nanos}ns");
	}
	if nanos < 1_000_000 {
		return format!("{}µs", with_fraction(nanos / 1_000, nanos % 1_000, 3));
	}
	if nanos < 1_000_000_000 {
		return format!(
			"{}ms",
			with_fraction(nanos / 1_000_000, nanos % 1_000_000, 6)
		);
	}

	let total_secs = duration.as_secs();
	let hours = total_secs / 3600;
	let minutes = (total_secs % 3600) / 60;
	let seconds = total_secs % 60;

	let mut out = String::new();
	if hours > 0 {
		let _ = write!(out, "{hours}h");
	}
	if hours > 0 || minutes > 0 {
		let _ = write!(out, "{minutes}m");
	}
	let _ = write!(
		out,
		"{}s",
		with_fraction(u128::from(seconds), u128::from(duration.subsec_nanos()), 9)
	);
	out
}

fn with_fraction(whole: u128, fraction: u128, digits: usize) -> String {
	if fraction == 0 {
		return whole.to_string();
	}
	let fraction = format!("{fraction:0digits$}");
	format!("{whole}.{}", fraction.trim_end_matches('0'))
}

/// Clone of the source snapshot bound to the owner-named content.
///
/// The clone carries no owner reference: the claim's data source refers to
/// it, so it must outlive the claim.
pub fn build_backup_volume_snapshot(owner: &OwnerRef, source: &VolumeSnapshot) -> VolumeSnapshot {
	VolumeSnapshot {
		metadata: ObjectMeta {
			name: Some(owner.name.clone()),
			namespace: Some(owner.namespace.clone()),
			annotations: source.metadata.annotations.clone(),
			..Default::default()
		},
		spec: VolumeSnapshotSpec {
			source: VolumeSnapshotSource {
				persistent_volume_claim_name: None,
				volume_snapshot_content_name: Some(owner.name.clone()),
			},
			volume_snapshot_class_name: source.spec.volume_snapshot_class_name.clone(),
		},
		status: None,
	}
}

/// Pre-provisioned content pointing at the storage snapshot of `source`.
///
/// The content is retained so deleting it never removes the storage
/// snapshot.
pub fn build_backup_snapshot_content(
	owner: &OwnerRef,
	source: &VolumeSnapshotContent,
	backup_snapshot: &VolumeSnapshot,
) -> Result<VolumeSnapshotContent, ExposeError> {
	let handle = source
		.status
		.as_ref()
		.and_then(|s| s.snapshot_handle.clone())
		.filter(|h| !h.is_empty())
		.ok_or_else(|| {
			ExposeError::Invariant(format!(
				"volume snapshot content {} has no snapshot handle",
				source.metadata.name.as_deref().unwrap_or_default()
			))
		})?;

	Ok(VolumeSnapshotContent {
		metadata: ObjectMeta {
			name: Some(owner.name.clone()),
			annotations: source.metadata.annotations.clone(),
			..Default::default()
		},
		spec: VolumeSnapshotContentSpec {
			volume_snapshot_ref: ObjectReference {
				name: backup_snapshot.metadata.name.clone(),
				namespace: backup_snapshot.metadata.namespace.clone(),
				uid: backup_snapshot.metadata.uid.clone(),
				resource_version: backup_snapshot.metadata.resource_version.clone(),
				..Default::default()
			},
			deletion_policy: DeletionPolicy::Retain,
			driver: source.spec.driver.clone(),
			source: VolumeSnapshotContentSource {
				volume_handle: None,
				snapshot_handle: Some(handle),
			},
			volume_snapshot_class_name: source.spec.volume_snapshot_class_name.clone(),
		},
		status: None,
	})
}

/// Claim restoring the owner-named snapshot.
pub fn build_backup_pvc(
	owner: &OwnerRef,
	settings: &ClaimSettings,
	access_mode: AccessMode,
	size: Quantity,
) -> PersistentVolumeClaim {
	let pvc_access_mode = if settings.read_only {
		"ReadOnlyMany"
	} else {
		"ReadWriteOnce"
	};

	PersistentVolumeClaim {
		metadata: ObjectMeta {
			name: Some(owner.name.clone()),
			namespace: Some(owner.namespace.clone()),
			owner_references: Some(vec![owner.owner_reference()]),
			..Default::default()
		},
		spec: Some(PersistentVolumeClaimSpec {
			access_modes: Some(vec![pvc_access_mode.to_string()]),
			storage_class_name: Some(settings.storage_class.clone()),
			volume_mode: Some(access_mode.volume_mode().to_string()),
			data_source: Some(TypedLocalObjectReference {
				api_group: Some(SNAPSHOT_API_GROUP.to_string()),
				kind: "VolumeSnapshot".to_string(),
				name: owner.name.clone(),
			}),
			data_source_ref: None,
			resources: Some(VolumeResourceRequirements {
				requests: Some(BTreeMap::from([("storage".to_string(), size)])),
				limits: None,
			}),
			..Default::default()
		}),
		status: None,
	}
}

/// Mounts, devices and in-pod path for attaching a claim volume.
///
/// Block claims are attached as a raw device, everything else as a mount.
pub fn make_pod_pvc_attachment(
	volume_name: &str,
	volume_mode: Option<&str>,
	read_only: bool,
) -> (Vec<VolumeMount>, Vec<VolumeDevice>, String) {
	let volume_path = format!("/{volume_name}");
	if volume_mode == Some("Block") {
		let devices = vec![VolumeDevice {
			name: volume_name.to_string(),
			device_path: volume_path.clone(),
		}];
		(Vec::new(), devices, volume_path)
	} else {
		let mounts = vec![VolumeMount {
			name: volume_name.to_string(),
			mount_path: volume_path.clone(),
			read_only: Some(read_only),
			..Default::default()
		}];
		(mounts, Vec::new(), volume_path)
	}
}

/// Hosting pod that runs the data mover against the claim.
pub fn build_backup_pod(
	owner: &OwnerRef,
	params: &CsiSnapshotExposeParams,
	claim: &ClaimSettings,
	pvc: &PersistentVolumeClaim,
	inherited: &InheritedPodInfo,
	command: &[String],
) -> Pod {
	let container_name = owner.uid.clone();
	let volume_name = owner.uid.clone();

	let volume_mode = pvc
		.spec
		.as_ref()
		.and_then(|s| s.volume_mode.clone())
		.unwrap_or_else(|| AccessMode::FileSystem.volume_mode().to_string());

	let (mut volume_mounts, volume_devices, volume_path) =
		make_pod_pvc_attachment(&volume_name, Some(&volume_mode), claim.read_only);
	volume_mounts.extend(inherited.volume_mounts.iter().cloned());

	let mut volumes = vec![Volume {
		name: volume_name,
		persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
			claim_name: pvc.metadata.name.clone().unwrap_or_default(),
			read_only: claim.read_only.then_some(true),
		}),
		..Default::default()
	}];
	volumes.extend(inherited.volumes.iter().cloned());

	let mut labels = params.hosting_pod_labels.clone();
	labels.insert(POD_GROUP_LABEL.to_string(), POD_GROUP_SNAPSHOT.to_string());

	let mut args = vec![
		format!("--volume-path={volume_path}"),
		format!("--volume-mode={volume_mode}"),
		format!("--data-upload={}", owner.name),
		format!(
			"--resource-timeout={}",
			format_go_duration(params.operation_timeout)
		),
	];
	args.extend(inherited.log_format_args.iter().cloned());
	args.extend(inherited.log_level_args.iter().cloned());

	let mut tolerations = Vec::new();
	let security_context = match params.node_os {
		NodeOs::Windows => {
			tolerations.push(Toleration {
				key: Some("os".to_string()),
				operator: Some("Equal".to_string()),
				value: Some(NodeOs::Windows.as_str().to_string()),
				effect: Some("NoSchedule".to_string()),
				toleration_seconds: None,
			});
			PodSecurityContext {
				windows_options: Some(WindowsSecurityContextOptions {
					run_as_user_name: Some(WINDOWS_RUN_AS_USER.to_string()),
					..Default::default()
				}),
				..Default::default()
			}
		}
		NodeOs::Linux => PodSecurityContext {
			run_as_user: Some(0),
			se_linux_options: claim.skip_relabel.then(|| SELinuxOptions {
				type_: Some(SPC_SELINUX_TYPE.to_string()),
				..Default::default()
			}),
			..Default::default()
		},
	};

	let node_selector = BTreeMap::from([(
		NODE_OS_LABEL.to_string(),
		params.node_os.as_str().to_string(),
	)]);

	Pod {
		metadata: ObjectMeta {
			name: Some(owner.name.clone()),
			namespace: Some(owner.namespace.clone()),
			owner_references: Some(vec![owner.owner_reference()]),
			labels: Some(labels),
			annotations: (!params.hosting_pod_annotations.is_empty())
				.then(|| params.hosting_pod_annotations.clone()),
			..Default::default()
		},
		spec: Some(PodSpec {
			topology_spread_constraints: Some(vec![TopologySpreadConstraint {
				max_skew: 1,
				topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
				when_unsatisfiable: "ScheduleAnyway".to_string(),
				label_selector: Some(LabelSelector {
					match_labels: Some(BTreeMap::from([(
						POD_GROUP_LABEL.to_string(),
						POD_GROUP_SNAPSHOT.to_string(),
					)])),
					match_expressions: None,
				}),
				..Default::default()
			}]),
			node_selector: Some(node_selector),
			os: Some(PodOS {
				name: params.node_os.as_str().to_string(),
			}),
			affinity: params
				.affinity
				.as_ref()
				.and_then(|a| to_system_affinity(std::slice::from_ref(a))),
			containers: vec![Container {
				name: container_name,
				image: Some(inherited.image.clone()),
				image_pull_policy: Some("Never".to_string()),
				command: Some(command.to_vec()),
				args: Some(args),
				volume_mounts: Some(volume_mounts),
				volume_devices: (!volume_devices.is_empty()).then_some(volume_devices),
				env: Some(inherited.env.clone()),
				env_from: Some(inherited.env_from.clone()),
				resources: Some(params.resources.clone()),
				..Default::default()
			}],
			service_account_name: inherited.service_account.clone(),
			termination_grace_period_seconds: Some(0),
			volumes: Some(volumes),
			restart_policy: Some("Never".to_string()),
			security_context: Some(security_context),
			tolerations: (!tolerations.is_empty()).then_some(tolerations),
			dns_policy: inherited.dns_policy.clone(),
			dns_config: inherited.dns_config.clone(),
			..Default::default()
		}),
		status: None,
	}
}
