// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end behaviour of the CSI snapshot exposer against the in-memory
//! object store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::DaemonSetSpec;
use k8s_openapi::api::core::v1::{PersistentVolumeClaimSpec, PodStatus, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use loom_backup_exposer::{
	AccessMode, BackupPvcConfig, CsiSnapshotExposeParams, CsiSnapshotExposeWaitParams,
	CsiSnapshotExposer, DaemonSetNodeAgent, ExposeError, Exposer, ExposerConfig, NodeOs, OwnerRef,
	PodHealthPolicy,
};
use loom_backup_k8s::{
	Container, DaemonSet, DeletionPolicy, FakeK8sClient, FakeOp, K8sClient, NodeScopedClient,
	ObjectMeta, ObjectReference, PersistentVolumeClaim, Pod, PodSpec, Volume, VolumeSnapshot,
	VolumeSnapshotContent, VolumeSnapshotContentSource, VolumeSnapshotContentSpec,
	VolumeSnapshotContentStatus, VolumeSnapshotSource, VolumeSnapshotSpec, VolumeSnapshotStatus,
};

const OWNER_NS: &str = "loom-backup";
const OWNER_NAME: &str = "backup-7f3a";
const OWNER_UID: &str = "0d9c1e2f-5b7a-4c1e-9f0a-3e2d1c4b5a69";
const SOURCE_NS: &str = "app-ns";
const SOURCE_VS: &str = "snap-db-1";
const SOURCE_VSC: &str = "snapcontent-1";

fn owner() -> OwnerRef {
	OwnerRef {
		namespace: OWNER_NS.to_string(),
		name: OWNER_NAME.to_string(),
		uid: OWNER_UID.to_string(),
		kind: "DataUpload".to_string(),
		api_version: "loom.dev/v1".to_string(),
	}
}

fn source_snapshot(restore_size: Option<&str>) -> VolumeSnapshot {
	let mut vs = VolumeSnapshot::new(
		SOURCE_VS,
		VolumeSnapshotSpec {
			source: VolumeSnapshotSource {
				persistent_volume_claim_name: Some("db-data".to_string()),
				volume_snapshot_content_name: None,
			},
			volume_snapshot_class_name: Some("csi-aws".to_string()),
		},
	);
	vs.metadata.annotations = Some(BTreeMap::from([(
		"loom.dev/backup".to_string(),
		"nightly".to_string(),
	)]));
	vs.status = Some(VolumeSnapshotStatus {
		bound_volume_snapshot_content_name: Some(SOURCE_VSC.to_string()),
		ready_to_use: Some(true),
		restore_size: restore_size.map(|s| Quantity(s.to_string())),
		..Default::default()
	});
	vs
}

fn source_content() -> VolumeSnapshotContent {
	let mut vsc = VolumeSnapshotContent::new(
		SOURCE_VSC,
		VolumeSnapshotContentSpec {
			volume_snapshot_ref: ObjectReference {
				name: Some(SOURCE_VS.to_string()),
				namespace: Some(SOURCE_NS.to_string()),
				..Default::default()
			},
			deletion_policy: DeletionPolicy::Delete,
			driver: "ebs.csi.aws.com".to_string(),
			source: VolumeSnapshotContentSource {
				volume_handle: Some("vol-0123".to_string()),
				snapshot_handle: None,
			},
			volume_snapshot_class_name: Some("csi-aws".to_string()),
		},
	);
	vsc.status = Some(VolumeSnapshotContentStatus {
		snapshot_handle: Some("snap-0abc".to_string()),
		ready_to_use: Some(true),
		..Default::default()
	});
	vsc
}

fn node_agent_daemonset(name: &str, image: &str) -> DaemonSet {
	DaemonSet {
		metadata: ObjectMeta {
			name: Some(name.to_string()),
			..Default::default()
		},
		spec: Some(DaemonSetSpec {
			template: PodTemplateSpec {
				metadata: None,
				spec: Some(PodSpec {
					containers: vec![Container {
						name: "node-agent".to_string(),
						image: Some(image.to_string()),
						args: Some(vec![
							"node-agent".to_string(),
							"server".to_string(),
							"--log-level=debug".to_string(),
						]),
						..Default::default()
					}],
					service_account_name: Some("loom-backup".to_string()),
					..Default::default()
				}),
			},
			..Default::default()
		}),
		status: None,
	}
}

struct Harness {
	client: Arc<FakeK8sClient>,
	exposer: CsiSnapshotExposer,
}

impl Harness {
	fn new() -> Self {
		Self::with_restore_size(Some("12Gi"))
	}

	fn with_restore_size(restore_size: Option<&str>) -> Self {
		let client = Arc::new(FakeK8sClient::new());
		client.set_auto_bind_pvcs(true);
		client.insert_volume_snapshot(SOURCE_NS, source_snapshot(restore_size));
		client.insert_snapshot_content(source_content());
		client.insert_daemonset(
			OWNER_NS,
			node_agent_daemonset("node-agent", "ghcr.io/loom/backup:1.4.0"),
		);
		client.insert_daemonset(
			OWNER_NS,
			node_agent_daemonset("node-agent-windows", "ghcr.io/loom/backup:1.4.0-windows"),
		);

		let config = ExposerConfig {
			poll_interval: Duration::from_millis(5),
			cleanup_timeout: Duration::from_millis(200),
			health: PodHealthPolicy::default(),
			..Default::default()
		};
		let node_agent = Arc::new(DaemonSetNodeAgent::new(client.clone()));
		let exposer = CsiSnapshotExposer::new(client.clone(), node_agent, config);
		Self { client, exposer }
	}

	fn params(&self) -> CsiSnapshotExposeParams {
		CsiSnapshotExposeParams {
			snapshot_name: SOURCE_VS.to_string(),
			source_namespace: SOURCE_NS.to_string(),
			access_mode: AccessMode::FileSystem,
			storage_class: "gp3".to_string(),
			hosting_pod_labels: BTreeMap::from([("loom.dev/data-upload".to_string(), OWNER_NAME.to_string())]),
			operation_timeout: Duration::from_secs(1),
			expose_timeout: Duration::from_secs(1),
			volume_size: Quantity("10Gi".to_string()),
			node_os: NodeOs::Linux,
			..Default::default()
		}
	}

	fn wait_params(&self) -> CsiSnapshotExposeWaitParams {
		CsiSnapshotExposeWaitParams {
			node_client: self.client.clone() as Arc<dyn K8sClient>,
			node_name: "node-a".to_string(),
		}
	}

	fn pvc(&self) -> PersistentVolumeClaim {
		self.client.pvc(OWNER_NAME, OWNER_NS).expect("backup pvc exists")
	}

	fn pod(&self) -> Pod {
		self.client.pod(OWNER_NAME, OWNER_NS).expect("backup pod exists")
	}

	fn requested_storage(&self) -> Quantity {
		self.pvc()
			.spec
			.and_then(|s| s.resources)
			.and_then(|r| r.requests)
			.and_then(|r| r.get("storage").cloned())
			.expect("storage request")
	}
}

fn source_objects() -> Vec<String> {
	vec![
		format!("VolumeSnapshot {SOURCE_NS}/{SOURCE_VS}"),
		format!("VolumeSnapshotContent {SOURCE_VSC}"),
	]
}

#[tokio::test]
async fn expose_creates_hosting_objects_and_consumes_source() {
	let h = Harness::new();
	h.exposer.expose(&owner(), &h.params()).await.unwrap();

	assert!(h.client.volume_snapshot(SOURCE_VS, SOURCE_NS).is_none());
	assert!(h.client.snapshot_content(SOURCE_VSC).is_none());

	let backup_vs = h.client.volume_snapshot(OWNER_NAME, OWNER_NS).unwrap();
	assert_eq!(
		backup_vs.spec.source.volume_snapshot_content_name.as_deref(),
		Some(OWNER_NAME)
	);
	assert_eq!(backup_vs.spec.volume_snapshot_class_name.as_deref(), Some("csi-aws"));
	assert!(backup_vs.metadata.owner_references.is_none());

	let backup_vsc = h.client.snapshot_content(OWNER_NAME).unwrap();
	assert_eq!(backup_vsc.spec.deletion_policy, DeletionPolicy::Retain);
	assert_eq!(backup_vsc.spec.source.snapshot_handle.as_deref(), Some("snap-0abc"));
	assert_eq!(backup_vsc.spec.driver, "ebs.csi.aws.com");
	assert_eq!(backup_vsc.spec.volume_snapshot_ref.uid, backup_vs.metadata.uid);

	// The snapshot's restore size wins over the smaller requested size.
	assert_eq!(h.requested_storage(), Quantity("12Gi".to_string()));
	let pvc_spec = h.pvc().spec.unwrap();
	assert_eq!(pvc_spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));
	assert_eq!(pvc_spec.storage_class_name.as_deref(), Some("gp3"));
	assert_eq!(pvc_spec.data_source.unwrap().name, OWNER_NAME);

	let pod = h.pod();
	let spec = pod.spec.unwrap();
	let container = &spec.containers[0];
	assert_eq!(container.name, OWNER_UID);
	assert_eq!(container.image.as_deref(), Some("ghcr.io/loom/backup:1.4.0"));
	assert_eq!(
		container.command.clone().unwrap(),
		vec!["/loom-backup", "data-mover", "backup"]
	);
	let args = container.args.clone().unwrap();
	assert!(args.contains(&format!("--data-upload={OWNER_NAME}")));
	assert!(args.contains(&"--resource-timeout=1s".to_string()));
	assert_eq!(args.last().map(String::as_str), Some("--log-level=debug"));
	assert_eq!(spec.service_account_name.as_deref(), Some("loom-backup"));
	assert_eq!(
		spec.node_selector.unwrap().get("kubernetes.io/os").map(String::as_str),
		Some("linux")
	);
}

#[tokio::test]
async fn missing_restore_size_falls_back_to_volume_size() {
	for restore_size in [None, Some("0")] {
		let h = Harness::with_restore_size(restore_size);
		h.exposer.expose(&owner(), &h.params()).await.unwrap();
		assert_eq!(h.requested_storage(), Quantity("10Gi".to_string()));
	}
}

#[tokio::test]
async fn source_content_is_retained_before_any_delete() {
	let h = Harness::new();
	h.exposer.expose(&owner(), &h.params()).await.unwrap();

	let deleted = h.client.deleted_snapshot_contents();
	assert!(!deleted.is_empty());
	assert!(deleted
		.iter()
		.all(|vsc| vsc.spec.deletion_policy == DeletionPolicy::Retain));

	let journal = h.client.journal();
	let position = |entry: &str| journal.iter().position(|e| e == entry).unwrap();
	let patch = position(&format!("PatchSnapshotContent {SOURCE_VSC}"));
	let delete_vs = position(&format!("DeleteVolumeSnapshot {SOURCE_VS}"));
	let delete_vsc = position(&format!("DeleteSnapshotContent {SOURCE_VSC}"));
	assert!(patch < delete_vs);
	assert!(delete_vs < delete_vsc);
}

async fn expose_failing_at(op: FakeOp) -> (ExposeError, Vec<String>) {
	let h = Harness::new();
	h.client.fail(op);
	let err = h.exposer.expose(&owner(), &h.params()).await.unwrap_err();
	h.client.clear_failures();
	(err, h.client.object_names())
}

#[tokio::test]
async fn failure_before_clone_leaves_source_untouched() {
	let (err, objects) = expose_failing_at(FakeOp::CreateVolumeSnapshot).await;
	assert!(err.to_string().starts_with("create backup volume snapshot: "));
	assert_eq!(objects, source_objects());
}

#[tokio::test]
async fn failed_content_creation_removes_backup_snapshot() {
	let (err, objects) = expose_failing_at(FakeOp::CreateSnapshotContent).await;
	assert!(err.to_string().starts_with("create backup volume snapshot content: "));
	assert_eq!(objects, source_objects());
}

#[tokio::test]
async fn failed_retain_keeps_source_snapshot() {
	let h = Harness::new();
	h.client.fail(FakeOp::PatchSnapshotContent);
	let err = h.exposer.expose(&owner(), &h.params()).await.unwrap_err();

	assert!(err.to_string().starts_with("retain volume snapshot content: "));
	assert!(h.client.volume_snapshot(SOURCE_VS, SOURCE_NS).is_some());
	assert!(h.client.volume_snapshot(OWNER_NAME, OWNER_NS).is_none());
	assert_eq!(
		h.client.snapshot_content(SOURCE_VSC).unwrap().spec.deletion_policy,
		DeletionPolicy::Delete
	);
	assert!(h.client.deleted_snapshot_contents().is_empty());
}

#[tokio::test]
async fn failed_source_snapshot_delete_keeps_retained_content() {
	let h = Harness::new();
	h.client.fail_named(FakeOp::DeleteVolumeSnapshot, SOURCE_VS);
	let err = h.exposer.expose(&owner(), &h.params()).await.unwrap_err();
	h.client.clear_failures();

	assert!(err.to_string().starts_with("delete volume snapshot: "));
	assert!(h.client.volume_snapshot(OWNER_NAME, OWNER_NS).is_none());
	assert_eq!(
		h.client.object_names(),
		vec![
			format!("VolumeSnapshot {SOURCE_NS}/{SOURCE_VS}"),
			format!("VolumeSnapshotContent {OWNER_NAME}"),
			format!("VolumeSnapshotContent {SOURCE_VSC}"),
		]
	);
	assert_eq!(
		h.client.snapshot_content(SOURCE_VSC).unwrap().spec.deletion_policy,
		DeletionPolicy::Retain
	);
}

#[tokio::test]
async fn failed_source_content_delete_keeps_retained_content() {
	let h = Harness::new();
	h.client.fail_named(FakeOp::DeleteSnapshotContent, SOURCE_VSC);
	let err = h.exposer.expose(&owner(), &h.params()).await.unwrap_err();
	h.client.clear_failures();

	assert!(err.to_string().starts_with("delete volume snapshot content: "));
	assert!(h.client.volume_snapshot(OWNER_NAME, OWNER_NS).is_none());
	assert!(h.client.volume_snapshot(SOURCE_VS, SOURCE_NS).is_none());
	assert_eq!(
		h.client.object_names(),
		vec![
			format!("VolumeSnapshotContent {OWNER_NAME}"),
			format!("VolumeSnapshotContent {SOURCE_VSC}"),
		]
	);
	assert_eq!(
		h.client.snapshot_content(SOURCE_VSC).unwrap().spec.deletion_policy,
		DeletionPolicy::Retain
	);
}

#[tokio::test]
async fn failed_claim_creation_leaves_only_backup_content() {
	let (err, objects) = expose_failing_at(FakeOp::CreatePvc).await;
	assert!(err.to_string().starts_with("create backup pvc: "));
	assert_eq!(objects, vec![format!("VolumeSnapshotContent {OWNER_NAME}")]);
}

#[tokio::test]
async fn missing_node_agent_rolls_back_claim_and_volume() {
	let (err, objects) = expose_failing_at(FakeOp::GetDaemonSet).await;
	assert!(err.to_string().starts_with("get node-agent pod info: "));
	assert_eq!(objects, vec![format!("VolumeSnapshotContent {OWNER_NAME}")]);
}

#[tokio::test]
async fn failed_pod_creation_rolls_back_everything_but_content() {
	let (err, objects) = expose_failing_at(FakeOp::CreatePod).await;
	assert!(!err.is_retryable());
	assert_eq!(objects, vec![format!("VolumeSnapshotContent {OWNER_NAME}")]);
}

#[tokio::test]
async fn unready_snapshot_times_out_without_side_effects() {
	let h = Harness::new();
	h.client.update_volume_snapshot(SOURCE_VS, SOURCE_NS, |vs| {
		if let Some(status) = vs.status.as_mut() {
			status.ready_to_use = Some(false);
		}
	});
	let mut params = h.params();
	params.expose_timeout = Duration::from_millis(30);

	let err = h.exposer.expose(&owner(), &params).await.unwrap_err();
	assert!(err.is_retryable());
	assert_eq!(h.client.object_names(), source_objects());
}

#[tokio::test]
async fn elapsed_deadline_stops_expose() {
	let h = Harness::new();
	h.client.update_volume_snapshot(SOURCE_VS, SOURCE_NS, |vs| {
		if let Some(status) = vs.status.as_mut() {
			status.ready_to_use = Some(false);
		}
	});
	let mut params = h.params();
	params.expose_timeout = Duration::from_secs(30);
	params.deadline = Some(tokio::time::Instant::now() + Duration::from_millis(30));

	let started = tokio::time::Instant::now();
	let err = h.exposer.expose(&owner(), &params).await.unwrap_err();
	assert!(started.elapsed() < Duration::from_secs(5));
	assert!(err.is_retryable());
	assert!(err.to_string().starts_with("wait volume snapshot ready: "));
	assert_eq!(h.client.object_names(), source_objects());
}

#[tokio::test]
async fn read_only_config_remaps_claim_and_skips_relabel() {
	let h = Harness::new();
	let mut params = h.params();
	params.backup_pvc_config = HashMap::from([(
		"gp3".to_string(),
		BackupPvcConfig {
			storage_class: "gp3-ro".to_string(),
			read_only: true,
			spc_no_relabeling: true,
		},
	)]);
	h.exposer.expose(&owner(), &params).await.unwrap();

	let pvc_spec = h.pvc().spec.unwrap();
	assert_eq!(pvc_spec.access_modes, Some(vec!["ReadOnlyMany".to_string()]));
	assert_eq!(pvc_spec.storage_class_name.as_deref(), Some("gp3-ro"));

	let spec = h.pod().spec.unwrap();
	let security = spec.security_context.unwrap();
	assert_eq!(
		security.se_linux_options.and_then(|o| o.type_).as_deref(),
		Some("spc_t")
	);
	let mount = &spec.containers[0].volume_mounts.as_ref().unwrap()[0];
	assert_eq!(mount.read_only, Some(true));
}

#[tokio::test]
async fn block_access_mode_attaches_device() {
	let h = Harness::new();
	let mut params = h.params();
	params.access_mode = AccessMode::Block;
	h.exposer.expose(&owner(), &params).await.unwrap();

	assert_eq!(h.pvc().spec.unwrap().volume_mode.as_deref(), Some("Block"));
	let container = h.pod().spec.unwrap().containers.remove(0);
	let devices = container.volume_devices.unwrap();
	assert_eq!(devices[0].device_path, format!("/{OWNER_UID}"));
	assert!(container
		.args
		.unwrap()
		.contains(&"--volume-mode=Block".to_string()));
}

#[tokio::test]
async fn windows_exposure_uses_windows_node_agent() {
	let h = Harness::new();
	let mut params = h.params();
	params.node_os = NodeOs::Windows;
	h.exposer.expose(&owner(), &params).await.unwrap();

	let spec = h.pod().spec.unwrap();
	assert_eq!(
		spec.containers[0].image.as_deref(),
		Some("ghcr.io/loom/backup:1.4.0-windows")
	);
	assert_eq!(spec.os.unwrap().name, "windows");
	let toleration = &spec.tolerations.unwrap()[0];
	assert_eq!(toleration.key.as_deref(), Some("os"));
	assert_eq!(toleration.value.as_deref(), Some("windows"));
}

#[tokio::test]
async fn get_exposed_returns_hosting_pod() {
	let h = Harness::new();
	h.exposer.expose(&owner(), &h.params()).await.unwrap();

	let result = h
		.exposer
		.get_exposed(&owner(), Duration::from_millis(100), &h.wait_params())
		.await
		.unwrap()
		.expect("pod is visible on this node");
	assert_eq!(result.by_pod.hosting_container, OWNER_UID);
	assert_eq!(result.by_pod.volume_name, OWNER_UID);
	assert_eq!(result.by_pod.node_os.as_deref(), Some("linux"));
	assert_eq!(
		result.by_pod.hosting_pod.metadata.name.as_deref(),
		Some(OWNER_NAME)
	);
}

#[tokio::test]
async fn unbounded_timeouts_do_not_overflow() {
	let h = Harness::new();
	let mut params = h.params();
	params.expose_timeout = Duration::MAX;
	params.operation_timeout = Duration::MAX;
	h.exposer.expose(&owner(), &params).await.unwrap();

	let result = h
		.exposer
		.get_exposed(&owner(), Duration::MAX, &h.wait_params())
		.await
		.unwrap();
	assert!(result.is_some());

	let result = h
		.exposer
		.get_exposed(&owner(), Duration::from_secs(u64::MAX), &h.wait_params())
		.await
		.unwrap();
	assert!(result.is_some());
}

#[tokio::test]
async fn get_exposed_distinguishes_absent_from_unreachable() {
	let h = Harness::new();
	let other_node = Arc::new(FakeK8sClient::new());
	let params = CsiSnapshotExposeWaitParams {
		node_client: other_node.clone(),
		node_name: "node-b".to_string(),
	};

	let result = h
		.exposer
		.get_exposed(&owner(), Duration::from_millis(50), &params)
		.await
		.unwrap();
	assert!(result.is_none());

	other_node.set_unavailable(true);
	let err = h
		.exposer
		.get_exposed(&owner(), Duration::from_millis(50), &params)
		.await
		.unwrap_err();
	assert!(matches!(err.root(), ExposeError::K8s(_)));
}

#[tokio::test]
async fn node_scoped_client_only_sees_pods_on_its_node() {
	let h = Harness::new();
	h.exposer.expose(&owner(), &h.params()).await.unwrap();
	h.client.update_pod(OWNER_NAME, OWNER_NS, |pod| {
		if let Some(spec) = pod.spec.as_mut() {
			spec.node_name = Some("node-a".to_string());
		}
	});

	let scoped = |node: &str| CsiSnapshotExposeWaitParams {
		node_client: Arc::new(NodeScopedClient::new(h.client.clone(), node)),
		node_name: node.to_string(),
	};

	let result = h
		.exposer
		.get_exposed(&owner(), Duration::from_millis(50), &scoped("node-b"))
		.await
		.unwrap();
	assert!(result.is_none());

	let result = h
		.exposer
		.get_exposed(&owner(), Duration::from_millis(100), &scoped("node-a"))
		.await
		.unwrap()
		.expect("pod is visible on its own node");
	assert_eq!(
		result.by_pod.hosting_pod.metadata.name.as_deref(),
		Some(OWNER_NAME)
	);
}

#[tokio::test]
async fn get_exposed_requires_backup_volume_in_pod() {
	let h = Harness::new();
	h.client.insert_pod(
		OWNER_NS,
		Pod {
			metadata: ObjectMeta {
				name: Some(OWNER_NAME.to_string()),
				..Default::default()
			},
			spec: Some(PodSpec {
				volumes: Some(vec![Volume {
					name: "unrelated".to_string(),
					..Default::default()
				}]),
				..Default::default()
			}),
			status: None,
		},
	);
	h.client
		.create_pvc(
			OWNER_NS,
			PersistentVolumeClaim {
				metadata: ObjectMeta {
					name: Some(OWNER_NAME.to_string()),
					..Default::default()
				},
				spec: Some(PersistentVolumeClaimSpec::default()),
				status: None,
			},
		)
		.await
		.unwrap();

	let err = h
		.exposer
		.get_exposed(&owner(), Duration::from_millis(50), &h.wait_params())
		.await
		.unwrap_err();
	assert!(matches!(err, ExposeError::Invariant(_)));
}

#[tokio::test]
async fn get_exposed_times_out_on_unbound_claim() {
	let h = Harness::new();
	h.client.set_auto_bind_pvcs(false);
	h.exposer.expose(&owner(), &h.params()).await.unwrap();

	let err = h
		.exposer
		.get_exposed(&owner(), Duration::from_millis(30), &h.wait_params())
		.await
		.unwrap_err();
	assert!(err.is_retryable());
}

#[tokio::test]
async fn clean_up_is_idempotent_and_keeps_backup_content() {
	let h = Harness::new();
	h.exposer.expose(&owner(), &h.params()).await.unwrap();

	h.exposer.clean_up(&owner(), SOURCE_VS, SOURCE_NS).await;
	let after_first = h.client.object_names();
	assert_eq!(after_first, vec![format!("VolumeSnapshotContent {OWNER_NAME}")]);

	h.exposer.clean_up(&owner(), SOURCE_VS, SOURCE_NS).await;
	assert_eq!(h.client.object_names(), after_first);
}

#[tokio::test]
async fn clean_up_swallows_store_failures() {
	let h = Harness::new();
	h.exposer.expose(&owner(), &h.params()).await.unwrap();
	h.client.fail(FakeOp::DeletePod);

	h.exposer.clean_up(&owner(), SOURCE_VS, SOURCE_NS).await;
	assert!(h.client.pod(OWNER_NAME, OWNER_NS).is_some());
	assert!(h.client.pvc(OWNER_NAME, OWNER_NS).is_none());
	assert!(h.client.volume_snapshot(OWNER_NAME, OWNER_NS).is_none());
}

#[tokio::test]
async fn peek_reports_only_unrecoverable_pods() {
	let h = Harness::new();
	h.exposer.peek_exposed(&owner()).await.unwrap();

	h.exposer.expose(&owner(), &h.params()).await.unwrap();
	h.exposer.peek_exposed(&owner()).await.unwrap();

	h.client.update_pod(OWNER_NAME, OWNER_NS, |pod| {
		pod.status = Some(PodStatus {
			phase: Some("Failed".to_string()),
			message: Some("node lost".to_string()),
			..Default::default()
		});
	});
	let err = h.exposer.peek_exposed(&owner()).await.unwrap_err();
	assert!(matches!(err, ExposeError::PodUnrecoverable(ref m) if m.contains("node lost")));

	h.client.set_unavailable(true);
	h.exposer.peek_exposed(&owner()).await.unwrap();
}

#[tokio::test]
async fn diagnose_reports_missing_objects() {
	let h = Harness::new();
	let diag = h.exposer.diagnose_expose(&owner()).await;

	assert!(diag.starts_with("begin diagnose CSI exposer\n"));
	assert!(diag.ends_with("end diagnose CSI exposer"));
	assert!(diag.contains(&format!("error getting backup pod {OWNER_NAME}, err: ")));
	assert!(diag.contains(&format!("error getting backup pvc {OWNER_NAME}, err: ")));
	assert!(diag.contains(&format!("error getting backup vs {OWNER_NAME}, err: ")));
}

#[tokio::test]
async fn diagnose_describes_exposed_objects() {
	let h = Harness::new();
	h.exposer.expose(&owner(), &h.params()).await.unwrap();
	h.client.update_pod(OWNER_NAME, OWNER_NS, |pod| {
		if let Some(spec) = pod.spec.as_mut() {
			spec.node_name = Some("node-a".to_string());
		}
		pod.status = Some(PodStatus {
			phase: Some("Pending".to_string()),
			..Default::default()
		});
	});
	h.client.update_volume_snapshot(OWNER_NAME, OWNER_NS, |vs| {
		vs.status = Some(VolumeSnapshotStatus {
			bound_volume_snapshot_content_name: Some(OWNER_NAME.to_string()),
			ready_to_use: Some(true),
			..Default::default()
		});
	});

	let diag = h.exposer.diagnose_expose(&owner()).await;
	let lines: Vec<&str> = diag.lines().collect();
	assert_eq!(lines.first(), Some(&"begin diagnose CSI exposer"));
	assert_eq!(lines.last(), Some(&"end diagnose CSI exposer"));
	assert!(diag.contains(&format!(
		"Pod {OWNER_NS}/{OWNER_NAME}, phase Pending, node name node-a\n"
	)));
	assert!(diag.contains("node-agent is not running in node node-a, err: "));
	assert!(diag.contains(&format!("PVC {OWNER_NS}/{OWNER_NAME}, phase Bound, binding to pvc-")));
	assert!(diag.contains("PV pvc-"));
	assert!(diag.contains(&format!(
		"VS {OWNER_NS}/{OWNER_NAME}, bind to {OWNER_NAME}, readyToUse true, errMessage \n"
	)));
	assert!(diag.contains(&format!(
		"VSC {OWNER_NAME}, readyToUse false, errMessage , handle \n"
	)));
}
