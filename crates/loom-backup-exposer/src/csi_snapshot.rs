// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exposure of CSI volume snapshots.
//!
//! The source snapshot is decoupled from the workload namespace by cloning its
//! storage handle into an owner-named snapshot/content pair, restoring that
//! into an intermediate claim, and mounting the claim into a hosting pod that
//! runs the data mover.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use loom_backup_k8s::{K8sClient, ResourceRequirements};
use tokio::time::Instant;
use tracing::instrument;

use crate::builders::{
	build_backup_pod, build_backup_pvc, build_backup_snapshot_content, build_backup_volume_snapshot,
	quantity_is_zero, resolve_claim_settings,
};
use crate::cleanup::{delete_pod_if_any, delete_pv_and_pvc_if_any, delete_volume_snapshot_if_any};
use crate::config::ExposerConfig;
use crate::diagnose::{
	diagnose_pod, diagnose_pv, diagnose_pvc, diagnose_snapshot_content, diagnose_volume_snapshot,
};
use crate::error::{ExposeError, StepContext};
use crate::exposer::Exposer;
use crate::health::{classify_pod, PodHealth};
use crate::node_agent::NodeAgent;
use crate::rollback::{Compensation, Rollback};
use crate::types::{
	AccessMode, BackupPvcConfig, ExposeByPod, ExposeResult, LoadAffinity, NodeOs, OwnerRef,
	NODE_OS_LABEL,
};
use crate::wait::{
	ensure_delete_snapshot_content, ensure_delete_volume_snapshot, retain_snapshot_content,
	wait_pvc_bound, wait_volume_snapshot_ready,
};

/// Input of [`CsiSnapshotExposer::expose`].
#[derive(Debug, Clone, Default)]
pub struct CsiSnapshotExposeParams {
	/// Name of the source snapshot
	pub snapshot_name: String,
	/// Namespace of the source snapshot
	pub source_namespace: String,
	pub access_mode: AccessMode,
	/// Storage class of the source volume
	pub storage_class: String,
	pub hosting_pod_labels: BTreeMap<String, String>,
	pub hosting_pod_annotations: BTreeMap<String, String>,
	pub affinity: Option<LoadAffinity>,
	/// Claim overrides keyed by source storage class
	pub backup_pvc_config: HashMap<String, BackupPvcConfig>,
	/// Resources of the hosting pod's container
	pub resources: ResourceRequirements,
	/// Bound on each create/delete wait, also passed to the data mover
	pub operation_timeout: Duration,
	/// Bound on waiting for the source snapshot to become ready
	pub expose_timeout: Duration,
	/// Size of the source volume, used when the snapshot reports none
	pub volume_size: Quantity,
	pub node_os: NodeOs,
	/// Overall deadline for the whole expose
	pub deadline: Option<Instant>,
}

/// Input of [`CsiSnapshotExposer::get_exposed`].
#[derive(Clone)]
pub struct CsiSnapshotExposeWaitParams {
	/// Client that only sees pods on the calling node
	pub node_client: Arc<dyn K8sClient>,
	pub node_name: String,
}

/// [`Exposer`] for CSI volume snapshots.
pub struct CsiSnapshotExposer {
	client: Arc<dyn K8sClient>,
	node_agent: Arc<dyn NodeAgent>,
	config: ExposerConfig,
}

impl CsiSnapshotExposer {
	pub fn new(
		client: Arc<dyn K8sClient>,
		node_agent: Arc<dyn NodeAgent>,
		config: ExposerConfig,
	) -> Self {
		Self {
			client,
			node_agent,
			config,
		}
	}

	async fn expose_steps(
		&self,
		owner: &OwnerRef,
		params: &CsiSnapshotExposeParams,
		rollback: &mut Rollback<'_>,
	) -> Result<(), ExposeError> {
		let client = self.client.as_ref();
		let interval = self.config.poll_interval;
		let deadline = params.deadline;

		let source_vs = run_step(
			deadline,
			"wait volume snapshot ready",
			wait_volume_snapshot_ready(
				client,
				&params.snapshot_name,
				&params.source_namespace,
				params.expose_timeout,
				interval,
			),
		)
		.await?;
		tracing::info!(owner = %owner.name, snapshot = %params.snapshot_name, "Volume snapshot is ready");

		let source_vsc = run_step(deadline, "get volume snapshot content", async {
			let bound = source_vs
				.status
				.as_ref()
				.and_then(|s| s.bound_volume_snapshot_content_name.as_deref())
				.filter(|n| !n.is_empty())
				.ok_or_else(|| ExposeError::MissingContent {
					snapshot: params.snapshot_name.clone(),
				})?;
			client
				.get_snapshot_content(bound)
				.await
				.map_err(ExposeError::from)
		})
		.await?;
		let source_vsc_name = source_vsc.metadata.name.clone().unwrap_or_default();
		tracing::info!(
			owner = %owner.name,
			vs = %params.snapshot_name,
			vsc = %source_vsc_name,
			namespace = %params.source_namespace,
			"Got snapshot content bound to volume snapshot"
		);

		let backup_vs = run_step(deadline, "create backup volume snapshot", async {
			let vs = build_backup_volume_snapshot(owner, &source_vs);
			client
				.create_volume_snapshot(&owner.namespace, vs)
				.await
				.map_err(ExposeError::from)
		})
		.await?;
		tracing::info!(owner = %owner.name, vs = %owner.name, "Backup volume snapshot is created");

		rollback.push(Compensation::DeleteVolumeSnapshot {
			name: owner.name.clone(),
			namespace: owner.namespace.clone(),
		});

		run_step(deadline, "create backup volume snapshot content", async {
			let vsc = build_backup_snapshot_content(owner, &source_vsc, &backup_vs)?;
			client
				.create_snapshot_content(vsc)
				.await
				.map_err(ExposeError::from)
		})
		.await?;
		tracing::info!(owner = %owner.name, vsc = %owner.name, source_vsc = %source_vsc_name, "Backup snapshot content is created");

		let retained = run_step(
			deadline,
			"retain volume snapshot content",
			retain_snapshot_content(client, &source_vsc),
		)
		.await?;
		tracing::info!(owner = %owner.name, vsc = %source_vsc_name, retained = retained.is_some(), "Finished retaining snapshot content");

		// The source content is retained, so removing it keeps the storage snapshot.
		run_step(
			deadline,
			"delete volume snapshot",
			ensure_delete_volume_snapshot(
				client,
				&params.snapshot_name,
				&params.source_namespace,
				params.operation_timeout,
				interval,
			),
		)
		.await?;
		tracing::info!(owner = %owner.name, vs = %params.snapshot_name, namespace = %params.source_namespace, "Source volume snapshot is deleted");

		run_step(
			deadline,
			"delete volume snapshot content",
			ensure_delete_snapshot_content(client, &source_vsc_name, params.operation_timeout, interval),
		)
		.await?;
		tracing::info!(owner = %owner.name, vsc = %source_vsc_name, "Source snapshot content is deleted");

		let restore_size = source_vs
			.status
			.as_ref()
			.and_then(|s| s.restore_size.clone())
			.filter(|q| !quantity_is_zero(q));
		let volume_size = match restore_size {
			Some(size) => size,
			None => {
				tracing::warn!(
					owner = %owner.name,
					vs = %params.snapshot_name,
					size = %params.volume_size.0,
					"Snapshot has no valid restore size, using source volume size"
				);
				params.volume_size.clone()
			}
		};

		let claim = resolve_claim_settings(&params.storage_class, &params.backup_pvc_config);
		if claim.ignored_relabel {
			tracing::warn!(owner = %owner.name, vs = %params.snapshot_name, "Ignoring SELinux relabel skipping for read-write volume");
		}

		let backup_pvc = run_step(deadline, "create backup pvc", async {
			let pvc = build_backup_pvc(owner, &claim, params.access_mode, volume_size);
			client
				.create_pvc(&owner.namespace, pvc)
				.await
				.map_err(ExposeError::from)
		})
		.await?;
		tracing::info!(owner = %owner.name, pvc = %owner.name, storage_class = %claim.storage_class, read_only = claim.read_only, "Backup PVC is created");

		rollback.push(Compensation::DeletePvAndPvc {
			name: owner.name.clone(),
			namespace: owner.namespace.clone(),
		});

		let inherited = run_step(deadline, "get node-agent pod info", async {
			self
				.node_agent
				.inherited_pod_info(&owner.namespace, params.node_os)
				.await
				.map_err(ExposeError::from)
		})
		.await?;

		let backup_pod = run_step(deadline, "create backup pod", async {
			let pod = build_backup_pod(
				owner,
				params,
				&claim,
				&backup_pvc,
				&inherited,
				&self.config.data_mover_command,
			);
			client
				.create_pod(&owner.namespace, pod)
				.await
				.map_err(ExposeError::from)
		})
		.await?;
		tracing::info!(
			owner = %owner.name,
			pod = %backup_pod.metadata.name.as_deref().unwrap_or_default(),
			affinity = ?params.affinity,
			"Backup pod is created"
		);

		rollback.push(Compensation::DeletePod {
			name: owner.name.clone(),
			namespace: owner.namespace.clone(),
		});

		Ok(())
	}
}

/// Run one expose step, bounded by the caller's deadline when one is set.
async fn run_step<T, F>(
	deadline: Option<Instant>,
	step: &'static str,
	fut: F,
) -> Result<T, ExposeError>
where
	F: Future<Output = Result<T, ExposeError>>,
{
	let result = match deadline {
		Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
			Ok(result) => result,
			Err(_) => Err(ExposeError::Timeout {
				what: "expose deadline".to_string(),
			}),
		},
		None => fut.await,
	};
	result.step(step)
}

#[async_trait]
impl Exposer for CsiSnapshotExposer {
	type Params = CsiSnapshotExposeParams;
	type WaitParams = CsiSnapshotExposeWaitParams;

	#[instrument(skip(self, owner, params), fields(owner = %owner.name, snapshot = %params.snapshot_name))]
	async fn expose(&self, owner: &OwnerRef, params: &Self::Params) -> Result<(), ExposeError> {
		tracing::info!("Exposing CSI snapshot");

		let mut rollback = Rollback::new(self.client.as_ref());
		match self.expose_steps(owner, params, &mut rollback).await {
			Ok(()) => {
				rollback.commit();
				Ok(())
			}
			Err(e) => {
				tracing::warn!(owner = %owner.name, error = %e, "Expose failed, rolling back");
				rollback.unwind().await;
				Err(e)
			}
		}
	}

	async fn get_exposed(
		&self,
		owner: &OwnerRef,
		timeout: Duration,
		params: &Self::WaitParams,
	) -> Result<Option<ExposeResult>, ExposeError> {
		let pod = match params.node_client.get_pod(&owner.name, &owner.namespace).await {
			Ok(pod) => pod,
			Err(e) if e.is_not_found() => {
				tracing::debug!(owner = %owner.name, node = %params.node_name, "Backup pod is not running in the current node");
				return Ok(None);
			}
			Err(e) => return Err(e).step("get backup pod"),
		};
		let node = pod
			.spec
			.as_ref()
			.and_then(|s| s.node_name.clone())
			.unwrap_or_default();
		tracing::info!(owner = %owner.name, node = %node, "Backup pod is running");

		wait_pvc_bound(
			self.client.as_ref(),
			&owner.name,
			&owner.namespace,
			timeout,
			self.config.poll_interval,
		)
		.await
		.step("wait backup pvc bound")?;
		tracing::info!(owner = %owner.name, pvc = %owner.name, "Backup PVC is bound");

		let spec = pod.spec.as_ref();
		let has_volume = spec
			.and_then(|s| s.volumes.as_ref())
			.is_some_and(|volumes| volumes.iter().any(|v| v.name == owner.uid));
		if !has_volume {
			return Err(ExposeError::Invariant(format!(
				"backup pod {} doesn't have the expected backup volume",
				owner.name
			)));
		}

		let node_os = spec
			.and_then(|s| s.node_selector.as_ref())
			.and_then(|selector| selector.get(NODE_OS_LABEL).cloned());

		Ok(Some(ExposeResult {
			by_pod: ExposeByPod {
				hosting_pod: pod,
				hosting_container: owner.uid.clone(),
				volume_name: owner.uid.clone(),
				node_os,
			},
		}))
	}

	async fn peek_exposed(&self, owner: &OwnerRef) -> Result<(), ExposeError> {
		let pod = match self.client.get_pod(&owner.name, &owner.namespace).await {
			Ok(pod) => pod,
			Err(e) if e.is_not_found() => return Ok(()),
			Err(e) => {
				tracing::warn!(owner = %owner.name, error = %e, "Failed to peek backup pod");
				return Ok(());
			}
		};

		match classify_pod(&pod, Utc::now(), &self.config.health) {
			PodHealth::Healthy => Ok(()),
			PodHealth::Unrecoverable(message) => Err(ExposeError::PodUnrecoverable(message)),
		}
	}

	async fn diagnose_expose(&self, owner: &OwnerRef) -> String {
		let client = self.client.as_ref();
		let name = &owner.name;
		let namespace = &owner.namespace;

		let mut diag = String::from("begin diagnose CSI exposer\n");

		let pod = match client.get_pod(name, namespace).await {
			Ok(pod) => Some(pod),
			Err(e) => {
				diag.push_str(&format!("error getting backup pod {name}, err: {e}\n"));
				None
			}
		};
		let pvc = match client.get_pvc(name, namespace).await {
			Ok(pvc) => Some(pvc),
			Err(e) => {
				diag.push_str(&format!("error getting backup pvc {name}, err: {e}\n"));
				None
			}
		};
		let vs = match client.get_volume_snapshot(name, namespace).await {
			Ok(vs) => Some(vs),
			Err(e) => {
				diag.push_str(&format!("error getting backup vs {name}, err: {e}\n"));
				None
			}
		};

		if let Some(pod) = &pod {
			diag.push_str(&diagnose_pod(pod));
			let node = pod.spec.as_ref().and_then(|s| s.node_name.as_deref());
			if let Some(node) = node.filter(|n| !n.is_empty()) {
				if let Err(e) = self.node_agent.is_running_on_node(namespace, node).await {
					diag.push_str(&format!("node-agent is not running in node {node}, err: {e}\n"));
				}
			}
		}

		if let Some(pvc) = &pvc {
			diag.push_str(&diagnose_pvc(pvc));
			let volume = pvc.spec.as_ref().and_then(|s| s.volume_name.as_deref());
			if let Some(volume) = volume.filter(|v| !v.is_empty()) {
				match client.get_pv(volume).await {
					Ok(pv) => diag.push_str(&diagnose_pv(&pv)),
					Err(e) => diag.push_str(&format!("error getting backup pv {volume}, err: {e}\n")),
				}
			}
		}

		if let Some(vs) = &vs {
			diag.push_str(&diagnose_volume_snapshot(vs));
			let bound = vs
				.status
				.as_ref()
				.and_then(|s| s.bound_volume_snapshot_content_name.as_deref());
			if let Some(bound) = bound.filter(|b| !b.is_empty()) {
				match client.get_snapshot_content(bound).await {
					Ok(vsc) => diag.push_str(&diagnose_snapshot_content(&vsc)),
					Err(e) => diag.push_str(&format!("error getting backup vsc {bound}, err: {e}\n")),
				}
			}
		}

		diag.push_str("end diagnose CSI exposer");
		diag
	}

	#[instrument(skip(self, owner), fields(owner = %owner.name))]
	async fn clean_up(&self, owner: &OwnerRef, snapshot_name: &str, source_namespace: &str) {
		let client = self.client.as_ref();
		tracing::info!(owner = %owner.name, "Cleaning up CSI snapshot exposure");

		delete_pod_if_any(client, &owner.name, &owner.namespace).await;
		delete_pv_and_pvc_if_any(
			client,
			&owner.name,
			&owner.namespace,
			self.config.cleanup_timeout,
			self.config.poll_interval,
		)
		.await;
		delete_volume_snapshot_if_any(client, &owner.name, &owner.namespace).await;
		if !snapshot_name.is_empty() {
			delete_volume_snapshot_if_any(client, snapshot_name, source_namespace).await;
		}
	}
}
