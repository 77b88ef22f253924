// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use loom_backup_config::BackupConfig;
use loom_backup_exposer::{
	deadline_after, AccessMode, CsiSnapshotExposeParams, CsiSnapshotExposeWaitParams,
	CsiSnapshotExposer, Exposer, LoadAffinity, NodeOs, OwnerRef,
};
use loom_backup_k8s::{K8sClient, LabelSelector, NodeScopedClient, ResourceRequirements};
use tracing::instrument;

/// Identity of the operation that owns an exposure.
#[derive(Debug, Clone, Args)]
pub struct OwnerArgs {
	/// Namespace every derived object is created in
	#[arg(long)]
	pub owner_namespace: String,

	/// Name shared by every derived object
	#[arg(long)]
	pub owner_name: String,

	#[arg(long)]
	pub owner_uid: String,

	#[arg(long, default_value = "DataUpload")]
	pub owner_kind: String,

	#[arg(long, default_value = "backup.loom.dev/v1")]
	pub owner_api_version: String,
}

impl OwnerArgs {
	pub fn into_owner(self) -> OwnerRef {
		OwnerRef {
			namespace: self.owner_namespace,
			name: self.owner_name,
			uid: self.owner_uid,
			kind: self.owner_kind,
			api_version: self.owner_api_version,
		}
	}
}

#[derive(Debug, Clone, Args)]
pub struct ExposeArgs {
	#[command(flatten)]
	pub owner: OwnerArgs,

	/// Source volume snapshot
	#[arg(long)]
	pub snapshot_name: String,

	/// Namespace of the source volume snapshot
	#[arg(long)]
	pub source_namespace: String,

	/// Storage class of the source volume
	#[arg(long, default_value = "")]
	pub storage_class: String,

	/// by-file-system or by-block-device
	#[arg(long, default_value = "by-file-system")]
	pub access_mode: AccessMode,

	/// Size of the source volume, used when the snapshot reports none
	#[arg(long)]
	pub volume_size: String,

	/// Operating system of the node the data mover must run on
	#[arg(long, default_value = "linux")]
	pub node_os: String,

	/// Extra hosting pod label, repeatable
	#[arg(long = "label", value_parser = parse_key_value)]
	pub labels: Vec<(String, String)>,

	/// Extra hosting pod annotation, repeatable
	#[arg(long = "annotation", value_parser = parse_key_value)]
	pub annotations: Vec<(String, String)>,

	/// Required node label for the hosting pod, repeatable
	#[arg(long = "node-selector", value_parser = parse_key_value)]
	pub node_selector: Vec<(String, String)>,

	#[arg(long)]
	pub cpu_request: Option<String>,

	#[arg(long)]
	pub memory_request: Option<String>,

	#[arg(long)]
	pub cpu_limit: Option<String>,

	#[arg(long)]
	pub memory_limit: Option<String>,

	/// Give up on the whole expose after this many seconds
	#[arg(long)]
	pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct GetArgs {
	#[command(flatten)]
	pub owner: OwnerArgs,

	/// Node this process runs on
	#[arg(long, env = "NODE_NAME")]
	pub node_name: String,

	/// How long to wait for the intermediate claim to bind
	#[arg(long, default_value_t = 300)]
	pub timeout_secs: u64,
}

#[derive(Debug, Clone, Args)]
pub struct CleanupArgs {
	#[command(flatten)]
	pub owner: OwnerArgs,

	/// Source volume snapshot to delete as well
	#[arg(long, default_value = "")]
	pub snapshot_name: String,

	#[arg(long, default_value = "")]
	pub source_namespace: String,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
	let (key, value) = s
		.split_once('=')
		.ok_or_else(|| format!("expected key=value, got '{s}'"))?;
	if key.is_empty() {
		return Err(format!("empty key in '{s}'"));
	}
	Ok((key.to_string(), value.to_string()))
}

fn resource_list(
	cpu: Option<String>,
	memory: Option<String>,
) -> Option<BTreeMap<String, Quantity>> {
	let list: BTreeMap<String, Quantity> = [("cpu", cpu), ("memory", memory)]
		.into_iter()
		.filter_map(|(name, value)| value.map(|v| (name.to_string(), Quantity(v))))
		.collect();
	(!list.is_empty()).then_some(list)
}

impl ExposeArgs {
	fn into_params(self, config: &BackupConfig) -> (OwnerRef, CsiSnapshotExposeParams) {
		let affinity = (!self.node_selector.is_empty()).then(|| LoadAffinity {
			node_selector: LabelSelector {
				match_labels: Some(self.node_selector.into_iter().collect()),
				..Default::default()
			},
		});

		let params = CsiSnapshotExposeParams {
			snapshot_name: self.snapshot_name,
			source_namespace: self.source_namespace,
			access_mode: self.access_mode,
			storage_class: self.storage_class,
			hosting_pod_labels: self.labels.into_iter().collect(),
			hosting_pod_annotations: self.annotations.into_iter().collect(),
			affinity,
			backup_pvc_config: config.exposer.backup_pvc.clone(),
			resources: ResourceRequirements {
				requests: resource_list(self.cpu_request, self.memory_request),
				limits: resource_list(self.cpu_limit, self.memory_limit),
				..Default::default()
			},
			operation_timeout: config.exposer.operation_timeout,
			expose_timeout: config.exposer.expose_timeout,
			volume_size: Quantity(self.volume_size),
			node_os: NodeOs::from_label(&self.node_os),
			deadline: self
				.deadline_secs
				.map(|secs| deadline_after(Duration::from_secs(secs))),
		};
		(self.owner.into_owner(), params)
	}
}

#[instrument(skip_all, fields(owner = %args.owner.owner_name))]
pub async fn expose(
	exposer: &CsiSnapshotExposer,
	config: &BackupConfig,
	args: ExposeArgs,
) -> anyhow::Result<()> {
	let (owner, params) = args.into_params(config);
	exposer
		.expose(&owner, &params)
		.await
		.with_context(|| format!("exposing snapshot {} for {}", params.snapshot_name, owner.name))?;
	println!("exposed {}/{}", owner.namespace, owner.name);
	Ok(())
}

#[instrument(skip_all, fields(owner = %args.owner.owner_name, node = %args.node_name))]
pub async fn get(
	exposer: &CsiSnapshotExposer,
	client: Arc<dyn K8sClient>,
	args: GetArgs,
) -> anyhow::Result<()> {
	let node_client: Arc<dyn K8sClient> = Arc::new(NodeScopedClient::new(client, &args.node_name));
	let owner = args.owner.into_owner();
	let params = CsiSnapshotExposeWaitParams {
		node_client,
		node_name: args.node_name,
	};

	match exposer
		.get_exposed(&owner, Duration::from_secs(args.timeout_secs), &params)
		.await?
	{
		Some(result) => {
			let pod = &result.by_pod;
			println!(
				"pod {}/{} container {} volume {} node-os {}",
				owner.namespace,
				pod.hosting_pod.metadata.name.as_deref().unwrap_or_default(),
				pod.hosting_container,
				pod.volume_name,
				pod.node_os.as_deref().unwrap_or("unknown"),
			);
		}
		None => println!("{} is not exposed on node {}", owner.name, params.node_name),
	}
	Ok(())
}

pub async fn peek(exposer: &CsiSnapshotExposer, args: OwnerArgs) -> anyhow::Result<()> {
	let owner = args.into_owner();
	exposer.peek_exposed(&owner).await?;
	println!("{} has no unrecoverable problems", owner.name);
	Ok(())
}

pub async fn diagnose(exposer: &CsiSnapshotExposer, args: OwnerArgs) {
	let owner = args.into_owner();
	print!("{}", exposer.diagnose_expose(&owner).await);
}

pub async fn cleanup(exposer: &CsiSnapshotExposer, args: CleanupArgs) {
	let owner = args.owner.into_owner();
	exposer
		.clean_up(&owner, &args.snapshot_name, &args.source_namespace)
		.await;
}
