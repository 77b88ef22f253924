// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Node-agent information provider.
//!
//! The hosting pod runs the node-agent image, so it inherits the agent's
//! image, environment, mounts and logging flags from the agent DaemonSet.

use std::sync::Arc;

use async_trait::async_trait;
use loom_backup_k8s::{
	EnvFromSource, EnvVar, K8sClient, PodDNSConfig, PodSpec, Volume, VolumeMount,
};

use crate::error::NodeAgentError;
use crate::types::NodeOs;

pub const DEFAULT_LINUX_DAEMONSET: &str = "node-agent";
pub const DEFAULT_WINDOWS_DAEMONSET: &str = "node-agent-windows";

/// Pod settings copied from the node-agent into the hosting pod.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InheritedPodInfo {
	pub image: String,
	pub service_account: Option<String>,
	pub env: Vec<EnvVar>,
	pub env_from: Vec<EnvFromSource>,
	pub volume_mounts: Vec<VolumeMount>,
	pub volumes: Vec<Volume>,
	pub dns_policy: Option<String>,
	pub dns_config: Option<PodDNSConfig>,
	pub log_format_args: Vec<String>,
	pub log_level_args: Vec<String>,
}

impl InheritedPodInfo {
	/// Extract inheritable settings from a node-agent pod template.
	///
	/// The template must have exactly one container.
	pub fn from_pod_spec(daemonset: &str, spec: &PodSpec) -> Result<Self, NodeAgentError> {
		if spec.containers.len() != 1 {
			return Err(NodeAgentError::UnexpectedContainers {
				name: daemonset.to_string(),
				count: spec.containers.len(),
			});
		}
		let container = &spec.containers[0];

		let args = container.args.clone().unwrap_or_default();
		let log_format_args = args
			.iter()
			.filter(|a| a.starts_with("--log-format"))
			.cloned()
			.collect();
		let log_level_args = args
			.iter()
			.filter(|a| a.starts_with("--log-level"))
			.cloned()
			.collect();

		Ok(Self {
			image: container.image.clone().unwrap_or_default(),
			service_account: spec.service_account_name.clone(),
			env: container.env.clone().unwrap_or_default(),
			env_from: container.env_from.clone().unwrap_or_default(),
			volume_mounts: container.volume_mounts.clone().unwrap_or_default(),
			volumes: spec.volumes.clone().unwrap_or_default(),
			dns_policy: spec.dns_policy.clone(),
			dns_config: spec.dns_config.clone(),
			log_format_args,
			log_level_args,
		})
	}
}

/// Source of node-agent facts the exposer depends on.
#[async_trait]
pub trait NodeAgent: Send + Sync {
	/// Settings the hosting pod inherits for a node of the given OS.
	async fn inherited_pod_info(
		&self,
		namespace: &str,
		node_os: NodeOs,
	) -> Result<InheritedPodInfo, NodeAgentError>;

	/// Succeeds when a node-agent pod is running on `node_name`.
	async fn is_running_on_node(&self, namespace: &str, node_name: &str)
		-> Result<(), NodeAgentError>;
}

/// [`NodeAgent`] backed by the node-agent DaemonSets.
pub struct DaemonSetNodeAgent {
	client: Arc<dyn K8sClient>,
	linux_daemonset: String,
	windows_daemonset: String,
}

impl DaemonSetNodeAgent {
	pub fn new(client: Arc<dyn K8sClient>) -> Self {
		Self::with_names(client, DEFAULT_LINUX_DAEMONSET, DEFAULT_WINDOWS_DAEMONSET)
	}

	pub fn with_names(
		client: Arc<dyn K8sClient>,
		linux_daemonset: impl Into<String>,
		windows_daemonset: impl Into<String>,
	) -> Self {
		Self {
			client,
			linux_daemonset: linux_daemonset.into(),
			windows_daemonset: windows_daemonset.into(),
		}
	}

	fn daemonset_for(&self, node_os: NodeOs) -> &str {
		match node_os {
			NodeOs::Linux => &self.linux_daemonset,
			NodeOs::Windows => &self.windows_daemonset,
		}
	}
}

#[async_trait]
impl NodeAgent for DaemonSetNodeAgent {
	async fn inherited_pod_info(
		&self,
		namespace: &str,
		node_os: NodeOs,
	) -> Result<InheritedPodInfo, NodeAgentError> {
		let name = self.daemonset_for(node_os);
		let daemonset = match self.client.get_daemonset(name, namespace).await {
			Ok(ds) => ds,
			Err(e) if e.is_not_found() => {
				return Err(NodeAgentError::NotFound {
					name: name.to_string(),
					namespace: namespace.to_string(),
				});
			}
			Err(e) => return Err(e.into()),
		};

		let spec = daemonset
			.spec
			.and_then(|s| s.template.spec)
			.unwrap_or_default();
		InheritedPodInfo::from_pod_spec(name, &spec)
	}

	async fn is_running_on_node(
		&self,
		namespace: &str,
		node_name: &str,
	) -> Result<(), NodeAgentError> {
		for daemonset in [&self.linux_daemonset, &self.windows_daemonset] {
			let selector = format!("name={daemonset}");
			let pods = self
				.client
				.list_pods_on_node(namespace, &selector, node_name)
				.await?;
			let running = pods.iter().any(|pod| {
				pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
			});
			if running {
				return Ok(());
			}
		}

		Err(NodeAgentError::NotRunning {
			node: node_name.to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use k8s_openapi::api::apps::v1::DaemonSetSpec;
	use k8s_openapi::api::core::v1::{PodStatus, PodTemplateSpec};
	use loom_backup_k8s::{Container, DaemonSet, FakeK8sClient, ObjectMeta, Pod};
	use std::collections::BTreeMap;

	fn agent_spec(containers: usize) -> PodSpec {
		PodSpec {
			containers: (0..containers)
				.map(|i| Container {
					name: format!("node-agent-{i}"),
					image: Some("ghcr.io/loom/backup:1.4.0".to_string()),
					args: Some(vec![
						"node-agent".to_string(),
						"server".to_string(),
						"--log-format=json".to_string(),
						"--log-level=debug".to_string(),
					]),
					env: Some(vec![EnvVar {
						name: "NODE_NAME".to_string(),
						..Default::default()
					}]),
					..Default::default()
				})
				.collect(),
			service_account_name: Some("loom-backup".to_string()),
			dns_policy: Some("ClusterFirst".to_string()),
			..Default::default()
		}
	}

	fn daemonset(name: &str, spec: PodSpec) -> DaemonSet {
		DaemonSet {
			metadata: ObjectMeta {
				name: Some(name.to_string()),
				..Default::default()
			},
			spec: Some(DaemonSetSpec {
				template: PodTemplateSpec {
					metadata: None,
					spec: Some(spec),
				},
				..Default::default()
			}),
			status: None,
		}
	}

	fn agent_pod(name: &str, daemonset: &str, node: &str, phase: &str) -> Pod {
		Pod {
			metadata: ObjectMeta {
				name: Some(name.to_string()),
				labels: Some(BTreeMap::from([("name".to_string(), daemonset.to_string())])),
				..Default::default()
			},
			spec: Some(PodSpec {
				node_name: Some(node.to_string()),
				..Default::default()
			}),
			status: Some(PodStatus {
				phase: Some(phase.to_string()),
				..Default::default()
			}),
		}
	}

	#[test]
	fn inherits_logging_args_and_settings() {
		let info = InheritedPodInfo::from_pod_spec("node-agent", &agent_spec(1)).unwrap();
		assert_eq!(info.image, "ghcr.io/loom/backup:1.4.0");
		assert_eq!(info.log_format_args, vec!["--log-format=json".to_string()]);
		assert_eq!(info.log_level_args, vec!["--log-level=debug".to_string()]);
		assert_eq!(info.service_account.as_deref(), Some("loom-backup"));
		assert_eq!(info.env.len(), 1);
	}

	#[test]
	fn rejects_multi_container_template() {
		let err = InheritedPodInfo::from_pod_spec("node-agent", &agent_spec(2)).unwrap_err();
		assert!(matches!(err, NodeAgentError::UnexpectedContainers { count: 2, .. }));
	}

	#[tokio::test]
	async fn selects_daemonset_by_node_os() {
		let client = Arc::new(FakeK8sClient::new());
		client.insert_daemonset("loom-backup", daemonset("node-agent", agent_spec(1)));
		let mut windows = agent_spec(1);
		windows.containers[0].image = Some("ghcr.io/loom/backup:1.4.0-windows".to_string());
		client.insert_daemonset("loom-backup", daemonset("node-agent-windows", windows));

		let agent = DaemonSetNodeAgent::new(client);
		let info = agent
			.inherited_pod_info("loom-backup", NodeOs::Windows)
			.await
			.unwrap();
		assert_eq!(info.image, "ghcr.io/loom/backup:1.4.0-windows");
	}

	#[tokio::test]
	async fn missing_daemonset_is_reported() {
		let agent = DaemonSetNodeAgent::new(Arc::new(FakeK8sClient::new()));
		let err = agent
			.inherited_pod_info("loom-backup", NodeOs::Linux)
			.await
			.unwrap_err();
		assert!(matches!(err, NodeAgentError::NotFound { ref name, .. } if name == "node-agent"));
	}

	#[tokio::test]
	async fn liveness_requires_running_pod_on_node() {
		let client = Arc::new(FakeK8sClient::new());
		client.insert_pod("loom-backup", agent_pod("agent-a", "node-agent", "node-a", "Running"));
		client.insert_pod("loom-backup", agent_pod("agent-b", "node-agent", "node-b", "Pending"));
		client.insert_pod(
			"loom-backup",
			agent_pod("agent-c", "node-agent-windows", "node-c", "Running"),
		);
		let agent = DaemonSetNodeAgent::new(client);

		agent.is_running_on_node("loom-backup", "node-a").await.unwrap();
		agent.is_running_on_node("loom-backup", "node-c").await.unwrap();
		let err = agent
			.is_running_on_node("loom-backup", "node-b")
			.await
			.unwrap_err();
		assert!(matches!(err, NodeAgentError::NotRunning { ref node } if node == "node-b"));
	}
}
