// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Classification of hosting pods that can never make progress.

use std::time::Duration;

use chrono::{DateTime, Utc};
use loom_backup_k8s::Pod;

/// Thresholds for declaring a hosting pod unrecoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodHealthPolicy {
	/// How long a pod may stay unschedulable before it is given up on
	pub unschedulable_grace: Duration,
	/// Restarts after which a crash-looping container is given up on
	pub max_crash_restarts: i32,
}

impl Default for PodHealthPolicy {
	fn default() -> Self {
		Self {
			unschedulable_grace: Duration::from_secs(120),
			max_crash_restarts: 3,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodHealth {
	Healthy,
	Unrecoverable(String),
}

/// Decide whether `pod` is stuck for good.
///
/// Pods still pending or running normally are healthy; only terminal phases,
/// long unschedulability, image pull failures and crash loops past the
/// restart threshold are reported.
pub fn classify_pod(pod: &Pod, now: DateTime<Utc>, policy: &PodHealthPolicy) -> PodHealth {
	let Some(status) = pod.status.as_ref() else {
		return PodHealth::Healthy;
	};

	let phase = status.phase.as_deref().unwrap_or_default();
	if phase == "Failed" || phase == "Unknown" {
		return PodHealth::Unrecoverable(format!(
			"Pod is in abnormal state [{}], message [{}]",
			phase,
			status.message.as_deref().unwrap_or_default()
		));
	}

	if let Some(condition) = status.conditions.iter().flatten().find(|c| {
		c.type_ == "PodScheduled"
			&& c.status == "False"
			&& c.reason.as_deref() == Some("Unschedulable")
	}) {
		let since = condition
			.last_transition_time
			.as_ref()
			.or(pod.metadata.creation_timestamp.as_ref())
			.map(|t| t.0);
		let past_grace = match since {
			Some(since) => now
				.signed_duration_since(since)
				.to_std()
				.is_ok_and(|elapsed| elapsed >= policy.unschedulable_grace),
			None => true,
		};
		if past_grace {
			return PodHealth::Unrecoverable(format!(
				"Pod is unschedulable: {}",
				condition.message.as_deref().unwrap_or_default()
			));
		}
	}

	for container in status.container_statuses.iter().flatten() {
		let Some(waiting) = container.state.as_ref().and_then(|s| s.waiting.as_ref()) else {
			continue;
		};
		let reason = waiting.reason.as_deref().unwrap_or_default();
		let message = waiting.message.as_deref().unwrap_or_default();
		match reason {
			"ImagePullBackOff" | "ErrImageNeverPull" => {
				return PodHealth::Unrecoverable(format!(
					"Container {} in pod failed to pull image [{}]: {}",
					container.name, reason, message
				));
			}
			"CrashLoopBackOff" if container.restart_count >= policy.max_crash_restarts => {
				return PodHealth::Unrecoverable(format!(
					"Container {} in pod is crash looping after {} restarts: {}",
					container.name, container.restart_count, message
				));
			}
			_ => {}
		}
	}

	PodHealth::Healthy
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use k8s_openapi::api::core::v1::{
		ContainerState, ContainerStateWaiting, ContainerStatus, PodCondition, PodStatus,
	};
	use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
	}

	fn unrecoverable(health: &PodHealth) -> bool {
		matches!(health, PodHealth::Unrecoverable(_))
	}

	fn pod_with(status: PodStatus) -> Pod {
		Pod {
			status: Some(status),
			..Default::default()
		}
	}

	fn unschedulable(since: DateTime<Utc>) -> Pod {
		pod_with(PodStatus {
			phase: Some("Pending".to_string()),
			conditions: Some(vec![PodCondition {
				type_: "PodScheduled".to_string(),
				status: "False".to_string(),
				reason: Some("Unschedulable".to_string()),
				message: Some("0/3 nodes are available".to_string()),
				last_transition_time: Some(Time(since)),
				..Default::default()
			}]),
			..Default::default()
		})
	}

	fn waiting(reason: &str, restarts: i32) -> Pod {
		pod_with(PodStatus {
			phase: Some("Pending".to_string()),
			container_statuses: Some(vec![ContainerStatus {
				name: "uid-1".to_string(),
				restart_count: restarts,
				state: Some(ContainerState {
					waiting: Some(ContainerStateWaiting {
						reason: Some(reason.to_string()),
						message: Some("back-off".to_string()),
					}),
					..Default::default()
				}),
				..Default::default()
			}]),
			..Default::default()
		})
	}

	#[test]
	fn pending_and_running_pods_are_healthy() {
		let policy = PodHealthPolicy::default();
		for phase in ["Pending", "Running", "Succeeded"] {
			let pod = pod_with(PodStatus {
				phase: Some(phase.to_string()),
				..Default::default()
			});
			assert_eq!(classify_pod(&pod, now(), &policy), PodHealth::Healthy);
		}
		assert_eq!(classify_pod(&Pod::default(), now(), &policy), PodHealth::Healthy);
	}

	#[test]
	fn failed_phase_is_unrecoverable() {
		let pod = pod_with(PodStatus {
			phase: Some("Failed".to_string()),
			message: Some("evicted".to_string()),
			..Default::default()
		});
		let health = classify_pod(&pod, now(), &PodHealthPolicy::default());
		assert_eq!(
			health,
			PodHealth::Unrecoverable("Pod is in abnormal state [Failed], message [evicted]".to_string())
		);
	}

	#[test]
	fn unschedulable_respects_grace_period() {
		let policy = PodHealthPolicy::default();
		let recent = unschedulable(now() - chrono::Duration::seconds(30));
		assert!(!unrecoverable(&classify_pod(&recent, now(), &policy)));

		let stale = unschedulable(now() - chrono::Duration::minutes(5));
		let health = classify_pod(&stale, now(), &policy);
		assert_eq!(
			health,
			PodHealth::Unrecoverable("Pod is unschedulable: 0/3 nodes are available".to_string())
		);
	}

	#[test]
	fn image_pull_failure_is_unrecoverable() {
		let policy = PodHealthPolicy::default();
		assert!(unrecoverable(&classify_pod(&waiting("ImagePullBackOff", 0), now(), &policy)));
		assert!(unrecoverable(&classify_pod(&waiting("ErrImageNeverPull", 0), now(), &policy)));
		assert!(!unrecoverable(&classify_pod(&waiting("ContainerCreating", 0), now(), &policy)));
	}

	#[test]
	fn crash_loop_needs_enough_restarts() {
		let policy = PodHealthPolicy::default();
		assert!(!unrecoverable(&classify_pod(&waiting("CrashLoopBackOff", 2), now(), &policy)));
		assert!(unrecoverable(&classify_pod(&waiting("CrashLoopBackOff", 3), now(), &policy)));
	}
}
