// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_backup_k8s::{
	Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
};

use crate::types::LoadAffinity;

/// Convert placement hints into a required node affinity.
///
/// Each hint becomes one node selector term, so a node matching any hint is
/// eligible. `matchLabels` entries become `In` requirements and
/// `matchExpressions` are carried over as-is. Returns `None` when no term
/// results.
pub fn to_system_affinity(affinities: &[LoadAffinity]) -> Option<Affinity> {
	let terms: Vec<NodeSelectorTerm> = affinities
		.iter()
		.map(|affinity| {
			let selector = &affinity.node_selector;
			let mut requirements: Vec<NodeSelectorRequirement> = selector
				.match_labels
				.iter()
				.flatten()
				.map(|(key, value)| NodeSelectorRequirement {
					key: key.clone(),
					operator: "In".to_string(),
					values: Some(vec![value.clone()]),
				})
				.collect();
			requirements.extend(selector.match_expressions.iter().flatten().map(|exp| {
				NodeSelectorRequirement {
					key: exp.key.clone(),
					operator: exp.operator.clone(),
					values: exp.values.clone(),
				}
			}));
			NodeSelectorTerm {
				match_expressions: Some(requirements),
				match_fields: None,
			}
		})
		.collect();

	if terms.is_empty() {
		return None;
	}

	Some(Affinity {
		node_affinity: Some(NodeAffinity {
			required_during_scheduling_ignored_during_execution: Some(NodeSelector {
				node_selector_terms: terms,
			}),
			preferred_during_scheduling_ignored_during_execution: None,
		}),
		..Default::default()
	})
}
