// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exposer error types.

use loom_backup_k8s::K8sError;

/// Errors returned by the node-agent info provider.
#[derive(Debug, thiserror::Error)]
pub enum NodeAgentError {
	#[error("Node-agent daemonset {name} not found in namespace {namespace}")]
	NotFound { name: String, namespace: String },

	#[error("Unexpected number of containers ({count}) in node-agent daemonset {name}")]
	UnexpectedContainers { name: String, count: usize },

	#[error("Node-agent pod not found in running state in node {node}")]
	NotRunning { node: String },

	#[error(transparent)]
	K8s(#[from] K8sError),
}

/// Errors that can occur while exposing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum ExposeError {
	/// A bounded wait ran out of time
	#[error("Timed out waiting for {what}")]
	Timeout { what: String },

	/// The ready snapshot has no bound content
	#[error("Volume snapshot {snapshot} is not bound to a snapshot content")]
	MissingContent { snapshot: String },

	#[error("Unsupported access mode {0}")]
	UnsupportedAccessMode(String),

	/// An object the exposer built itself does not have the expected shape
	#[error("Invariant violated: {0}")]
	Invariant(String),

	/// The hosting pod can never make progress
	#[error("{0}")]
	PodUnrecoverable(String),

	/// Failure of a named expose step
	#[error("{step}: {source}")]
	Step {
		step: &'static str,
		#[source]
		source: Box<ExposeError>,
	},

	#[error(transparent)]
	NodeAgent(#[from] NodeAgentError),

	#[error(transparent)]
	K8s(#[from] K8sError),
}

impl ExposeError {
	/// The innermost error, with step wrappers removed.
	pub fn root(&self) -> &ExposeError {
		match self {
			ExposeError::Step { source, .. } => source.root(),
			other => other,
		}
	}

	/// Timeouts may succeed if the caller tries again later.
	pub fn is_retryable(&self) -> bool {
		matches!(self.root(), ExposeError::Timeout { .. })
	}
}

/// Attach the name of the failed step to an error.
pub(crate) trait StepContext<T> {
	fn step(self, step: &'static str) -> Result<T, ExposeError>;
}

impl<T, E: Into<ExposeError>> StepContext<T> for Result<T, E> {
	fn step(self, step: &'static str) -> Result<T, ExposeError> {
		self.map_err(|e| ExposeError::Step {
			step,
			source: Box::new(e.into()),
		})
	}
}
