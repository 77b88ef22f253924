// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for K8s operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur during K8s operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("{kind} not found: {name}")]
	NotFound { kind: &'static str, name: String },

	#[error("Conflict: {message}")]
	Conflict { message: String },
}

impl K8sError {
	pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
		K8sError::NotFound {
			kind,
			name: name.into(),
		}
	}

	/// Whether the object store reported the object as absent.
	pub fn is_not_found(&self) -> bool {
		matches!(self, K8sError::NotFound { .. })
	}
}

/// Maps a kube error to a `K8sError`, naming the object for 404s.
pub(crate) fn from_kube(err: kube::Error, kind: &'static str, name: &str) -> K8sError {
	match err {
		kube::Error::Api(ref resp) if resp.code == 404 => K8sError::not_found(kind, name),
		kube::Error::Api(ref resp) if resp.code == 409 => K8sError::Conflict {
			message: resp.message.clone(),
		},
		e => e.into(),
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}
