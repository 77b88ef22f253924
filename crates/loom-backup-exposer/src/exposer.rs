// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExposeError;
use crate::types::{ExposeResult, OwnerRef};

/// Makes a backup source readable by a data mover running in a hosting pod.
///
/// Every object an exposer creates is named after `owner`, so the owner alone
/// identifies an exposure across calls.
#[async_trait]
pub trait Exposer: Send + Sync {
	/// Parameters for [`Exposer::expose`].
	type Params: Send + Sync;
	/// Parameters for [`Exposer::get_exposed`].
	type WaitParams: Send + Sync;

	/// Create the hosting objects. On failure everything created so far is
	/// removed again before the error is returned.
	async fn expose(&self, owner: &OwnerRef, params: &Self::Params) -> Result<(), ExposeError>;

	/// Locate the exposed volume.
	///
	/// `Ok(None)` means the hosting pod is not visible to the node-local
	/// client, i.e. it runs on another node.
	async fn get_exposed(
		&self,
		owner: &OwnerRef,
		timeout: Duration,
		params: &Self::WaitParams,
	) -> Result<Option<ExposeResult>, ExposeError>;

	/// Fail fast when the hosting pod can never make progress.
	async fn peek_exposed(&self, owner: &OwnerRef) -> Result<(), ExposeError>;

	/// Human-readable state of every object involved in the exposure.
	async fn diagnose_expose(&self, owner: &OwnerRef) -> String;

	/// Remove everything the exposure created plus the source snapshot.
	async fn clean_up(&self, owner: &OwnerRef, snapshot_name: &str, source_namespace: &str);
}
