// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

use crate::sections::{ExposerConfigLayer, LoggingConfigLayer};

/// One partially specified configuration, as read from a single source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackupConfigLayer {
	pub exposer: Option<ExposerConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
}

impl BackupConfigLayer {
	/// Overlay `other` on top of `self`; fields set in `other` win.
	pub fn merge(&mut self, other: BackupConfigLayer) {
		if let Some(exposer) = other.exposer {
			match &mut self.exposer {
				Some(base) => base.merge(exposer),
				None => self.exposer = Some(exposer),
			}
		}
		if let Some(logging) = other.logging {
			match &mut self.logging {
				Some(base) => base.merge(logging),
				None => self.logging = Some(logging),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn merge_fills_missing_sections() {
		let mut base = BackupConfigLayer::default();
		let overlay = BackupConfigLayer {
			logging: Some(LoggingConfigLayer {
				level: Some("debug".to_string()),
				..Default::default()
			}),
			..Default::default()
		};

		base.merge(overlay);
		assert_eq!(
			base.logging.and_then(|l| l.level),
			Some("debug".to_string())
		);
		assert!(base.exposer.is_none());
	}

	#[test]
	fn merge_combines_section_fields() {
		let mut base = BackupConfigLayer {
			exposer: Some(ExposerConfigLayer {
				poll_interval_ms: Some(500),
				cleanup_timeout_secs: Some(30),
				..Default::default()
			}),
			..Default::default()
		};
		let overlay = BackupConfigLayer {
			exposer: Some(ExposerConfigLayer {
				cleanup_timeout_secs: Some(90),
				..Default::default()
			}),
			..Default::default()
		};

		base.merge(overlay);
		let exposer = base.exposer.unwrap();
		assert_eq!(exposer.poll_interval_ms, Some(500));
		assert_eq!(exposer.cleanup_timeout_secs, Some(90));
	}
}
