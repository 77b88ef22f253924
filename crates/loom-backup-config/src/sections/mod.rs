// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod exposer;
mod logging;

pub use exposer::{ExposerConfigLayer, ExposerSettings};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
