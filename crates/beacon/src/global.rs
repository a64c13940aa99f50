// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Optional process-wide client for hosts that want one at their
//! composition root.

use std::sync::OnceLock;

use crate::client::Beacon;

static GLOBAL: OnceLock<Beacon> = OnceLock::new();

/// Installs `beacon` as the process-wide client. Returns it back if one is
/// already installed.
pub fn init_global(beacon: Beacon) -> Result<(), Beacon> {
	GLOBAL.set(beacon)
}

/// The process-wide client, if installed.
pub fn global() -> Option<&'static Beacon> {
	GLOBAL.get()
}
