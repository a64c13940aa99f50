// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::event::Extra;

/// Identity of the currently visible page, as captured for a later restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
	pub code: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extra: Option<Extra>,
}

impl PageSnapshot {
	pub fn new(code: impl Into<String>, name: impl Into<String>, extra: Option<Extra>) -> Self {
		Self {
			code: code.into(),
			name: name.into(),
			extra,
		}
	}

	/// A snapshot with an empty code names no page.
	pub fn is_empty(&self) -> bool {
		self.code.is_empty()
	}
}
