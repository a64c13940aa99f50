// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one logical usage session.
///
/// Sessions are replaced explicitly by the host application, never per event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
	/// Generates a fresh session id using UUIDv7 (time-ordered).
	pub fn generate() -> Self {
		let uuid7_val = uuid7::uuid7();
		Self(Uuid::from_bytes(*uuid7_val.as_bytes()).to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::generate()
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<String> for SessionId {
	fn from(s: String) -> Self {
		Self(s)
	}
}

impl From<&str> for SessionId {
	fn from(s: &str) -> Self {
		Self(s.to_string())
	}
}
