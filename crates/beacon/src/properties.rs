// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Helper for building an event's `extra` payload.

use beacon_core::Extra;
use serde_json::Value;

/// A builder for an event's free-form `extra` payload.
///
/// # Example
///
/// ```
/// use beacon::Properties;
///
/// let props = Properties::new()
///     .insert("tab", "notifications")
///     .insert("count", 3)
///     .insert("is_first_visit", true);
/// assert_eq!(props.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
	inner: Extra,
}

impl Properties {
	pub fn new() -> Self {
		Self { inner: Extra::new() }
	}

	/// Inserts a key-value pair.
	///
	/// The value can be anything convertible into `serde_json::Value`,
	/// including strings, numbers, booleans, arrays, and nested objects.
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// Merges another Properties into this one. Keys from `other` win.
	pub fn merge(mut self, other: Properties) -> Self {
		for (k, v) in other.inner {
			self.inner.insert(k, v);
		}
		self
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.inner.get(key)
	}

	pub fn into_map(self) -> Extra {
		self.inner
	}
}

impl From<Properties> for Extra {
	fn from(props: Properties) -> Self {
		props.into_map()
	}
}

impl From<Extra> for Properties {
	fn from(inner: Extra) -> Self {
		Self { inner }
	}
}
