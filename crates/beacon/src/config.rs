// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered client configuration.
//!
//! A [`BeaconConfigLayer`] has every field optional so layers from a TOML
//! file and from `BEACON_*` environment variables can be merged, the later
//! layer winning. [`BeaconConfigLayer::finalize`] applies defaults.

use std::time::Duration;

use beacon_core::Environment;
use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_GEO_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

pub const ENV_ENDPOINT: &str = "BEACON_ENDPOINT";
pub const ENV_ENV: &str = "BEACON_ENV";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "BEACON_REQUEST_TIMEOUT_MS";
pub const ENV_GEO_TIMEOUT_MS: &str = "BEACON_GEO_TIMEOUT_MS";
pub const ENV_GEO_ENDPOINT: &str = "BEACON_GEO_ENDPOINT";
pub const ENV_MAX_QUEUE_SIZE: &str = "BEACON_MAX_QUEUE_SIZE";

/// Configuration layer (all fields optional for merging).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BeaconConfigLayer {
	/// Collector URL events are posted to.
	pub endpoint: Option<String>,
	/// Reported build mode.
	pub env: Option<Environment>,
	pub request_timeout_ms: Option<u64>,
	pub geo_timeout_ms: Option<u64>,
	/// JSON geolocation endpoint. No lookup is done when unset.
	pub geo_endpoint: Option<String>,
	/// Failed-event queue bound. Unbounded when unset.
	pub max_queue_size: Option<usize>,
	pub retry_base_delay_ms: Option<u64>,
	pub retry_max_delay_ms: Option<u64>,
}

impl BeaconConfigLayer {
	pub fn from_toml_str(s: &str) -> Result<Self> {
		toml::from_str(s).map_err(|e| BeaconError::Config(e.to_string()))
	}

	/// Reads `BEACON_*` variables from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Reads `BEACON_*` variables through `lookup`.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

		Ok(Self {
			endpoint: get(ENV_ENDPOINT),
			env: get(ENV_ENV).map(|v| v.parse()).transpose()?,
			request_timeout_ms: parse_number(ENV_REQUEST_TIMEOUT_MS, get(ENV_REQUEST_TIMEOUT_MS))?,
			geo_timeout_ms: parse_number(ENV_GEO_TIMEOUT_MS, get(ENV_GEO_TIMEOUT_MS))?,
			geo_endpoint: get(ENV_GEO_ENDPOINT),
			max_queue_size: parse_number(ENV_MAX_QUEUE_SIZE, get(ENV_MAX_QUEUE_SIZE))?,
			retry_base_delay_ms: None,
			retry_max_delay_ms: None,
		})
	}

	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: Self) {
		if other.endpoint.is_some() {
			self.endpoint = other.endpoint;
		}
		if other.env.is_some() {
			self.env = other.env;
		}
		if other.request_timeout_ms.is_some() {
			self.request_timeout_ms = other.request_timeout_ms;
		}
		if other.geo_timeout_ms.is_some() {
			self.geo_timeout_ms = other.geo_timeout_ms;
		}
		if other.geo_endpoint.is_some() {
			self.geo_endpoint = other.geo_endpoint;
		}
		if other.max_queue_size.is_some() {
			self.max_queue_size = other.max_queue_size;
		}
		if other.retry_base_delay_ms.is_some() {
			self.retry_base_delay_ms = other.retry_base_delay_ms;
		}
		if other.retry_max_delay_ms.is_some() {
			self.retry_max_delay_ms = other.retry_max_delay_ms;
		}
	}

	/// Convert to resolved configuration with defaults applied.
	pub fn finalize(self) -> BeaconConfig {
		BeaconConfig {
			endpoint: self.endpoint,
			env: self.env.unwrap_or_else(Environment::from_build),
			request_timeout: Duration::from_millis(
				self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
			),
			geo_timeout: Duration::from_millis(self.geo_timeout_ms.unwrap_or(DEFAULT_GEO_TIMEOUT_MS)),
			geo_endpoint: self.geo_endpoint,
			max_queue_size: self.max_queue_size,
			retry_base_delay: Duration::from_millis(
				self.retry_base_delay_ms.unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
			),
			retry_max_delay: Duration::from_millis(
				self.retry_max_delay_ms.unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS),
			),
		}
	}
}

fn parse_number<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
	value
		.map(|v| {
			v.trim()
				.parse()
				.map_err(|_| BeaconError::Config(format!("{key} must be a number, got {v:?}")))
		})
		.transpose()
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconConfig {
	pub endpoint: Option<String>,
	pub env: Environment,
	pub request_timeout: Duration,
	pub geo_timeout: Duration,
	pub geo_endpoint: Option<String>,
	pub max_queue_size: Option<usize>,
	pub retry_base_delay: Duration,
	pub retry_max_delay: Duration,
}

impl Default for BeaconConfig {
	fn default() -> Self {
		BeaconConfigLayer::default().finalize()
	}
}
