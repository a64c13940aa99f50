// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the Beacon client.

use beacon_common_http::{is_retryable_status, RetryableError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BeaconError {
	/// Collector endpoint is missing or is not an http(s) URL.
	#[error("invalid collector endpoint: {0}")]
	InvalidEndpoint(String),

	#[error("user id must be set before the client is built")]
	MissingUserId,

	/// The client was built outside a tokio runtime and no handle was supplied.
	#[error("no tokio runtime available to run delivery tasks")]
	NoRuntime,

	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	#[error("server error ({status}): {message}")]
	ServerError { status: u16, message: String },

	#[error("rate limited, retry after {retry_after_secs:?} seconds")]
	RateLimited { retry_after_secs: Option<u64> },

	#[error("geolocation lookup failed: {0}")]
	GeoLookupFailed(String),

	#[error("geolocation lookup timed out")]
	GeoLookupTimedOut,

	#[error("failed-event store error: {0}")]
	Store(String),

	#[error("serialization error: {0}")]
	Serialization(String),

	#[error("configuration error: {0}")]
	Config(String),

	#[error("client has been shut down")]
	ClientShutdown,
}

impl From<sqlx::Error> for BeaconError {
	fn from(e: sqlx::Error) -> Self {
		BeaconError::Store(e.to_string())
	}
}

impl From<beacon_core::CoreError> for BeaconError {
	fn from(e: beacon_core::CoreError) -> Self {
		match e {
			beacon_core::CoreError::InvalidEnvironment(env) => {
				BeaconError::Config(format!("invalid environment: {env}"))
			}
			other => BeaconError::Serialization(other.to_string()),
		}
	}
}

impl RetryableError for BeaconError {
	fn is_retryable(&self) -> bool {
		match self {
			BeaconError::RequestFailed(e) => e.is_retryable(),
			BeaconError::ServerError { status, .. } => is_retryable_status(*status),
			BeaconError::RateLimited { .. } => true,
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, BeaconError>;
