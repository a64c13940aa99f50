// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery of one wire payload to the collector.

use std::time::Duration;

use beacon_common_http::RetryConfig;
use beacon_core::WirePayload;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{BeaconError, Result};

/// Sends one fully formed payload and reports success or failure.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, payload: &WirePayload) -> Result<()>;
}

/// Parses and checks a collector endpoint.
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<Url> {
	let url =
		Url::parse(endpoint.trim()).map_err(|e| BeaconError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
	match url.scheme() {
		"http" | "https" => Ok(url),
		other => Err(BeaconError::InvalidEndpoint(format!(
			"{endpoint}: unsupported scheme {other}"
		))),
	}
}

/// Posts each payload as a JSON body to a single collector URL.
pub struct HttpTransport {
	http_client: Client,
	endpoint: Url,
	retry_config: RetryConfig,
}

impl HttpTransport {
	pub fn new(endpoint: &str, request_timeout: Duration, retry_config: RetryConfig) -> Result<Self> {
		let endpoint = parse_endpoint(endpoint)?;
		let http_client = beacon_common_http::builder()
			.timeout(request_timeout)
			.build()
			.map_err(BeaconError::RequestFailed)?;
		Ok(Self::with_client(http_client, endpoint, retry_config))
	}

	pub fn with_client(http_client: Client, endpoint: Url, retry_config: RetryConfig) -> Self {
		Self {
			http_client,
			endpoint,
			retry_config,
		}
	}

	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	async fn post_once(&self, payload: &WirePayload) -> Result<()> {
		let response = self
			.http_client
			.post(self.endpoint.clone())
			.json(payload)
			.send()
			.await?;

		if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
			let retry_after = response
				.headers()
				.get("Retry-After")
				.and_then(|v| v.to_str().ok())
				.and_then(|s| s.parse().ok());
			return Err(BeaconError::RateLimited {
				retry_after_secs: retry_after,
			});
		}

		if !response.status().is_success() {
			return Err(BeaconError::ServerError {
				status: response.status().as_u16(),
				message: response.text().await.unwrap_or_default(),
			});
		}

		Ok(())
	}
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
	#[tracing::instrument(
		level = "debug",
		skip(self, payload),
		fields(endpoint = %self.endpoint, event_code = %payload.event_code)
	)]
	async fn send(&self, payload: &WirePayload) -> Result<()> {
		beacon_common_http::retry(&self.retry_config, || self.post_once(payload)).await?;
		debug!(event_type = %payload.event_type, event_time = payload.event_time, "Event delivered");
		Ok(())
	}
}
