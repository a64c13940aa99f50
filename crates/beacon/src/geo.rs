// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! IP geolocation enrichment.
//!
//! The resolver is consulted for every delivery attempt, including retries.
//! Callers bound it with [`resolve_or_empty`]; a failed or slow lookup never
//! blocks delivery.

use std::time::Duration;

use beacon_core::GeoInfo;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::warn;

use crate::error::{BeaconError, Result};

#[async_trait::async_trait]
pub trait GeoResolver: Send + Sync {
	async fn resolve(&self) -> Result<GeoInfo>;
}

/// Resolver used when the host has no geolocation service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeoResolver;

#[async_trait::async_trait]
impl GeoResolver for NoGeoResolver {
	async fn resolve(&self) -> Result<GeoInfo> {
		Ok(GeoInfo::default())
	}
}

/// Looks up the caller's public IP and location from a JSON HTTP endpoint.
///
/// The response must be an object. Services disagree on field names, so
/// each value is taken from the first non-empty key in a fixed order:
/// `ip`/`query`/`ip_address`, `countryCode`/`country_code`/`country` and
/// `city`/`city_name`. Missing fields are left empty.
pub struct HttpGeoResolver {
	http_client: Client,
	endpoint: Url,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeoResponse {
	ip: Option<String>,
	query: Option<String>,
	ip_address: Option<String>,
	#[serde(rename = "countryCode")]
	country_code_camel: Option<String>,
	country_code: Option<String>,
	country: Option<String>,
	city: Option<String>,
	city_name: Option<String>,
}

/// First non-empty value, in argument order.
fn first_non_empty(candidates: [Option<String>; 3]) -> String {
	candidates
		.into_iter()
		.flatten()
		.find(|v| !v.is_empty())
		.unwrap_or_default()
}

impl From<GeoResponse> for GeoInfo {
	fn from(body: GeoResponse) -> Self {
		GeoInfo {
			ip: first_non_empty([body.ip, body.query, body.ip_address]),
			country: first_non_empty([body.country_code_camel, body.country_code, body.country]),
			city: first_non_empty([body.city, body.city_name, None]),
		}
	}
}

impl HttpGeoResolver {
	pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
		let endpoint = Url::parse(endpoint)
			.map_err(|e| BeaconError::Config(format!("invalid geolocation endpoint {endpoint}: {e}")))?;
		let http_client = beacon_common_http::builder()
			.timeout(request_timeout)
			.build()
			.map_err(BeaconError::RequestFailed)?;
		Ok(Self {
			http_client,
			endpoint,
		})
	}
}

#[async_trait::async_trait]
impl GeoResolver for HttpGeoResolver {
	#[tracing::instrument(level = "trace", skip(self), fields(endpoint = %self.endpoint))]
	async fn resolve(&self) -> Result<GeoInfo> {
		let response = self
			.http_client
			.get(self.endpoint.clone())
			.send()
			.await
			.map_err(|e| BeaconError::GeoLookupFailed(e.to_string()))?;

		if !response.status().is_success() {
			return Err(BeaconError::GeoLookupFailed(format!(
				"status {}",
				response.status().as_u16()
			)));
		}

		let body: GeoResponse = response
			.json()
			.await
			.map_err(|e| BeaconError::GeoLookupFailed(e.to_string()))?;

		Ok(body.into())
	}
}

/// Runs the resolver under `timeout`, degrading any failure to empty fields.
pub async fn resolve_or_empty(resolver: &dyn GeoResolver, timeout: Duration) -> GeoInfo {
	match tokio::time::timeout(timeout, resolver.resolve()).await {
		Ok(Ok(info)) => info,
		Ok(Err(e)) => {
			warn!(error = %e, "Geolocation lookup failed, sending without location");
			GeoInfo::default()
		}
		Err(_) => {
			warn!(
				error = %BeaconError::GeoLookupTimedOut,
				timeout_ms = timeout.as_millis(),
				"Geolocation lookup timed out, sending without location"
			);
			GeoInfo::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::method;
	use wiremock::{Mock, MockServer, ResponseTemplate};

	struct SlowResolver;

	#[async_trait::async_trait]
	impl GeoResolver for SlowResolver {
		async fn resolve(&self) -> Result<GeoInfo> {
			tokio::time::sleep(Duration::from_secs(60)).await;
			Ok(GeoInfo {
				ip: "never".to_string(),
				..GeoInfo::default()
			})
		}
	}

	struct FailingResolver;

	#[async_trait::async_trait]
	impl GeoResolver for FailingResolver {
		async fn resolve(&self) -> Result<GeoInfo> {
			Err(BeaconError::GeoLookupFailed("offline".to_string()))
		}
	}

	#[tokio::test]
	async fn test_http_resolver_maps_fields() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"query": "198.51.100.4",
				"countryCode": "DE",
				"city": "Berlin",
				"isp": "ignored",
			})))
			.mount(&server)
			.await;

		let resolver = HttpGeoResolver::new(&server.uri(), Duration::from_secs(2)).unwrap();
		let info = resolver.resolve().await.unwrap();

		assert_eq!(info.ip, "198.51.100.4");
		assert_eq!(info.country, "DE");
		assert_eq!(info.city, "Berlin");
	}

	#[tokio::test]
	async fn test_http_resolver_accepts_ip_api_body() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"status": "success",
				"country": "Germany",
				"countryCode": "DE",
				"region": "BE",
				"city": "Berlin",
				"lat": 52.52,
				"query": "198.51.100.4",
			})))
			.mount(&server)
			.await;

		let resolver = HttpGeoResolver::new(&server.uri(), Duration::from_secs(2)).unwrap();
		let info = resolver.resolve().await.unwrap();

		assert_eq!(info.ip, "198.51.100.4");
		assert_eq!(info.country, "DE");
		assert_eq!(info.city, "Berlin");
	}

	#[tokio::test]
	async fn test_http_resolver_accepts_ipapi_co_body() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"ip": "203.0.113.9",
				"city": "Lyon",
				"country": "FR",
				"country_code": "FR",
				"country_name": "France",
			})))
			.mount(&server)
			.await;

		let resolver = HttpGeoResolver::new(&server.uri(), Duration::from_secs(2)).unwrap();
		let info = resolver.resolve().await.unwrap();

		assert_eq!(info.ip, "203.0.113.9");
		assert_eq!(info.country, "FR");
		assert_eq!(info.city, "Lyon");
	}

	#[test]
	fn test_empty_values_fall_through() {
		let body: GeoResponse = serde_json::from_value(serde_json::json!({
			"ip": "",
			"query": "192.0.2.7",
			"countryCode": "",
			"country": "Japan",
		}))
		.unwrap();
		let info = GeoInfo::from(body);

		assert_eq!(info.ip, "192.0.2.7");
		assert_eq!(info.country, "Japan");
		assert!(info.city.is_empty());
	}

	#[tokio::test]
	async fn test_http_resolver_missing_fields_are_empty() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ip": "192.0.2.1"})))
			.mount(&server)
			.await;

		let resolver = HttpGeoResolver::new(&server.uri(), Duration::from_secs(2)).unwrap();
		let info = resolver.resolve().await.unwrap();

		assert_eq!(info.ip, "192.0.2.1");
		assert!(info.country.is_empty());
		assert!(info.city.is_empty());
	}

	#[tokio::test]
	async fn test_http_resolver_error_status() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(502))
			.mount(&server)
			.await;

		let resolver = HttpGeoResolver::new(&server.uri(), Duration::from_secs(2)).unwrap();
		assert!(matches!(resolver.resolve().await, Err(BeaconError::GeoLookupFailed(_))));
	}

	#[tokio::test(start_paused = true)]
	async fn test_timeout_degrades_to_empty() {
		let info = resolve_or_empty(&SlowResolver, Duration::from_secs(3)).await;
		assert_eq!(info, GeoInfo::default());
	}

	#[tokio::test]
	async fn test_failure_degrades_to_empty() {
		let info = resolve_or_empty(&FailingResolver, Duration::from_secs(3)).await;
		assert_eq!(info, GeoInfo::default());
	}

	#[tokio::test]
	async fn test_no_geo_resolver_is_empty() {
		assert_eq!(NoGeoResolver.resolve().await.unwrap(), GeoInfo::default());
	}
}
