// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The collector wire payload.
//!
//! [`WirePayload`] carries exactly the fourteen fields the collector expects.
//! Building one is a pure function of the record, the host's app info and
//! the enrichment result, so the same record always produces the same
//! payload apart from the location fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::event::{EventRecord, Extra};

/// Build mode reported in the `env` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
	Dev,
	Prd,
}

impl Environment {
	/// `Dev` for debug builds, `Prd` otherwise.
	pub fn from_build() -> Self {
		if cfg!(debug_assertions) {
			Environment::Dev
		} else {
			Environment::Prd
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Environment::Dev => "dev",
			Environment::Prd => "prd",
		}
	}
}

impl Default for Environment {
	fn default() -> Self {
		Self::from_build()
	}
}

impl fmt::Display for Environment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Environment {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"dev" | "development" => Ok(Environment::Dev),
			"prd" | "prod" | "production" => Ok(Environment::Prd),
			_ => Err(CoreError::InvalidEnvironment(s.to_string())),
		}
	}
}

/// Host application details fixed at initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
	pub system_version: String,
	pub app_version: String,
	pub env: Environment,
}

/// Result of an IP geolocation lookup. Empty strings mean "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
	#[serde(default)]
	pub ip: String,
	#[serde(default)]
	pub country: String,
	#[serde(default)]
	pub city: String,
}

/// JSON body posted to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePayload {
	pub session_id: String,
	pub uuid: String,
	pub event_code: String,
	pub event_name: String,
	pub event_type: String,
	pub event_time: i64,
	pub user_ip: String,
	pub country_code: String,
	pub city_code: String,
	pub system_version: String,
	pub app_version: String,
	pub attr_page: String,
	pub event_content: String,
	pub env: Environment,
}

impl WirePayload {
	/// Builds the payload with an already serialized `eventContent`.
	pub fn build(record: &EventRecord, app: &AppInfo, geo: &GeoInfo, event_content: String) -> Self {
		Self {
			session_id: record.session_id().to_string(),
			uuid: record.user_id().to_string(),
			event_code: record.event_code().to_string(),
			event_name: record.rendered_name(),
			event_type: record.event_type().type_code().to_string(),
			event_time: record.timestamp_ms(),
			user_ip: geo.ip.clone(),
			country_code: geo.country.clone(),
			city_code: geo.city.clone(),
			system_version: app.system_version.clone(),
			app_version: app.app_version.clone(),
			attr_page: record.belong_page().unwrap_or_default().to_string(),
			event_content,
			env: app.env,
		}
	}

	/// Builds the payload, degrading a serialization failure of `extra` to
	/// empty content.
	pub fn from_record(record: &EventRecord, app: &AppInfo, geo: &GeoInfo) -> Self {
		Self::build(record, app, geo, compact_content(record.extra()))
	}

	pub fn to_json(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}
}

/// Serializes `extra` to JSON and strips every space and newline.
///
/// Absent `extra` yields an empty string.
pub fn try_compact_content(extra: Option<&Extra>) -> Result<String> {
	let Some(extra) = extra else {
		return Ok(String::new());
	};
	let json = serde_json::to_string(extra)?;
	Ok(json.chars().filter(|c| *c != ' ' && *c != '\n').collect())
}

/// Like [`try_compact_content`], with failures mapped to an empty string.
pub fn compact_content(extra: Option<&Extra>) -> String {
	try_compact_content(extra).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::event::EventType;
	use crate::session::SessionId;
	use proptest::prelude::*;
	use serde_json::{json, Value};

	fn app() -> AppInfo {
		AppInfo {
			system_version: "17.0".to_string(),
			app_version: "2.3".to_string(),
			env: Environment::Prd,
		}
	}

	fn extra_of(value: Value) -> Extra {
		match value {
			Value::Object(map) => map,
			_ => panic!("expected object"),
		}
	}

	#[test]
	fn compact_content_strips_spaces_and_newlines() {
		let extra = extra_of(json!({"a": 1, "b": "x y"}));
		let content = compact_content(Some(&extra));

		assert!(!content.contains(' '));
		assert!(!content.contains('\n'));

		let parsed: Value = serde_json::from_str(&content).unwrap();
		assert_eq!(parsed, json!({"a": 1, "b": "xy"}));
	}

	#[test]
	fn compact_content_of_none_is_empty() {
		assert_eq!(compact_content(None), "");
	}

	#[test]
	fn payload_has_fourteen_camel_case_fields() {
		let record = EventRecord::new(SessionId::from("s1"), "u1", "home", "Home", EventType::PageIn, 42);
		let payload = WirePayload::from_record(&record, &app(), &GeoInfo::default());
		let value: Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
		let object = value.as_object().unwrap();

		let expected = [
			"sessionId",
			"uuid",
			"eventCode",
			"eventName",
			"eventType",
			"eventTime",
			"userIp",
			"countryCode",
			"cityCode",
			"systemVersion",
			"appVersion",
			"attrPage",
			"eventContent",
			"env",
		];
		assert_eq!(object.len(), expected.len());
		for key in expected {
			assert!(object.contains_key(key), "missing {key}");
		}

		assert_eq!(object["eventTime"], json!(42));
		assert_eq!(object["eventName"], json!("enter_Home"));
		assert_eq!(object["eventType"], json!("page_in"));
		assert_eq!(object["attrPage"], json!(""));
		assert_eq!(object["eventContent"], json!(""));
		assert_eq!(object["env"], json!("prd"));
	}

	#[test]
	fn payload_copies_geo_and_page() {
		let record = EventRecord::new(SessionId::from("s1"), "u1", "btn", "Buy", EventType::Click, 7)
			.with_belong_page(Some("cart".to_string()))
			.with_extra(Some(extra_of(json!({"sku": "A 1"}))));
		let geo = GeoInfo {
			ip: "203.0.113.9".to_string(),
			country: "NZ".to_string(),
			city: "Wellington".to_string(),
		};

		let payload = WirePayload::from_record(&record, &app(), &geo);

		assert_eq!(payload.user_ip, "203.0.113.9");
		assert_eq!(payload.country_code, "NZ");
		assert_eq!(payload.city_code, "Wellington");
		assert_eq!(payload.attr_page, "cart");
		assert_eq!(payload.event_content, r#"{"sku":"A1"}"#);
		assert_eq!(payload.uuid, "u1");
	}

	#[test]
	fn environment_parses_aliases() {
		assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
		assert_eq!("Production".parse::<Environment>().unwrap(), Environment::Prd);
		assert!("staging".parse::<Environment>().is_err());
	}

	proptest! {
		#[test]
		fn compact_content_never_contains_whitespace(
			key in "[a-z ]{1,8}",
			text in "[a-z \n]{0,16}",
			num in any::<i32>(),
		) {
			let mut extra = Extra::new();
			extra.insert(key, Value::from(text));
			extra.insert("n".to_string(), Value::from(num));

			let content = compact_content(Some(&extra));
			prop_assert!(!content.contains(' '));
			prop_assert!(!content.contains('\n'));
			prop_assert!(serde_json::from_str::<Value>(&content).is_ok());
		}
	}
}
