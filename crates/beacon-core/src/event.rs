// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event records and event types.
//!
//! An [`EventRecord`] is immutable once built: the consuming `with_*`
//! methods are only used while constructing it, and retries resend the
//! exact same value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::SessionId;

/// Placeholder substituted with the caller-supplied event name.
pub const NAME_PLACEHOLDER: &str = "@name";

/// Free-form structured payload attached to an event.
pub type Extra = Map<String, Value>;

/// A caller-defined event type with its own wire code and name template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomEventType {
	pub type_code: String,
	pub name_template: String,
}

impl CustomEventType {
	pub fn new(type_code: impl Into<String>, name_template: impl Into<String>) -> Self {
		Self {
			type_code: type_code.into(),
			name_template: name_template.into(),
		}
	}
}

/// The kind of an analytics event.
///
/// Each variant is bound to a fixed name template (containing
/// [`NAME_PLACEHOLDER`]) and a stable wire type code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
	PageIn,
	PageOut,
	Click,
	Expose,
	Custom(CustomEventType),
}

impl EventType {
	/// Stable identifier sent as `eventType`.
	pub fn type_code(&self) -> &str {
		match self {
			EventType::PageIn => "page_in",
			EventType::PageOut => "page_out",
			EventType::Click => "click",
			EventType::Expose => "expose",
			EventType::Custom(custom) => &custom.type_code,
		}
	}

	pub fn name_template(&self) -> &str {
		match self {
			EventType::PageIn => "enter_@name",
			EventType::PageOut => "leave_@name",
			EventType::Click => "click_@name",
			EventType::Expose => "expose_@name",
			EventType::Custom(custom) => &custom.name_template,
		}
	}

	/// Renders `name` through this type's template.
	pub fn render_name(&self, name: &str) -> String {
		self.name_template().replace(NAME_PLACEHOLDER, name)
	}

	pub fn is_page_in(&self) -> bool {
		matches!(self, EventType::PageIn)
	}
}

/// One immutable unit of analytics telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
	session_id: SessionId,
	user_id: String,
	event_code: String,
	event_name: String,
	event_type: EventType,
	timestamp_ms: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	belong_page: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	extra: Option<Extra>,
}

impl EventRecord {
	pub fn new(
		session_id: SessionId,
		user_id: impl Into<String>,
		event_code: impl Into<String>,
		event_name: impl Into<String>,
		event_type: EventType,
		timestamp_ms: i64,
	) -> Self {
		Self {
			session_id,
			user_id: user_id.into(),
			event_code: event_code.into(),
			event_name: event_name.into(),
			event_type,
			timestamp_ms,
			belong_page: None,
			extra: None,
		}
	}

	pub fn with_belong_page(mut self, belong_page: Option<String>) -> Self {
		self.belong_page = belong_page;
		self
	}

	pub fn with_extra(mut self, extra: Option<Extra>) -> Self {
		self.extra = extra;
		self
	}

	pub fn session_id(&self) -> &SessionId {
		&self.session_id
	}

	pub fn user_id(&self) -> &str {
		&self.user_id
	}

	pub fn event_code(&self) -> &str {
		&self.event_code
	}

	/// The raw caller-supplied name, before templating.
	pub fn event_name(&self) -> &str {
		&self.event_name
	}

	/// The name as transmitted, rendered through the type's template.
	pub fn rendered_name(&self) -> String {
		self.event_type.render_name(&self.event_name)
	}

	pub fn event_type(&self) -> &EventType {
		&self.event_type
	}

	pub fn timestamp_ms(&self) -> i64 {
		self.timestamp_ms
	}

	pub fn belong_page(&self) -> Option<&str> {
		self.belong_page.as_deref()
	}

	pub fn extra(&self) -> Option<&Extra> {
		self.extra.as_ref()
	}
}
