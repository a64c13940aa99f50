// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The send path shared by first attempts and retries: enrich, serialize,
//! transmit.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{try_compact_content, AppInfo, EventRecord, GeoInfo, WirePayload};
use tracing::warn;

use crate::error::Result;
use crate::geo::{resolve_or_empty, GeoResolver};
use crate::transport::Transport;

pub struct SendPath {
	transport: Arc<dyn Transport>,
	geo_resolver: Arc<dyn GeoResolver>,
	app: AppInfo,
	geo_timeout: Duration,
}

impl SendPath {
	pub fn new(
		transport: Arc<dyn Transport>,
		geo_resolver: Arc<dyn GeoResolver>,
		app: AppInfo,
		geo_timeout: Duration,
	) -> Self {
		Self {
			transport,
			geo_resolver,
			app,
			geo_timeout,
		}
	}

	pub fn app(&self) -> &AppInfo {
		&self.app
	}

	/// Builds the payload for `record`. A record whose `extra` cannot be
	/// serialized is still sent, with empty content.
	pub fn payload(&self, record: &EventRecord, geo: &GeoInfo) -> WirePayload {
		let content = try_compact_content(record.extra()).unwrap_or_else(|e| {
			warn!(error = %e, event_code = %record.event_code(), "Sending event without content");
			String::new()
		});
		WirePayload::build(record, &self.app, geo, content)
	}

	/// One delivery attempt. Location is looked up afresh on every call.
	pub async fn deliver(&self, record: &EventRecord) -> Result<()> {
		let geo = resolve_or_empty(self.geo_resolver.as_ref(), self.geo_timeout).await;
		let payload = self.payload(record, &geo);
		self.transport.send(&payload).await
	}
}
