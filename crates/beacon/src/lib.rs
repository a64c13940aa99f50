// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side analytics event delivery.
//!
//! This crate captures application events, enriches them with session and
//! location context, and posts them to a collector. Events whose delivery
//! fails are queued and replayed when the network becomes reachable again.
//!
//! # Features
//!
//! - **Page tracking**: entering a page emits a `PageOut` for the previous
//!   page one millisecond before the new `PageIn`
//! - **Non-blocking submit**: delivery runs on background tasks
//! - **Retry queue**: failed records are replayed in FIFO order, requeued at
//!   the tail on renewed failure
//! - **Durable buffering**: an optional SQLite store keeps queued records
//!   across restarts
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use beacon::{Beacon, ManualConnectivity, NewEvent, Properties, Reachability};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connectivity = Arc::new(ManualConnectivity::new());
//!     let beacon = Beacon::builder()
//!         .user_id("u1")
//!         .endpoint("https://collect.example/ev")
//!         .system_version("17.0")
//!         .app_version("2.3")
//!         .connectivity(connectivity.clone())
//!         .build()?;
//!
//!     beacon.submit(NewEvent::page_in("home", "Home"))?;
//!     beacon.submit(
//!         NewEvent::click("buy", "Buy")
//!             .belong_page("home")
//!             .extra(Properties::new().insert("sku", "A-1"))
//!             .on_error(|record| eprintln!("failed: {}", record.event_code())),
//!     )?;
//!
//!     // Replays anything that failed while offline.
//!     connectivity.set(Reachability::Reachable);
//!
//!     beacon.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod connectivity;
mod drain;
mod error;
mod failures;
mod geo;
pub mod global;
mod page;
mod properties;
mod queue;
mod send;
mod store;
mod transport;

pub use client::{Beacon, BeaconBuilder, ErrorCallback, NewEvent};
pub use config::{BeaconConfig, BeaconConfigLayer};
pub use connectivity::{ConnectivityMonitor, ManualConnectivity, ProbeConnectivity, Reachability};
pub use drain::{DrainReport, ExponentialDelay, NoDelay, RetryDelay};
pub use error::{BeaconError, Result};
pub use geo::{GeoResolver, HttpGeoResolver, NoGeoResolver};
pub use properties::Properties;
pub use queue::OverflowPolicy;
pub use store::{FailedEventStore, MemoryStore, SqliteStore, StoredEvent};
pub use transport::{HttpTransport, Transport};

// Re-export core types for convenience
pub use beacon_common_http::RetryConfig;
pub use beacon_core::{
	AppInfo, CustomEventType, Environment, EventRecord, EventType, Extra, GeoInfo, PageSnapshot,
	SessionId, WirePayload,
};
