// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Beacon analytics event delivery.
//!
//! This crate holds the data shared between the dispatcher, the retry queue
//! and the durable store:
//!
//! - [`EventRecord`]: one immutable analytics event
//! - [`EventType`]: the event kind with its name template and wire type code
//! - [`PageSnapshot`]: the captured identity of the currently visible page
//! - [`WirePayload`]: the exact JSON object posted to the collector
//!
//! Nothing in here performs I/O.

pub mod error;
pub mod event;
pub mod page;
pub mod payload;
pub mod session;

pub use error::{CoreError, Result};
pub use event::{CustomEventType, EventRecord, EventType, Extra, NAME_PLACEHOLDER};
pub use page::PageSnapshot;
pub use payload::{compact_content, try_compact_content, AppInfo, Environment, GeoInfo, WirePayload};
pub use session::SessionId;
