// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable storage for undeliverable events.
//!
//! Records are kept as JSON text so a store written by one version of the
//! client can be read back by the next one. The store is only consulted for
//! failed records; successful first attempts never touch it.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use beacon_core::EventRecord;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{instrument, warn};

use crate::error::Result;

/// A persisted failed record and its store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
	pub id: i64,
	pub record: EventRecord,
}

#[async_trait]
pub trait FailedEventStore: Send + Sync {
	/// Persists a record and returns its id.
	async fn insert(&self, record: &EventRecord) -> Result<i64>;
	/// Removes a record. Returns false if no such id existed.
	async fn delete(&self, id: i64) -> Result<bool>;
	/// All stored records, oldest first.
	async fn list(&self) -> Result<Vec<StoredEvent>>;
}

/// In-process store. Contents do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
	inner: Mutex<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
	next_id: i64,
	records: BTreeMap<i64, EventRecord>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.lock().records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
		self.inner
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
	}
}

#[async_trait]
impl FailedEventStore for MemoryStore {
	async fn insert(&self, record: &EventRecord) -> Result<i64> {
		let mut inner = self.lock();
		inner.next_id += 1;
		let id = inner.next_id;
		inner.records.insert(id, record.clone());
		Ok(id)
	}

	async fn delete(&self, id: i64) -> Result<bool> {
		Ok(self.lock().records.remove(&id).is_some())
	}

	async fn list(&self) -> Result<Vec<StoredEvent>> {
		Ok(self
			.lock()
			.records
			.iter()
			.map(|(id, record)| StoredEvent {
				id: *id,
				record: record.clone(),
			})
			.collect())
	}
}

/// SQLite-backed store.
pub struct SqliteStore {
	pool: SqlitePool,
}

impl SqliteStore {
	/// Wraps an existing pool. Call [`SqliteStore::migrate`] before use.
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Opens (creating if needed) the database at `url` and ensures the schema.
	///
	/// `url` is a sqlx connection string such as `sqlite://events.db?mode=rwc`.
	pub async fn connect(url: &str) -> Result<Self> {
		let pool = SqlitePool::connect(url).await?;
		let store = Self::new(pool);
		store.migrate().await?;
		Ok(store)
	}

	pub async fn migrate(&self) -> Result<()> {
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS failed_events (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				data TEXT NOT NULL,
				created_at TEXT NOT NULL
			)
			"#,
		)
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}

#[async_trait]
impl FailedEventStore for SqliteStore {
	#[instrument(skip(self, record), fields(event_code = %record.event_code()))]
	async fn insert(&self, record: &EventRecord) -> Result<i64> {
		let data = serde_json::to_string(record)
			.map_err(|e| crate::error::BeaconError::Serialization(e.to_string()))?;

		let result = sqlx::query(
			r#"
			INSERT INTO failed_events (data, created_at)
			VALUES (?, ?)
			"#,
		)
		.bind(data)
		.bind(Utc::now().to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(result.last_insert_rowid())
	}

	#[instrument(skip(self))]
	async fn delete(&self, id: i64) -> Result<bool> {
		let result = sqlx::query(
			r#"
			DELETE FROM failed_events WHERE id = ?
			"#,
		)
		.bind(id)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[instrument(skip(self))]
	async fn list(&self) -> Result<Vec<StoredEvent>> {
		let rows = sqlx::query_as::<_, (i64, String)>(
			r#"
			SELECT id, data
			FROM failed_events
			ORDER BY id ASC
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		let mut events = Vec::with_capacity(rows.len());
		let mut unreadable = Vec::new();
		for (id, data) in rows {
			match serde_json::from_str::<EventRecord>(&data) {
				Ok(record) => events.push(StoredEvent { id, record }),
				Err(e) => {
					warn!(id, error = %e, "Discarding unreadable stored event");
					unreadable.push(id);
				}
			}
		}
		for id in unreadable {
			self.delete(id).await?;
		}
		Ok(events)
	}
}
