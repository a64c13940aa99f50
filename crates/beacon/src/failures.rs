// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bookkeeping for records whose delivery failed: the in-memory queue plus
//! an optional durable copy of each queued record.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use beacon_core::EventRecord;
use tracing::{debug, error};

use crate::error::Result;
use crate::queue::{FailedEvent, FailedEventQueue};
use crate::store::FailedEventStore;

pub struct FailedEvents {
	queue: FailedEventQueue,
	store: Option<Arc<dyn FailedEventStore>>,
	/// Store ids owned by this process: queued or being redelivered.
	tracked: Mutex<HashSet<i64>>,
}

impl FailedEvents {
	pub fn new(queue: FailedEventQueue, store: Option<Arc<dyn FailedEventStore>>) -> Self {
		Self {
			queue,
			store,
			tracked: Mutex::new(HashSet::new()),
		}
	}

	pub fn queue(&self) -> &FailedEventQueue {
		&self.queue
	}

	/// Queues a record after its first failed attempt, persisting it first
	/// when a store is configured.
	pub async fn record(&self, record: EventRecord) {
		let store_id = match &self.store {
			Some(store) => match store.insert(&record).await {
				Ok(id) => {
					self.track(id);
					Some(id)
				}
				Err(e) => {
					error!(error = %e, event_code = %record.event_code(), "Failed to persist failed event");
					None
				}
			},
			None => None,
		};

		self.push(FailedEvent::new(record).with_store_id(store_id)).await;
	}

	/// Puts a record back at the tail after another failed attempt. Its
	/// durable copy, if any, is kept.
	pub async fn requeue(&self, event: FailedEvent) {
		self.push(event).await;
	}

	pub fn pop_front(&self) -> Option<FailedEvent> {
		self.queue.pop_front()
	}

	/// Forgets a record after successful redelivery.
	pub async fn acknowledge(&self, event: FailedEvent) {
		self.forget(&event).await;
	}

	/// Loads stored records into the queue, oldest first. Records this
	/// process already holds are skipped, so repeated calls never duplicate
	/// an entry. Returns the number of records queued.
	pub async fn restore(&self) -> Result<usize> {
		let Some(store) = &self.store else {
			return Ok(0);
		};

		let mut count = 0;
		for entry in store.list().await? {
			if !self.track(entry.id) {
				continue;
			}
			self.push(FailedEvent::new(entry.record).with_store_id(Some(entry.id)))
				.await;
			count += 1;
		}
		debug!(count, "Restored persisted failed events");
		Ok(count)
	}

	/// Empties the queue and deletes the durable copies.
	pub async fn clear(&self) -> usize {
		let cleared = self.queue.clear();
		for event in &cleared {
			self.forget(event).await;
		}
		cleared.len()
	}

	async fn push(&self, event: FailedEvent) {
		if let Some(dropped) = self.queue.append(event) {
			self.forget(&dropped).await;
		}
	}

	async fn forget(&self, event: &FailedEvent) {
		let (Some(store), Some(id)) = (&self.store, event.store_id()) else {
			return;
		};
		self.tracked_ids().remove(&id);
		if let Err(e) = store.delete(id).await {
			error!(error = %e, store_id = id, "Failed to delete stored event");
		}
	}

	/// Returns false when `id` was already tracked.
	fn track(&self, id: i64) -> bool {
		self.tracked_ids().insert(id)
	}

	fn tracked_ids(&self) -> MutexGuard<'_, HashSet<i64>> {
		self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::queue::OverflowPolicy;
	use crate::store::MemoryStore;
	use beacon_core::{EventType, SessionId};

	fn record(code: &str) -> EventRecord {
		EventRecord::new(SessionId::from("s"), "u", code, code, EventType::Click, 1)
	}

	#[tokio::test]
	async fn test_record_persists_and_acknowledge_deletes() {
		let store = Arc::new(MemoryStore::new());
		let failures = FailedEvents::new(FailedEventQueue::new(), Some(store.clone()));

		failures.record(record("a")).await;
		assert_eq!(store.len(), 1);

		let event = failures.pop_front().unwrap();
		assert!(event.store_id().is_some());
		failures.acknowledge(event).await;
		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn test_requeue_keeps_durable_copy() {
		let store = Arc::new(MemoryStore::new());
		let failures = FailedEvents::new(FailedEventQueue::new(), Some(store.clone()));

		failures.record(record("a")).await;
		let event = failures.pop_front().unwrap();
		let id = event.store_id();
		failures.requeue(event).await;

		assert_eq!(store.len(), 1);
		assert_eq!(failures.pop_front().unwrap().store_id(), id);
	}

	#[tokio::test]
	async fn test_eviction_deletes_durable_copy() {
		let store = Arc::new(MemoryStore::new());
		let failures = FailedEvents::new(
			FailedEventQueue::bounded(1, OverflowPolicy::DropOldest),
			Some(store.clone()),
		);

		failures.record(record("old")).await;
		failures.record(record("new")).await;

		assert_eq!(failures.queue().len(), 1);
		let remaining = store.list().await.unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].record.event_code(), "new");
	}

	#[tokio::test]
	async fn test_restore_loads_in_store_order() {
		let store = Arc::new(MemoryStore::new());
		store.insert(&record("first")).await.unwrap();
		store.insert(&record("second")).await.unwrap();

		let failures = FailedEvents::new(FailedEventQueue::new(), Some(store.clone()));
		assert_eq!(failures.restore().await.unwrap(), 2);

		assert_eq!(failures.pop_front().unwrap().record().event_code(), "first");
		assert_eq!(failures.pop_front().unwrap().record().event_code(), "second");
	}

	#[tokio::test]
	async fn test_restore_skips_records_already_queued() {
		let store = Arc::new(MemoryStore::new());
		store.insert(&record("from_last_run")).await.unwrap();

		let failures = FailedEvents::new(FailedEventQueue::new(), Some(store.clone()));
		failures.record(record("this_run")).await;

		assert_eq!(failures.restore().await.unwrap(), 1);
		assert_eq!(failures.restore().await.unwrap(), 0);

		let codes: Vec<String> = failures
			.queue()
			.snapshot()
			.iter()
			.map(|e| e.record().event_code().to_string())
			.collect();
		assert_eq!(codes, vec!["this_run", "from_last_run"]);
	}

	#[tokio::test]
	async fn test_restore_skips_record_being_redelivered() {
		let store = Arc::new(MemoryStore::new());
		let failures = FailedEvents::new(FailedEventQueue::new(), Some(store.clone()));
		failures.record(record("in_flight")).await;

		let in_flight = failures.pop_front().unwrap();
		assert_eq!(failures.restore().await.unwrap(), 0);
		assert!(failures.queue().is_empty());

		failures.acknowledge(in_flight).await;
		assert!(store.list().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_without_store() {
		let failures = FailedEvents::new(FailedEventQueue::new(), None);
		failures.record(record("a")).await;
		assert_eq!(failures.restore().await.unwrap(), 0);
		assert_eq!(failures.clear().await, 1);
		assert!(failures.queue().is_empty());
	}
}
