// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The in-memory failed-event queue.
//!
//! All operations take one mutex and perform a single collection mutation,
//! so the lock is never held across a network call. Producers are first
//! attempts that failed; the single consumer is the retry drainer.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use beacon_core::EventRecord;
use tracing::warn;

/// A failed record waiting for redelivery.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEvent {
	record: EventRecord,
	store_id: Option<i64>,
}

impl FailedEvent {
	pub fn new(record: EventRecord) -> Self {
		Self {
			record,
			store_id: None,
		}
	}

	pub fn with_store_id(mut self, store_id: Option<i64>) -> Self {
		self.store_id = store_id;
		self
	}

	pub fn record(&self) -> &EventRecord {
		&self.record
	}

	/// Id of the durable copy, if one was written.
	pub fn store_id(&self) -> Option<i64> {
		self.store_id
	}

	pub fn into_record(self) -> EventRecord {
		self.record
	}
}

/// What to do when appending to a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
	/// Evict the oldest entry to make room.
	#[default]
	DropOldest,
	/// Reject the incoming entry.
	DropNewest,
}

#[derive(Debug, Default)]
pub struct FailedEventQueue {
	entries: Mutex<VecDeque<FailedEvent>>,
	max_len: Option<usize>,
	overflow_policy: OverflowPolicy,
}

impl FailedEventQueue {
	/// An unbounded queue.
	pub fn new() -> Self {
		Self::default()
	}

	/// A queue holding at most `max_len` entries. A zero bound keeps nothing.
	pub fn bounded(max_len: usize, overflow_policy: OverflowPolicy) -> Self {
		Self {
			entries: Mutex::new(VecDeque::new()),
			max_len: Some(max_len),
			overflow_policy,
		}
	}

	pub fn max_len(&self) -> Option<usize> {
		self.max_len
	}

	/// Appends to the tail. Returns the entry that was dropped if the queue
	/// was full.
	pub fn append(&self, event: FailedEvent) -> Option<FailedEvent> {
		let mut entries = self.lock();

		let Some(max_len) = self.max_len else {
			entries.push_back(event);
			return None;
		};

		if entries.len() < max_len {
			entries.push_back(event);
			return None;
		}

		let dropped = match self.overflow_policy {
			OverflowPolicy::DropOldest if max_len > 0 => {
				let oldest = entries.pop_front();
				entries.push_back(event);
				oldest
			}
			_ => Some(event),
		};

		if let Some(dropped) = &dropped {
			warn!(
				event_code = %dropped.record.event_code(),
				event_time = dropped.record.timestamp_ms(),
				max_len,
				"Dropped failed event due to queue overflow"
			);
		}
		dropped
	}

	pub fn pop_front(&self) -> Option<FailedEvent> {
		self.lock().pop_front()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	/// Copies the current contents, front first.
	pub fn snapshot(&self) -> Vec<FailedEvent> {
		self.lock().iter().cloned().collect()
	}

	/// Removes and returns everything.
	pub fn clear(&self) -> Vec<FailedEvent> {
		self.lock().drain(..).collect()
	}

	fn lock(&self) -> MutexGuard<'_, VecDeque<FailedEvent>> {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
