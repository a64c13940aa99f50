// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracks the page the user is currently on.
//!
//! The tracker is the single source of truth for "current page". Entering a
//! page swaps the context under one mutex and hands back the page that was
//! left, so concurrent page entries each observe a distinct predecessor.

use std::sync::{Mutex, MutexGuard, PoisonError};

use beacon_core::PageSnapshot;

#[derive(Debug, Default)]
pub struct PageTracker {
	current: Mutex<Option<PageSnapshot>>,
}

impl PageTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes `page` current and returns the page that was current before,
	/// if there was one.
	pub fn enter(&self, page: PageSnapshot) -> Option<PageSnapshot> {
		let previous = std::mem::replace(&mut *self.lock(), Some(page));
		previous.filter(|p| !p.is_empty())
	}

	/// The current page, or `None` if no page has been entered yet.
	pub fn snapshot(&self) -> Option<PageSnapshot> {
		self.lock().as_ref().filter(|p| !p.is_empty()).cloned()
	}

	/// Code of the current page, empty if none.
	pub fn current_code(&self) -> String {
		self.snapshot().map(|p| p.code).unwrap_or_default()
	}

	fn lock(&self) -> MutexGuard<'_, Option<PageSnapshot>> {
		self.current.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
