// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Replays the failed-event queue through the send path.
//!
//! At most one drain runs at a time. A drain pops the front record, attempts
//! redelivery, and on renewed failure puts the record back at the tail. It
//! keeps going until it observes an empty queue, so records that fail while
//! a drain is running are picked up by that same drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beacon_common_http::RetryConfig;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::failures::FailedEvents;
use crate::send::SendPath;

/// Pause between a failed redelivery and the next attempt.
pub trait RetryDelay: Send + Sync {
	/// `consecutive_failures` is at least 1 and resets after any success.
	fn delay(&self, consecutive_failures: u32) -> Duration;
}

/// Retries back to back.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl RetryDelay for NoDelay {
	fn delay(&self, _consecutive_failures: u32) -> Duration {
		Duration::ZERO
	}
}

/// Exponential backoff between consecutive failures.
#[derive(Debug, Clone)]
pub struct ExponentialDelay {
	config: RetryConfig,
}

impl ExponentialDelay {
	pub fn new(base_delay: Duration, max_delay: Duration, backoff_factor: f64, jitter: bool) -> Self {
		Self {
			config: RetryConfig {
				max_attempts: u32::MAX,
				base_delay,
				max_delay,
				backoff_factor,
				jitter,
			},
		}
	}
}

impl Default for ExponentialDelay {
	fn default() -> Self {
		Self::new(Duration::from_millis(200), Duration::from_secs(30), 2.0, true)
	}
}

impl RetryDelay for ExponentialDelay {
	fn delay(&self, consecutive_failures: u32) -> Duration {
		self.config.delay_for(consecutive_failures)
	}
}

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
	pub attempted: usize,
	pub delivered: usize,
	pub requeued: usize,
	pub cancelled: bool,
}

/// Holds the drain flag; releases it when dropped.
pub struct DrainGuard {
	drainer: Arc<RetryDrainer>,
}

impl Drop for DrainGuard {
	fn drop(&mut self) {
		self.drainer.draining.store(false, Ordering::SeqCst);
	}
}

pub struct RetryDrainer {
	send: Arc<SendPath>,
	failures: Arc<FailedEvents>,
	delay: Arc<dyn RetryDelay>,
	draining: AtomicBool,
	cancel: CancellationToken,
	tasks: TaskTracker,
	runtime: Handle,
}

impl RetryDrainer {
	pub fn new(
		send: Arc<SendPath>,
		failures: Arc<FailedEvents>,
		delay: Arc<dyn RetryDelay>,
		cancel: CancellationToken,
		tasks: TaskTracker,
		runtime: Handle,
	) -> Self {
		Self {
			send,
			failures,
			delay,
			draining: AtomicBool::new(false),
			cancel,
			tasks,
			runtime,
		}
	}

	pub fn is_draining(&self) -> bool {
		self.draining.load(Ordering::SeqCst)
	}

	/// Claims the drain flag, or returns `None` if a drain is in progress.
	pub fn try_claim(self: &Arc<Self>) -> Option<DrainGuard> {
		self.draining
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.ok()
			.map(|_| DrainGuard {
				drainer: Arc::clone(self),
			})
	}

	/// Starts a background drain. Returns false if one is already running.
	pub fn trigger(self: &Arc<Self>) -> bool {
		let Some(guard) = self.try_claim() else {
			debug!("Drain already in progress, ignoring trigger");
			return false;
		};

		let drainer = Arc::clone(self);
		self.tasks.spawn_on(
			async move {
				let mut guard = guard;
				loop {
					drainer.run().await;
					drop(guard);
					// Picks up records queued after the last empty check.
					if drainer.cancel.is_cancelled() || drainer.failures.queue().is_empty() {
						break;
					}
					match drainer.try_claim() {
						Some(next) => guard = next,
						None => break,
					}
				}
			},
			&self.runtime,
		);
		true
	}

	/// Drains on the current task. Returns `None` if a drain is already running.
	pub async fn drain(self: &Arc<Self>) -> Option<DrainReport> {
		let _guard = self.try_claim()?;
		Some(self.run().await)
	}

	async fn run(&self) -> DrainReport {
		let mut report = DrainReport::default();
		if self.failures.queue().is_empty() {
			return report;
		}

		info!(queue_len = self.failures.queue().len(), "Retrying failed events");
		let mut consecutive_failures = 0u32;

		loop {
			if self.cancel.is_cancelled() {
				report.cancelled = true;
				break;
			}

			let Some(event) = self.failures.pop_front() else {
				break;
			};
			report.attempted += 1;

			match self.send.deliver(event.record()).await {
				Ok(()) => {
					debug!(
						event_code = %event.record().event_code(),
						event_time = event.record().timestamp_ms(),
						"Redelivered failed event"
					);
					report.delivered += 1;
					consecutive_failures = 0;
					self.failures.acknowledge(event).await;
				}
				Err(e) => {
					warn!(
						error = %e,
						event_code = %event.record().event_code(),
						"Redelivery failed, requeueing"
					);
					report.requeued += 1;
					consecutive_failures = consecutive_failures.saturating_add(1);
					self.failures.requeue(event).await;

					let delay = self.delay.delay(consecutive_failures);
					if !delay.is_zero() {
						tokio::select! {
							_ = self.cancel.cancelled() => {
								report.cancelled = true;
								break;
							}
							_ = tokio::time::sleep(delay) => {}
						}
					}
				}
			}
		}

		info!(
			attempted = report.attempted,
			delivered = report.delivered,
			requeued = report.requeued,
			cancelled = report.cancelled,
			"Finished retrying failed events"
		);
		report
	}
}
