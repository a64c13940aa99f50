// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Backoff policy for delivery attempts.
//!
//! [`retry`] repeats one HTTP attempt in place; the failed-event drainer
//! reuses [`RetryConfig::delay_for`] to pace redeliveries.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Transient statuses: throttling, timeouts and gateway failures.
pub fn is_retryable_status(status: u16) -> bool {
	matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl RetryConfig {
	/// One attempt, no in-place retries.
	pub fn single_attempt() -> Self {
		Self {
			max_attempts: 1,
			..Self::default()
		}
	}

	/// Pause before the attempt after `failures` consecutive failures,
	/// counted from one. Jitter scales the capped value into `[0.5, 1.5)`.
	pub fn delay_for(&self, failures: u32) -> Duration {
		let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
		let capped = (self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent))
			.min(self.max_delay.as_secs_f64());
		let secs = if self.jitter {
			capped * (0.5 + fastrand::f64())
		} else {
			capped
		};
		Duration::from_secs_f64(secs.max(0.0))
	}
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		self.is_timeout()
			|| self.is_connect()
			|| self.status().is_some_and(|s| is_retryable_status(s.as_u16()))
	}
}

/// Runs `attempt` until it succeeds, fails permanently, or `max_attempts`
/// is reached. The last error is returned.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut attempt: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Debug,
{
	let max_attempts = cfg.max_attempts.max(1);
	let mut failures = 0;

	loop {
		let err = match attempt().await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};
		failures += 1;

		if !err.is_retryable() || failures >= max_attempts {
			if max_attempts > 1 {
				warn!(error = ?err, failures, max_attempts, "Giving up on request");
			}
			return Err(err);
		}

		let delay = cfg.delay_for(failures);
		debug!(error = ?err, failures, delay_ms = delay.as_millis(), "Retrying request");
		tokio::time::sleep(delay).await;
	}
}
