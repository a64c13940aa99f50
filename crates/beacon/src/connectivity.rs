// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Network reachability signals.
//!
//! A [`ConnectivityMonitor`] publishes the current [`Reachability`] through a
//! `tokio::sync::watch` channel. The client only reacts to transitions into
//! [`Reachability::Reachable`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{BeaconError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reachability {
	#[default]
	Unknown,
	Unreachable,
	Reachable,
}

pub trait ConnectivityMonitor: Send + Sync {
	fn subscribe(&self) -> watch::Receiver<Reachability>;
}

/// Publishes `value` only if it differs from the current state.
fn publish(tx: &watch::Sender<Reachability>, value: Reachability) -> bool {
	tx.send_if_modified(|current| {
		if *current == value {
			false
		} else {
			*current = value;
			true
		}
	})
}

/// A monitor driven by the host, e.g. from a platform reachability callback.
#[derive(Debug)]
pub struct ManualConnectivity {
	tx: watch::Sender<Reachability>,
}

impl ManualConnectivity {
	pub fn new() -> Self {
		Self::with_initial(Reachability::Unknown)
	}

	pub fn with_initial(initial: Reachability) -> Self {
		let (tx, _rx) = watch::channel(initial);
		Self { tx }
	}

	/// Records a new state. Returns true if it changed.
	pub fn set(&self, reachability: Reachability) -> bool {
		publish(&self.tx, reachability)
	}

	pub fn current(&self) -> Reachability {
		*self.tx.borrow()
	}
}

impl Default for ManualConnectivity {
	fn default() -> Self {
		Self::new()
	}
}

impl ConnectivityMonitor for ManualConnectivity {
	fn subscribe(&self) -> watch::Receiver<Reachability> {
		self.tx.subscribe()
	}
}

/// Polls a URL with `HEAD` requests.
///
/// Any HTTP response counts as reachable; a transport error counts as
/// unreachable. Polling stops when the monitor is dropped.
pub struct ProbeConnectivity {
	tx: Arc<watch::Sender<Reachability>>,
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}

impl ProbeConnectivity {
	/// Starts polling on the current tokio runtime.
	pub fn spawn(probe_url: &str, interval: Duration, request_timeout: Duration) -> Result<Self> {
		let url = Url::parse(probe_url)
			.map_err(|e| BeaconError::Config(format!("invalid probe url {probe_url}: {e}")))?;
		let http_client = beacon_common_http::builder()
			.timeout(request_timeout)
			.build()
			.map_err(BeaconError::RequestFailed)?;
		let runtime = tokio::runtime::Handle::try_current().map_err(|_| BeaconError::NoRuntime)?;

		let (tx, _rx) = watch::channel(Reachability::Unknown);
		let tx = Arc::new(tx);
		let cancel = CancellationToken::new();

		let handle = runtime.spawn(run_probe(
			http_client,
			url,
			interval,
			Arc::clone(&tx),
			cancel.clone(),
		));

		Ok(Self { tx, cancel, handle })
	}

	pub fn current(&self) -> Reachability {
		*self.tx.borrow()
	}

	pub fn is_running(&self) -> bool {
		!self.handle.is_finished()
	}
}

impl ConnectivityMonitor for ProbeConnectivity {
	fn subscribe(&self) -> watch::Receiver<Reachability> {
		self.tx.subscribe()
	}
}

impl Drop for ProbeConnectivity {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

async fn run_probe(
	http_client: Client,
	url: Url,
	interval: Duration,
	tx: Arc<watch::Sender<Reachability>>,
	cancel: CancellationToken,
) {
	info!(url = %url, interval_ms = interval.as_millis(), "Starting connectivity probe");

	loop {
		let state = match http_client.head(url.clone()).send().await {
			Ok(_) => Reachability::Reachable,
			Err(e) => {
				debug!(error = %e, "Connectivity probe failed");
				Reachability::Unreachable
			}
		};

		if publish(&tx, state) {
			info!(reachability = ?state, "Connectivity changed");
		}

		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = tokio::time::sleep(interval) => {}
		}
	}

	debug!("Connectivity probe stopped");
}
