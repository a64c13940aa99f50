// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The beacon client: event dispatch, page tracking and failure recovery.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use beacon_common_http::RetryConfig;
use beacon_core::{AppInfo, Environment, EventRecord, EventType, Extra, PageSnapshot, SessionId};
use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::BeaconConfig;
use crate::connectivity::{ConnectivityMonitor, Reachability};
use crate::drain::{DrainReport, ExponentialDelay, RetryDelay, RetryDrainer};
use crate::error::{BeaconError, Result};
use crate::failures::FailedEvents;
use crate::geo::{GeoResolver, HttpGeoResolver, NoGeoResolver};
use crate::page::PageTracker;
use crate::queue::{FailedEventQueue, OverflowPolicy};
use crate::send::SendPath;
use crate::store::FailedEventStore;
use crate::transport::{parse_endpoint, HttpTransport, Transport};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_GEO_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Invoked with the failed record when an event's first delivery attempt fails.
pub type ErrorCallback = Box<dyn FnOnce(EventRecord) + Send + 'static>;

/// An event to submit.
///
/// ```
/// use beacon::{NewEvent, Properties};
///
/// let event = NewEvent::click("buy", "Buy button")
///     .belong_page("checkout")
///     .extra(Properties::new().insert("sku", "A-1"));
/// ```
pub struct NewEvent {
	code: String,
	name: String,
	event_type: EventType,
	timestamp_ms: Option<i64>,
	belong_page: Option<String>,
	extra: Option<Extra>,
	on_error: Option<ErrorCallback>,
}

impl NewEvent {
	pub fn new(code: impl Into<String>, name: impl Into<String>, event_type: EventType) -> Self {
		Self {
			code: code.into(),
			name: name.into(),
			event_type,
			timestamp_ms: None,
			belong_page: None,
			extra: None,
			on_error: None,
		}
	}

	pub fn page_in(code: impl Into<String>, name: impl Into<String>) -> Self {
		Self::new(code, name, EventType::PageIn)
	}

	pub fn page_out(code: impl Into<String>, name: impl Into<String>) -> Self {
		Self::new(code, name, EventType::PageOut)
	}

	pub fn click(code: impl Into<String>, name: impl Into<String>) -> Self {
		Self::new(code, name, EventType::Click)
	}

	pub fn expose(code: impl Into<String>, name: impl Into<String>) -> Self {
		Self::new(code, name, EventType::Expose)
	}

	/// Milliseconds since the epoch. Defaults to the submit time.
	pub fn timestamp(mut self, timestamp_ms: i64) -> Self {
		self.timestamp_ms = Some(timestamp_ms);
		self
	}

	pub fn belong_page(mut self, page_code: impl Into<String>) -> Self {
		self.belong_page = Some(page_code.into());
		self
	}

	pub fn extra(mut self, extra: impl Into<Extra>) -> Self {
		self.extra = Some(extra.into());
		self
	}

	/// Sets a callback for a failed first attempt. It is not invoked again
	/// when later retries fail.
	pub fn on_error<F>(mut self, callback: F) -> Self
	where
		F: FnOnce(EventRecord) + Send + 'static,
	{
		self.on_error = Some(Box::new(callback));
		self
	}
}

impl fmt::Debug for NewEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NewEvent")
			.field("code", &self.code)
			.field("name", &self.name)
			.field("event_type", &self.event_type)
			.field("timestamp_ms", &self.timestamp_ms)
			.field("belong_page", &self.belong_page)
			.field("extra", &self.extra)
			.field("on_error", &self.on_error.is_some())
			.finish()
	}
}

/// Builder for constructing a [`Beacon`].
pub struct BeaconBuilder {
	user_id: Option<String>,
	endpoint: Option<String>,
	system_version: String,
	app_version: String,
	environment: Option<Environment>,
	request_timeout: Option<Duration>,
	geo_timeout: Option<Duration>,
	geo_endpoint: Option<String>,
	config: Option<BeaconConfig>,
	retry_config: RetryConfig,
	retry_delay: Option<Arc<dyn RetryDelay>>,
	max_queue_size: Option<usize>,
	overflow_policy: OverflowPolicy,
	transport: Option<Arc<dyn Transport>>,
	geo_resolver: Option<Arc<dyn GeoResolver>>,
	connectivity: Option<Arc<dyn ConnectivityMonitor>>,
	store: Option<Arc<dyn FailedEventStore>>,
	runtime: Option<Handle>,
	shutdown_grace: Duration,
}

impl BeaconBuilder {
	pub fn new() -> Self {
		Self {
			user_id: None,
			endpoint: None,
			system_version: String::new(),
			app_version: String::new(),
			environment: None,
			request_timeout: None,
			geo_timeout: None,
			geo_endpoint: None,
			config: None,
			retry_config: RetryConfig::single_attempt(),
			retry_delay: None,
			max_queue_size: None,
			overflow_policy: OverflowPolicy::default(),
			transport: None,
			geo_resolver: None,
			connectivity: None,
			store: None,
			runtime: None,
			shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
		}
	}

	/// Uses a resolved configuration for every value not set explicitly.
	/// Setter calls win whether they come before or after this one.
	pub fn config(mut self, config: &BeaconConfig) -> Self {
		self.config = Some(config.clone());
		self
	}

	/// Identifies the user in every payload.
	pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	/// Collector URL.
	///
	/// Example: `https://collect.example/ev`
	pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = Some(endpoint.into());
		self
	}

	pub fn system_version(mut self, version: impl Into<String>) -> Self {
		self.system_version = version.into();
		self
	}

	pub fn app_version(mut self, version: impl Into<String>) -> Self {
		self.app_version = version.into();
		self
	}

	/// Overrides the build-mode default.
	pub fn environment(mut self, env: Environment) -> Self {
		self.environment = Some(env);
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);
		self
	}

	/// Upper bound on a location lookup before sending without it.
	pub fn geo_timeout(mut self, timeout: Duration) -> Self {
		self.geo_timeout = Some(timeout);
		self
	}

	/// Resolves location through an HTTP JSON endpoint.
	pub fn geo_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.geo_endpoint = Some(endpoint.into());
		self
	}

	/// Transport-level retries for each delivery attempt.
	pub fn retry_config(mut self, config: RetryConfig) -> Self {
		self.retry_config = config;
		self
	}

	/// Pause between failed redeliveries while draining.
	pub fn retry_delay(mut self, delay: impl RetryDelay + 'static) -> Self {
		self.retry_delay = Some(Arc::new(delay));
		self
	}

	pub fn max_queue_size(mut self, max: usize) -> Self {
		self.max_queue_size = Some(max);
		self
	}

	pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
		self.overflow_policy = policy;
		self
	}

	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn geo_resolver(mut self, resolver: Arc<dyn GeoResolver>) -> Self {
		self.geo_resolver = Some(resolver);
		self
	}

	/// Drains the failed-event queue whenever the monitor reports the
	/// network reachable.
	pub fn connectivity(mut self, monitor: Arc<dyn ConnectivityMonitor>) -> Self {
		self.connectivity = Some(monitor);
		self
	}

	/// Keeps a durable copy of every queued record.
	pub fn store(mut self, store: Arc<dyn FailedEventStore>) -> Self {
		self.store = Some(store);
		self
	}

	/// Runtime for background sends. Defaults to the current runtime.
	pub fn runtime(mut self, handle: Handle) -> Self {
		self.runtime = Some(handle);
		self
	}

	/// How long [`Beacon::shutdown`] waits for in-flight sends.
	pub fn shutdown_grace(mut self, grace: Duration) -> Self {
		self.shutdown_grace = grace;
		self
	}

	pub fn build(self) -> Result<Beacon> {
		let config = self.config.as_ref();
		let request_timeout = self
			.request_timeout
			.or(config.map(|c| c.request_timeout))
			.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
		let geo_timeout = self
			.geo_timeout
			.or(config.map(|c| c.geo_timeout))
			.unwrap_or(DEFAULT_GEO_TIMEOUT);
		let geo_endpoint = self
			.geo_endpoint
			.or_else(|| config.and_then(|c| c.geo_endpoint.clone()));
		let environment = self.environment.or(config.map(|c| c.env));
		let max_queue_size = self.max_queue_size.or(config.and_then(|c| c.max_queue_size));
		let retry_delay: Arc<dyn RetryDelay> = match (self.retry_delay, config) {
			(Some(delay), _) => delay,
			(None, Some(c)) => Arc::new(ExponentialDelay::new(
				c.retry_base_delay,
				c.retry_max_delay,
				2.0,
				true,
			)),
			(None, None) => Arc::new(ExponentialDelay::default()),
		};

		let user_id = self
			.user_id
			.filter(|id| !id.is_empty())
			.ok_or(BeaconError::MissingUserId)?;
		let endpoint = self
			.endpoint
			.or_else(|| config.and_then(|c| c.endpoint.clone()))
			.ok_or_else(|| BeaconError::InvalidEndpoint("collector endpoint is required".to_string()))?;
		let endpoint = parse_endpoint(&endpoint)?;

		let runtime = match self.runtime {
			Some(handle) => handle,
			None => Handle::try_current().map_err(|_| BeaconError::NoRuntime)?,
		};

		let transport: Arc<dyn Transport> = match self.transport {
			Some(transport) => transport,
			None => Arc::new(HttpTransport::new(
				endpoint.as_str(),
				request_timeout,
				self.retry_config,
			)?),
		};

		let geo_resolver: Arc<dyn GeoResolver> = match (self.geo_resolver, geo_endpoint) {
			(Some(resolver), _) => resolver,
			(None, Some(geo_endpoint)) => Arc::new(HttpGeoResolver::new(&geo_endpoint, geo_timeout)?),
			(None, None) => Arc::new(NoGeoResolver),
		};

		let app = AppInfo {
			system_version: self.system_version,
			app_version: self.app_version,
			env: environment.unwrap_or_else(Environment::from_build),
		};
		let env = app.env;

		let send = Arc::new(SendPath::new(transport, geo_resolver, app, geo_timeout));

		let queue = match max_queue_size {
			Some(max) => FailedEventQueue::bounded(max, self.overflow_policy),
			None => FailedEventQueue::new(),
		};
		let failures = Arc::new(FailedEvents::new(queue, self.store));

		let cancel = CancellationToken::new();
		let tasks = TaskTracker::new();
		let drainer = Arc::new(RetryDrainer::new(
			Arc::clone(&send),
			Arc::clone(&failures),
			retry_delay,
			cancel.clone(),
			tasks.clone(),
			runtime.clone(),
		));

		if let Some(monitor) = &self.connectivity {
			let rx = monitor.subscribe();
			tasks.spawn_on(
				watch_connectivity(rx, Arc::clone(&drainer), cancel.clone()),
				&runtime,
			);
		}

		let inner = Arc::new(BeaconInner {
			user_id,
			session: RwLock::new(SessionId::generate()),
			page: PageTracker::new(),
			send,
			failures,
			drainer,
			connectivity: self.connectivity,
			cancel,
			tasks,
			runtime,
			closed: AtomicBool::new(false),
			shutdown_grace: self.shutdown_grace,
		});

		info!(
			endpoint = %endpoint,
			env = %env,
			max_queue_size = ?inner.failures.queue().max_len(),
			"Beacon client initialized"
		);

		Ok(Beacon { inner })
	}
}

impl Default for BeaconBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Triggers a drain on every transition into [`Reachability::Reachable`].
async fn watch_connectivity(
	mut rx: watch::Receiver<Reachability>,
	drainer: Arc<RetryDrainer>,
	cancel: CancellationToken,
) {
	let mut last = *rx.borrow_and_update();
	if last == Reachability::Reachable {
		debug!("Network reachable at startup");
		drainer.trigger();
	}

	loop {
		tokio::select! {
			_ = cancel.cancelled() => break,
			changed = rx.changed() => {
				if changed.is_err() {
					debug!("Connectivity monitor dropped");
					break;
				}
				let current = *rx.borrow_and_update();
				if current == Reachability::Reachable && last != Reachability::Reachable {
					info!("Network reachable, retrying failed events");
					drainer.trigger();
				}
				last = current;
			}
		}
	}
}

struct BeaconInner {
	user_id: String,
	session: RwLock<SessionId>,
	page: PageTracker,
	send: Arc<SendPath>,
	failures: Arc<FailedEvents>,
	drainer: Arc<RetryDrainer>,
	connectivity: Option<Arc<dyn ConnectivityMonitor>>,
	cancel: CancellationToken,
	tasks: TaskTracker,
	runtime: Handle,
	closed: AtomicBool,
	shutdown_grace: Duration,
}

impl Drop for BeaconInner {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

/// Analytics client.
///
/// Cloning is cheap; clones share page state, session and the failed-event
/// queue.
///
/// # Example
///
/// ```ignore
/// let beacon = Beacon::initialize("u1", "https://collect.example/ev", "17.0", "2.3")?;
///
/// beacon.submit(NewEvent::page_in("home", "Home"))?;
/// beacon.submit(NewEvent::page_in("settings", "Settings"))?;
///
/// beacon.shutdown().await?;
/// ```
#[derive(Clone)]
pub struct Beacon {
	inner: Arc<BeaconInner>,
}

impl Beacon {
	pub fn builder() -> BeaconBuilder {
		BeaconBuilder::new()
	}

	/// Builds a client with default settings on the current runtime.
	pub fn initialize(
		user_id: impl Into<String>,
		endpoint: impl Into<String>,
		system_version: impl Into<String>,
		app_version: impl Into<String>,
	) -> Result<Self> {
		Self::builder()
			.user_id(user_id)
			.endpoint(endpoint)
			.system_version(system_version)
			.app_version(app_version)
			.build()
	}

	/// Submits an event for background delivery. Never waits on the network.
	///
	/// Entering a page while another is current first emits a `PageOut` for
	/// the previous page, stamped one millisecond before the new event.
	pub fn submit(&self, event: NewEvent) -> Result<()> {
		if self.is_closed() {
			return Err(BeaconError::ClientShutdown);
		}

		let NewEvent {
			code,
			name,
			event_type,
			timestamp_ms,
			belong_page,
			extra,
			on_error,
		} = event;
		let timestamp_ms = timestamp_ms.unwrap_or_else(|| Utc::now().timestamp_millis());
		let session_id = self.session_id();

		if event_type.is_page_in() {
			let entered = PageSnapshot::new(code.clone(), name.clone(), extra.clone());
			if let Some(previous) = self.inner.page.enter(entered) {
				debug!(from = %previous.code, to = %code, "Page transition");
				let leave = EventRecord::new(
					session_id.clone(),
					self.inner.user_id.clone(),
					previous.code.clone(),
					previous.name,
					EventType::PageOut,
					timestamp_ms.saturating_sub(1),
				)
				.with_belong_page(Some(previous.code));
				self.dispatch(leave, None);
			}
		}

		let record = EventRecord::new(
			session_id,
			self.inner.user_id.clone(),
			code,
			name,
			event_type,
			timestamp_ms,
		)
		.with_belong_page(belong_page)
		.with_extra(extra);
		self.dispatch(record, on_error);
		Ok(())
	}

	fn dispatch(&self, record: EventRecord, on_error: Option<ErrorCallback>) {
		let send = Arc::clone(&self.inner.send);
		let failures = Arc::clone(&self.inner.failures);

		self.inner.tasks.spawn_on(
			async move {
				let Err(e) = send.deliver(&record).await else {
					return;
				};
				warn!(
					error = %e,
					event_code = %record.event_code(),
					event_type = %record.event_type().type_code(),
					"Event delivery failed, queueing for retry"
				);
				match on_error {
					Some(callback) => {
						failures.record(record.clone()).await;
						callback(record);
					}
					None => failures.record(record).await,
				}
			},
			&self.inner.runtime,
		);
	}

	/// The page most recently entered, or `None` before the first one.
	pub fn current_page_snapshot(&self) -> Option<PageSnapshot> {
		self.inner.page.snapshot()
	}

	/// Code of the current page, empty before the first one.
	pub fn current_page_code(&self) -> String {
		self.inner.page.current_code()
	}

	/// Re-enters a previously captured page. Does nothing for an empty code.
	pub fn restore_last_page(&self, snapshot: &PageSnapshot) -> Result<()> {
		if snapshot.is_empty() {
			return Ok(());
		}

		let mut event = NewEvent::page_in(snapshot.code.clone(), snapshot.name.clone())
			.belong_page(snapshot.code.clone());
		event.extra = snapshot.extra.clone();
		self.submit(event)
	}

	/// Starts a new session and returns its id. Page state is kept.
	pub fn new_session(&self) -> SessionId {
		let session_id = SessionId::generate();
		let mut current = self
			.inner
			.session
			.write()
			.unwrap_or_else(PoisonError::into_inner);
		*current = session_id.clone();
		info!(session_id = %session_id, "Started new session");
		session_id
	}

	pub fn session_id(&self) -> SessionId {
		self.inner
			.session
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	pub fn user_id(&self) -> &str {
		&self.inner.user_id
	}

	pub fn app_info(&self) -> &AppInfo {
		self.inner.send.app()
	}

	/// Starts draining the failed-event queue in the background. Returns
	/// false if a drain is already running or the client is shut down.
	pub fn retry_failed(&self) -> bool {
		if self.is_closed() {
			return false;
		}
		self.inner.drainer.trigger()
	}

	/// Drains the failed-event queue on the calling task. Returns `None` if
	/// a drain is already running or the client is shut down.
	pub async fn drain_failed(&self) -> Option<DrainReport> {
		if self.is_closed() {
			return None;
		}
		self.inner.drainer.drain().await
	}

	pub fn is_draining(&self) -> bool {
		self.inner.drainer.is_draining()
	}

	/// Queues every record held by the store, oldest first, and starts a
	/// drain if the network is known to be reachable.
	pub async fn restore_persisted(&self) -> Result<usize> {
		let restored = self.inner.failures.restore().await?;
		if restored > 0 && self.reachability() == Some(Reachability::Reachable) {
			self.retry_failed();
		}
		Ok(restored)
	}

	/// Last state reported by the connectivity monitor, if one is configured.
	pub fn reachability(&self) -> Option<Reachability> {
		self.inner.connectivity.as_ref().map(|monitor| {
			let rx = monitor.subscribe();
			let current = *rx.borrow();
			current
		})
	}

	pub fn failed_len(&self) -> usize {
		self.inner.failures.queue().len()
	}

	/// Records waiting for redelivery, front of the queue first.
	pub fn failed_events(&self) -> Vec<EventRecord> {
		self.inner
			.failures
			.queue()
			.snapshot()
			.into_iter()
			.map(|event| event.into_record())
			.collect()
	}

	/// Discards every queued record and its stored copy. Returns the number
	/// discarded.
	pub async fn clear_failed(&self) -> usize {
		self.inner.failures.clear().await
	}

	/// Stops background work and waits for in-flight sends, up to the
	/// configured grace period. Records still queued stay in the store.
	pub async fn shutdown(&self) -> Result<()> {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		self.inner.cancel.cancel();
		self.inner.tasks.close();

		if tokio::time::timeout(self.inner.shutdown_grace, self.inner.tasks.wait())
			.await
			.is_err()
		{
			warn!(
				in_flight = self.inner.tasks.len(),
				"Shutdown grace period elapsed with sends in flight"
			);
		}

		info!(failed_len = self.failed_len(), "Beacon client shutdown");
		Ok(())
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}
}

impl fmt::Debug for Beacon {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Beacon")
			.field("user_id", &self.inner.user_id)
			.field("session_id", &self.session_id())
			.field("failed_len", &self.failed_len())
			.field("closed", &self.is_closed())
			.finish()
	}
}
