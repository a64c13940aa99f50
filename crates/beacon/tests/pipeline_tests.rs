// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beacon::{
	Beacon, Environment, ManualConnectivity, NewEvent, NoDelay, Properties, Reachability,
	SqliteStore, WirePayload,
};
use wiremock::matchers::{method, path};
use tracing_subscriber::EnvFilter;
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Routes client logs to the test harness. Filter with `RUST_LOG`.
fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

async fn eventually<F: Fn() -> bool>(condition: F) {
	for _ in 0..400 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("condition not reached");
}

async fn received(server: &MockServer) -> Vec<Request> {
	server.received_requests().await.unwrap_or_default()
}

fn payloads(requests: &[Request]) -> Vec<WirePayload> {
	let mut payloads: Vec<WirePayload> = requests
		.iter()
		.map(|r| r.body_json::<WirePayload>().unwrap())
		.collect();
	payloads.sort_by_key(|p| p.event_time);
	payloads
}

async fn collector(status: u16) -> MockServer {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/ev"))
		.respond_with(ResponseTemplate::new(status))
		.mount(&server)
		.await;
	server
}

#[tokio::test]
async fn test_page_transition_scenario() {
	init_tracing();
	let server = collector(200).await;
	let beacon = Beacon::builder()
		.user_id("u1")
		.endpoint(format!("{}/ev", server.uri()))
		.system_version("17.0")
		.app_version("2.3")
		.environment(Environment::Dev)
		.build()
		.unwrap();

	beacon
		.submit(NewEvent::page_in("home", "Home").timestamp(1_700_000_000_000))
		.unwrap();
	beacon
		.submit(NewEvent::page_in("settings", "Settings").timestamp(1_700_000_005_000))
		.unwrap();
	beacon.shutdown().await.unwrap();

	let sent = payloads(&received(&server).await);
	assert_eq!(sent.len(), 3);

	let home = &sent[0];
	assert_eq!(home.event_code, "home");
	assert_eq!(home.event_type, "page_in");
	assert_eq!(home.attr_page, "");
	assert_eq!(home.uuid, "u1");
	assert_eq!(home.system_version, "17.0");
	assert_eq!(home.app_version, "2.3");
	assert_eq!(home.env, Environment::Dev);

	let leave = &sent[1];
	assert_eq!(leave.event_code, "home");
	assert_eq!(leave.event_type, "page_out");
	assert_eq!(leave.event_time, 1_700_000_004_999);
	assert_eq!(leave.attr_page, "home");

	let settings = &sent[2];
	assert_eq!(settings.event_code, "settings");
	assert_eq!(settings.event_type, "page_in");
	assert_eq!(settings.event_time, 1_700_000_005_000);
	assert_eq!(settings.session_id, home.session_id);
}

#[tokio::test]
async fn test_wire_body_fields() {
	init_tracing();
	let server = collector(200).await;
	let beacon = Beacon::initialize("u1", format!("{}/ev", server.uri()), "17.0", "2.3").unwrap();

	beacon
		.submit(
			NewEvent::click("buy", "Buy")
				.belong_page("checkout")
				.extra(Properties::new().insert("a", 1).insert("b", "x y")),
		)
		.unwrap();
	beacon.shutdown().await.unwrap();

	let requests = received(&server).await;
	assert_eq!(requests.len(), 1);
	let body: serde_json::Value = requests[0].body_json().unwrap();
	let object = body.as_object().unwrap();

	let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
	keys.sort_unstable();
	assert_eq!(
		keys,
		vec![
			"appVersion",
			"attrPage",
			"cityCode",
			"countryCode",
			"env",
			"eventCode",
			"eventContent",
			"eventName",
			"eventTime",
			"eventType",
			"sessionId",
			"systemVersion",
			"userIp",
			"uuid",
		]
	);
	assert_eq!(object["eventName"], "click_Buy");
	assert_eq!(object["attrPage"], "checkout");
	assert!(object["eventTime"].is_i64());

	let content = object["eventContent"].as_str().unwrap();
	assert!(!content.contains(' ') && !content.contains('\n'));
	let parsed: serde_json::Value = serde_json::from_str(content).unwrap();
	assert_eq!(parsed, serde_json::json!({"a": 1, "b": "xy"}));
}

#[tokio::test]
async fn test_failed_events_replay_on_reconnect() {
	init_tracing();
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/ev"))
		.respond_with(ResponseTemplate::new(503))
		.up_to_n_times(2)
		.with_priority(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/ev"))
		.respond_with(ResponseTemplate::new(200))
		.mount(&server)
		.await;

	let connectivity = Arc::new(ManualConnectivity::with_initial(Reachability::Unreachable));
	let beacon = Beacon::builder()
		.user_id("u1")
		.endpoint(format!("{}/ev", server.uri()))
		.retry_delay(NoDelay)
		.connectivity(connectivity.clone())
		.build()
		.unwrap();

	let errors = Arc::new(AtomicUsize::new(0));
	for (code, ts) in [("first", 100), ("second", 200)] {
		let errors = Arc::clone(&errors);
		beacon
			.submit(
				NewEvent::click(code, code)
					.timestamp(ts)
					.extra(Properties::new().insert("n", ts))
					.on_error(move |_| {
						errors.fetch_add(1, Ordering::SeqCst);
					}),
			)
			.unwrap();
	}

	eventually(|| beacon.failed_len() == 2 && errors.load(Ordering::SeqCst) == 2).await;
	assert!(!beacon.is_draining());

	connectivity.set(Reachability::Reachable);
	eventually(|| beacon.failed_len() == 0 && !beacon.is_draining()).await;
	beacon.shutdown().await.unwrap();

	let requests = received(&server).await;
	assert_eq!(requests.len(), 4);
	assert_eq!(errors.load(Ordering::SeqCst), 2);

	// Retried bodies are identical to the first attempts.
	let (failed, replayed) = requests.split_at(2);
	let mut failed: Vec<&[u8]> = failed.iter().map(|r| r.body.as_slice()).collect();
	let mut replayed: Vec<&[u8]> = replayed.iter().map(|r| r.body.as_slice()).collect();
	failed.sort_unstable();
	replayed.sort_unstable();
	assert_eq!(failed, replayed);
}

#[tokio::test]
async fn test_failed_events_survive_restart() {
	init_tracing();
	let dir = tempfile::tempdir().unwrap();
	let url = format!("sqlite://{}?mode=rwc", dir.path().join("beacon.db").display());

	let offline = collector(503).await;
	{
		let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
		let beacon = Beacon::builder()
			.user_id("u1")
			.endpoint(format!("{}/ev", offline.uri()))
			.store(store)
			.build()
			.unwrap();

		beacon
			.submit(NewEvent::page_in("home", "Home").timestamp(10))
			.unwrap();
		beacon
			.submit(NewEvent::click("buy", "Buy").timestamp(20))
			.unwrap();
		eventually(|| beacon.failed_len() == 2).await;
		beacon.shutdown().await.unwrap();
	}

	let online = collector(200).await;
	let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
	let connectivity = Arc::new(ManualConnectivity::with_initial(Reachability::Reachable));
	let beacon = Beacon::builder()
		.user_id("u1")
		.endpoint(format!("{}/ev", online.uri()))
		.store(store)
		.connectivity(connectivity)
		.build()
		.unwrap();

	assert_eq!(beacon.restore_persisted().await.unwrap(), 2);
	eventually(|| beacon.failed_len() == 0 && !beacon.is_draining()).await;
	beacon.shutdown().await.unwrap();

	let sent = payloads(&received(&online).await);
	let codes: Vec<(&str, i64)> = sent
		.iter()
		.map(|p| (p.event_code.as_str(), p.event_time))
		.collect();
	assert_eq!(codes, vec![("home", 10), ("buy", 20)]);

	let reopened = SqliteStore::connect(&url).await.unwrap();
	assert!(beacon::FailedEventStore::list(&reopened).await.unwrap().is_empty());
}
