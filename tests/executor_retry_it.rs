// crates.io
use serde_json::json;
// self
use tcgplayer_client::{
	_preludet::*,
	RequestDescriptor,
	error::{ApiErrorKind, TransportError},
	http::MAX_RETRY_AFTER,
	runtime::ManualClock,
};

const BASE: &str = "https://api.tcgplayer.com/";

fn client(transport: &Arc<ScriptedTransport>, clock: &ManualClock) -> tcgplayer_client::Client {
	transport.always("/token", ScriptedReply::token("token-1", 1_209_599));

	scripted_client(test_config(BASE), Arc::clone(transport), clock)
}

#[tokio::test]
async fn transient_failures_succeed_on_third_attempt_with_growing_backoff() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport
		.respond("/catalog/categories", ScriptedReply::json(503, "{}"))
		.respond("/catalog/categories", ScriptedReply::json(503, "{}"))
		.respond("/catalog/categories", ScriptedReply::json(200, "{\"results\":[\"Magic\"]}"));

	let value = client
		.request("GET", "/catalog/categories", &[], None)
		.await
		.expect("Third attempt should succeed.");
	let sleeps = clock.sleeps();

	assert_eq!(value, json!({"results": ["Magic"]}));
	assert_eq!(transport.calls_to("/catalog/categories"), 3);
	assert_eq!(sleeps.len(), 2);
	assert!(sleeps[0] >= Duration::from_millis(100) && sleeps[0] <= Duration::from_millis(125));
	assert!(sleeps[1] >= Duration::from_millis(200) && sleeps[1] <= Duration::from_millis(250));
	assert!(sleeps[1] > sleeps[0]);
}

#[tokio::test]
async fn exhausted_budget_reports_attempts_and_last_error() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport
		.always("/catalog/categories", ScriptedReply::json(502, "{\"message\":\"Bad gateway\"}"));

	let err = client
		.request("GET", "/catalog/categories", &[], None)
		.await
		.expect_err("Persistent 502s should exhaust the budget.");

	match err {
		Error::RetryExhausted { attempts, last } => {
			assert_eq!(attempts, 3);

			match *last {
				Error::Api(api) => {
					assert_eq!(api.status, 502);
					assert_eq!(api.kind(), ApiErrorKind::ServerError);
					assert_eq!(api.message, "Bad gateway");
				},
				other => panic!("Unexpected last error: {other:?}."),
			}
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert_eq!(transport.calls_to("/catalog/categories"), 3);
}

#[tokio::test]
async fn unauthorized_triggers_one_reauthentication() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();

	transport
		.respond("/token", ScriptedReply::token("stale", 1_209_599))
		.respond("/token", ScriptedReply::token("fresh", 1_209_599))
		.respond("/catalog/languages", ScriptedReply::json(401, "{\"errors\":[\"Unauthorized\"]}"))
		.respond("/catalog/languages", ScriptedReply::json(200, "{\"results\":[]}"));

	let client = scripted_client(test_config(BASE), Arc::clone(&transport), &clock);

	client
		.request("GET", "/catalog/languages", &[], None)
		.await
		.expect("Retry with a fresh token should succeed.");

	let authorizations = transport
		.requests()
		.iter()
		.filter(|request| request.url.path() == "/catalog/languages")
		.filter_map(|request| {
			request.headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_owned)
		})
		.collect::<Vec<_>>();

	assert_eq!(authorizations, ["bearer stale", "bearer fresh"]);
	assert_eq!(transport.calls_to("/token"), 2);
	assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn second_unauthorized_surfaces_as_api_error() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport
		.always("/catalog/languages", ScriptedReply::json(401, "{\"errors\":[\"Unauthorized\"]}"));

	let err = client
		.request("GET", "/catalog/languages", &[], None)
		.await
		.expect_err("A second 401 should be fatal.");

	match err {
		Error::Api(api) => {
			assert_eq!(api.status, 401);
			assert_eq!(api.message, "Unauthorized");
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert_eq!(transport.calls_to("/catalog/languages"), 2);
	assert_eq!(transport.calls_to("/token"), 2);
}

#[tokio::test]
async fn reauthentication_does_not_consume_retry_budget() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport
		.respond("/catalog/products", ScriptedReply::json(503, "{}"))
		.respond("/catalog/products", ScriptedReply::json(401, "{}"))
		.respond("/catalog/products", ScriptedReply::json(503, "{}"))
		.respond("/catalog/products", ScriptedReply::json(200, "{\"results\":[]}"));

	client
		.request("GET", "/catalog/products", &[], None)
		.await
		.expect("Three budgeted attempts plus one re-authentication should succeed.");

	assert_eq!(transport.calls_to("/catalog/products"), 4);
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport.respond(
		"/catalog/products/0",
		ScriptedReply::json(404, "{\"success\":false,\"errors\":[\"No products were found.\"]}"),
	);

	let err = client
		.request("GET", "/catalog/products/0", &[], None)
		.await
		.expect_err("404 should be fatal.");

	match err {
		Error::Api(api) => {
			assert!(api.is_client_error());
			assert_eq!(api.message, "No products were found");
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert_eq!(transport.calls_to("/catalog/products/0"), 1);
	assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn throttled_calls_honor_retry_after() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport
		.respond("/pricing/group/1", ScriptedReply::json(429, "{}").with_header("retry-after", "4"))
		.respond("/pricing/group/1", ScriptedReply::json(200, "{\"results\":[]}"));

	client
		.request("GET", "/pricing/group/1", &[], None)
		.await
		.expect("Call after the pause should succeed.");

	assert_eq!(clock.sleeps(), vec![Duration::from_secs(4)]);
	assert_eq!(transport.calls_to("/pricing/group/1"), 2);
}

#[tokio::test]
async fn oversized_retry_after_is_clamped_instead_of_overflowing() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport
		.respond(
			"/catalog/sets",
			ScriptedReply::json(429, "{}").with_header("retry-after", u64::MAX.to_string()),
		)
		.respond("/catalog/sets", ScriptedReply::json(200, "{\"results\":[]}"));

	client
		.request("GET", "/catalog/sets", &[], None)
		.await
		.expect("An absurd Retry-After hint should still end in a retry.");

	assert_eq!(clock.sleeps(), vec![MAX_RETRY_AFTER]);
	assert_eq!(transport.calls_to("/catalog/sets"), 2);
}

#[tokio::test]
async fn unbounded_cache_ttl_is_served_from_cache() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport.always("/catalog/rarities", ScriptedReply::json(200, "{\"results\":[]}"));

	for _ in 0..2 {
		client
			.execute(RequestDescriptor::get("/catalog/rarities").cache_ttl(Duration::MAX))
			.await
			.expect("A maximal TTL should be accepted.");
	}

	assert_eq!(transport.calls_to("/catalog/rarities"), 1);
}

#[tokio::test]
async fn ambiguous_write_failures_are_not_retried() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport
		.respond("/stores/abc/inventory/skus/1/quantity", ScriptedReply::Timeout)
		.respond("/stores/abc/inventory/skus/1/quantity", ScriptedReply::json(200, "{}"));

	let err = client
		.request("POST", "/stores/abc/inventory/skus/1/quantity", &[], Some(json!({"q": 1})))
		.await
		.expect_err("A timed-out write should not be replayed.");

	assert!(matches!(err, Error::Transport(TransportError::Timeout { .. })));
	assert_eq!(transport.calls_to("/stores/abc/inventory/skus/1/quantity"), 1);
}

#[tokio::test]
async fn idempotent_and_unambiguous_write_failures_are_retried() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport
		.respond("/stores/abc/orders", ScriptedReply::Timeout)
		.respond("/stores/abc/orders", ScriptedReply::json(201, "{\"success\":true}"))
		.respond("/stores/abc/buylist", ScriptedReply::ConnectionRefused)
		.respond("/stores/abc/buylist", ScriptedReply::json(200, "{\"success\":true}"));

	let keyed = RequestDescriptor::post("/stores/abc/orders")
		.json(json!({"sku": 1}))
		.idempotency_key("order-1");

	client.execute(keyed).await.expect("Keyed write should be retried.");
	client
		.execute(RequestDescriptor::post("/stores/abc/buylist").json(json!({"sku": 2})))
		.await
		.expect("Refused connections should be retried for writes.");

	assert_eq!(transport.calls_to("/stores/abc/orders"), 2);
	assert_eq!(transport.calls_to("/stores/abc/buylist"), 2);

	let keys = transport
		.requests()
		.iter()
		.filter(|request| request.url.path() == "/stores/abc/orders")
		.filter(|request| request.headers.get("idempotency-key").is_some())
		.count();

	assert_eq!(keys, 2);
}

#[tokio::test]
async fn writes_are_never_cached() {
	let transport = ScriptedTransport::new();
	let clock = ManualClock::new();
	let client = client(&transport, &clock);

	transport.always("/pricing/sku", ScriptedReply::json(200, "{\"results\":[]}"));

	for _ in 0..2 {
		client
			.request("POST", "/pricing/sku", &[], Some(json!({"skus": [1, 2]})))
			.await
			.expect("Write should succeed.");
	}

	assert_eq!(transport.calls_to("/pricing/sku"), 2);
	assert!(client.cache().is_some_and(|cache| cache.is_empty()));
}
