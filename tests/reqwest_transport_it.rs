#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use tcgplayer_client::{_preludet::*, Client, RequestDescriptor, error::TransportError};

const TOKEN_BODY: &str =
	"{\"access_token\":\"live-token\",\"token_type\":\"bearer\",\"expires_in\":1209599}";

async fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await
}

#[tokio::test]
async fn repeated_catalog_reads_hit_the_network_once() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let token = mock_token(&server).await;
	let conditions = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/catalog/conditions")
				.header("authorization", "bearer live-token")
				.header("accept", "application/json");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"success\":true,\"results\":[{\"conditionId\":1,\"name\":\"Near Mint\"}]}");
		})
		.await;
	let client = Client::new(test_config(&server.base_url()))?;
	let first = client.request("GET", "/catalog/conditions", &[], None).await?;
	let second = client.request("GET", "/catalog/conditions", &[], None).await?;

	assert_eq!(first, second);
	assert_eq!(first["results"][0]["name"], "Near Mint");

	conditions.assert_calls_async(1).await;
	token.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn query_parameters_and_errors_round_trip_over_http() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server).await;
	let products = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/catalog/products")
				.query_param("categoryId", "1")
				.query_param("limit", "5");
			then.status(404)
				.header("content-type", "application/json")
				.body("{\"success\":false,\"errors\":[\"No products were found.\"],\"results\":[]}");
		})
		.await;
	let client = Client::new(test_config(&server.base_url()))?;
	let descriptor =
		RequestDescriptor::get("/catalog/products").query("categoryId", 1).query("limit", 5);
	let err =
		client.execute(descriptor).await.expect_err("404 should surface as an API error.");

	match err {
		Error::Api(api) => {
			assert_eq!(api.status, 404);
			assert_eq!(api.message, "No products were found");
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	products.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn throttled_responses_are_retried_after_the_hint() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server).await;
	let mut throttled = server
		.mock_async(|when, then| {
			when.method(GET).path("/catalog/languages");
			then.status(429).header("retry-after", "1").body("{}");
		})
		.await;
	let client = Client::new(test_config(&server.base_url()))?;
	let call = tokio::spawn({
		let client = client.clone();

		async move { client.request("GET", "/catalog/languages", &[], None).await }
	});

	tokio::time::sleep(Duration::from_millis(300)).await;
	throttled.assert_calls_async(1).await;
	throttled.delete_async().await;

	let languages = server
		.mock_async(|when, then| {
			when.method(GET).path("/catalog/languages");
			then.status(200).header("content-type", "application/json").body("{\"results\":[]}");
		})
		.await;
	let value = call.await??;

	assert_eq!(value["results"], serde_json::json!([]));

	languages.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn slow_responses_time_out_and_exhaust_the_budget() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let _token = mock_token(&server).await;
	let slow = server
		.mock_async(|when, then| {
			when.method(GET).path("/catalog/categories");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"results\":[]}")
				.delay(Duration::from_secs(2));
		})
		.await;
	let timeout = Duration::from_millis(200);
	let client = Client::new(test_config(&server.base_url()).with_request_timeout(timeout))?;
	let err = client
		.request("GET", "/catalog/categories", &[], None)
		.await
		.expect_err("Every attempt should exceed the request timeout.");

	match err {
		Error::RetryExhausted { attempts, last } => {
			assert_eq!(attempts, 3);
			match *last {
				Error::Transport(TransportError::Timeout { after }) => assert_eq!(after, timeout),
				other => panic!("Unexpected last error: {other:?}."),
			}
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	slow.assert_calls_async(3).await;

	Ok(())
}
