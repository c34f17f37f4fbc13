//! Fetches catalog conditions twice through a client pointed at a local mock of the
//! TCGplayer API; the second read is answered from the response cache.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use tcgplayer_client::{Client, ClientConfig, RequestDescriptor};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":1209599}",
			);
		})
		.await;
	let conditions_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/catalog/conditions");
			then.status(200).header("content-type", "application/json").body(
				"{\"success\":true,\"results\":[{\"conditionId\":1,\"name\":\"Near Mint\"}]}",
			);
		})
		.await;
	let base_url = Url::parse(&server.base_url())?;
	let config = ClientConfig::default()
		.with_token_url(base_url.join("token")?)
		.with_base_url(base_url)
		.with_client_credentials("demo-public-key", "demo-private-key");
	let client = Client::new(config)?;

	for _ in 0..2 {
		let conditions = client.execute(RequestDescriptor::get("/catalog/conditions")).await?;

		println!("Conditions: {conditions}.");
	}

	if let Some(cache) = client.cache() {
		println!("Cache hits: {}, misses: {}.", cache.stats().hits(), cache.stats().misses());
	}

	token_mock.assert_async().await;
	conditions_mock.assert_calls_async(1).await;

	Ok(())
}
