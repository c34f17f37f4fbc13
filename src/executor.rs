//! Request executor: cache lookup, admission, authentication, dispatch, and retries.
//!
//! Every call walks the same path. A cacheable read is answered from the
//! [`ResponseCache`] when a live entry exists. Otherwise the call waits for a
//! [`RateLimiter`] credit, obtains a bearer token from the [`CredentialManager`], and goes
//! out through the [`HttpTransport`]. Failures are classified by the [`RetryPolicy`]:
//! transient ones sleep and loop back to the limiter, a first 401 swaps the token once
//! without consuming budget, and everything else surfaces as one typed [`Error`].

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, CredentialManager},
	cache::ResponseCache,
	config::ClientConfig,
	error::{ApiError, ConfigError, ValidationError},
	http::{
		HttpTransport, TransportRequest, TransportResponse,
		http::{
			HeaderName, HeaderValue, Method, StatusCode,
			header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
		},
	},
	obs::{self, Operation, OperationSpan, Outcome},
	rate_limit::RateLimiter,
	request::{CachePolicy, RequestDescriptor, parse_method},
	retry::{AttemptContext, Disposition, RetryPolicy},
	runtime::{Clock, Sleeper, SystemClock, TokioSleeper},
	store::{FileStore, MemoryStore, TokenStore},
};

const IDEMPOTENCY_KEY: &str = "idempotency-key";
const JSON: &str = "application/json";

/// Configures and builds a [`Client`].
///
/// Unset collaborators fall back to the reqwest transport, the system clock, tokio timers,
/// and a [`FileStore`] or [`MemoryStore`] depending on `token_cache_path`.
pub struct ClientBuilder {
	config: ClientConfig,
	transport: Option<Arc<dyn HttpTransport>>,
	clock: Option<Arc<dyn Clock>>,
	sleeper: Option<Arc<dyn Sleeper>>,
	token_store: Option<Arc<dyn TokenStore>>,
}
impl ClientBuilder {
	/// Starts a builder from configuration.
	pub fn new(config: ClientConfig) -> Self {
		Self { config, transport: None, clock: None, sleeper: None, token_store: None }
	}

	/// Sends API calls and token exchanges through `transport`.
	pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
		self.transport = Some(transport);

		self
	}

	/// Drives token expiry, cache TTLs, and the rate window from `clock`.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Performs backoff and limiter waits through `sleeper`.
	pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
		self.sleeper = Some(sleeper);

		self
	}

	/// Persists exchanged tokens in `store`.
	pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
		self.token_store = Some(store);

		self
	}

	/// Validates the configuration and wires the client together.
	pub fn build(self) -> Result<Client> {
		let Self { config, transport, clock, sleeper, token_store } = self;

		config.validate()?;

		let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|_| {
			ConfigError::invalid_option("user_agent", "must be a valid header value")
		})?;
		let transport = match transport {
			Some(transport) => transport,
			None => default_transport(&config)?,
		};
		let clock = clock.unwrap_or_else(|| Arc::new(SystemClock));
		let sleeper = sleeper.unwrap_or_else(|| Arc::new(TokioSleeper));
		let token_store: Arc<dyn TokenStore> = match (token_store, &config.token_cache_path) {
			(Some(store), _) => store,
			(None, Some(path)) => Arc::new(FileStore::open(path)?),
			(None, None) => Arc::new(MemoryStore::default()),
		};
		let credentials = CredentialManager::new(
			&config,
			Arc::clone(&transport),
			Arc::clone(&clock),
			token_store,
		)?;
		let limiter = RateLimiter::with_time(
			config.rate_limit_capacity,
			config.rate_limit_window,
			Arc::clone(&clock),
			Arc::clone(&sleeper),
		)?;
		let cache = config.cache_enabled.then(|| {
			ResponseCache::with_clock(
				config.cache_max_entries,
				config.cache_max_bytes,
				Arc::clone(&clock),
			)
		});
		let retry = RetryPolicy::from_config(&config);

		Ok(Client {
			inner: Arc::new(ClientInner {
				config,
				user_agent,
				transport,
				credentials,
				limiter,
				cache,
				retry,
				sleeper,
			}),
		})
	}
}
impl Debug for ClientBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientBuilder")
			.field("config", &self.config)
			.field("custom_transport", &self.transport.is_some())
			.field("custom_clock", &self.clock.is_some())
			.field("custom_sleeper", &self.sleeper.is_some())
			.field("custom_token_store", &self.token_store.is_some())
			.finish()
	}
}

/// Handle to one TCGplayer API session.
///
/// Cloning is cheap; clones share credentials, rate accounting, and the response cache.
#[derive(Clone)]
pub struct Client {
	inner: Arc<ClientInner>,
}
impl Client {
	/// Builds a client with every production default.
	pub fn new(config: ClientConfig) -> Result<Self> {
		ClientBuilder::new(config).build()
	}

	/// Starts a [`ClientBuilder`].
	pub fn builder(config: ClientConfig) -> ClientBuilder {
		ClientBuilder::new(config)
	}

	/// Performs one API call described by loose arguments.
	///
	/// `method` is case-insensitive. `data` becomes the JSON body.
	pub async fn request(
		&self,
		method: &str,
		path: &str,
		params: &[(&str, &str)],
		data: Option<Value>,
	) -> Result<Value> {
		let mut descriptor = RequestDescriptor::new(parse_method(method)?, path)
			.params(params.iter().copied());

		descriptor.body = data;

		self.execute(descriptor).await
	}

	/// Performs one API call and returns the parsed JSON payload.
	pub async fn execute(&self, descriptor: RequestDescriptor) -> Result<Value> {
		let target = format!("{} {}", descriptor.method, descriptor.normalized_path());
		let span = OperationSpan::new(Operation::Request, &target);

		span.instrument(self.inner.run(descriptor)).await
	}

	/// Performs one API call and deserializes the payload into `T`.
	///
	/// A shape mismatch is reported as [`Error::InvalidResponse`] naming the JSON path.
	pub async fn execute_as<T>(&self, descriptor: RequestDescriptor) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let value = self.execute(descriptor).await?;

		serde_path_to_error::deserialize(value).map_err(|e| Error::InvalidResponse {
			reason: format!("unexpected payload shape at `{}`: {}", e.path(), e.inner()),
			body_excerpt: None,
		})
	}

	/// Configuration the client was built from.
	pub fn config(&self) -> &ClientConfig {
		&self.inner.config
	}

	/// Credential manager owning the bearer token.
	pub fn credentials(&self) -> &CredentialManager {
		&self.inner.credentials
	}

	/// Response cache, when caching is enabled.
	pub fn cache(&self) -> Option<&ResponseCache> {
		self.inner.cache.as_ref()
	}

	/// Outbound admission gate.
	pub fn rate_limiter(&self) -> &RateLimiter {
		&self.inner.limiter
	}

	/// Retry budget and backoff curve.
	pub fn retry_policy(&self) -> &RetryPolicy {
		&self.inner.retry
	}
}
impl Debug for Client {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client")
			.field("base_url", &self.inner.config.base_url.as_str())
			.field("credentials", &self.inner.credentials)
			.field("limiter", &self.inner.limiter)
			.field("cache_entries", &self.inner.cache.as_ref().map(ResponseCache::len))
			.finish_non_exhaustive()
	}
}

struct ClientInner {
	config: ClientConfig,
	user_agent: HeaderValue,
	transport: Arc<dyn HttpTransport>,
	credentials: CredentialManager,
	limiter: RateLimiter,
	cache: Option<ResponseCache>,
	retry: RetryPolicy,
	sleeper: Arc<dyn Sleeper>,
}
impl ClientInner {
	async fn run(&self, descriptor: RequestDescriptor) -> Result<Value> {
		const OPERATION: Operation = Operation::Request;

		descriptor.validate()?;

		if descriptor.requires_store_context && !self.config.store_context_enabled {
			return Err(
				ConfigError::StoreContextDisabled { path: descriptor.normalized_path() }.into()
			);
		}

		let cache = self.cache.as_ref().filter(|_| descriptor.is_cacheable());
		let key = cache.map(|_| descriptor.cache_key());
		let hit = match (cache, &key) {
			(Some(cache), Some(key)) => cache.get(key),
			_ => None,
		};

		if let (Some(value), Some(key)) = (hit, &key) {
			obs::record_cache_hit(&key.to_string());
			obs::record_outcome(OPERATION, Outcome::CacheHit);

			return Ok(value);
		}

		match self.dispatch(&descriptor).await {
			Ok(value) => {
				obs::record_outcome(OPERATION, Outcome::Success);

				if let (Some(cache), Some(key)) = (cache, key) {
					let ttl = match descriptor.cache_policy {
						CachePolicy::Ttl(ttl) => ttl,
						CachePolicy::Default | CachePolicy::Bypass => self.config.cache_ttl_default,
					};

					cache.put(key, value.clone(), ttl);
				}
				if let Some(cache) = self.cache.as_ref().filter(|_| !descriptor.is_read_only()) {
					for prefix in &descriptor.invalidates {
						cache.invalidate_path(prefix);
					}
				}

				Ok(value)
			},
			Err(e) => {
				obs::record_outcome(OPERATION, Outcome::Failure);

				Err(e)
			},
		}
	}

	async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<Value> {
		let url = self.url_for(descriptor);
		let mut attempts = 0_u32;
		let mut consumed = 0_u32;
		let mut reauthenticated = false;
		let mut free_attempt = false;

		loop {
			if free_attempt {
				free_attempt = false;
			} else {
				consumed += 1;
			}

			attempts += 1;

			self.limiter.acquire().await;

			let (result, token) = match self.credentials.ensure_token().await {
				Ok(token) => {
					obs::record_outcome(Operation::Request, Outcome::Attempt);

					(self.send(descriptor, &url, &token).await, Some(token))
				},
				Err(e) => (Err(e), None),
			};
			let error = match result {
				Ok(value) => return Ok(value),
				Err(e) => e,
			};
			let context = AttemptContext {
				consumed,
				// A failed token exchange never put the call on the wire.
				is_write: token.is_some() && !descriptor.is_read_only(),
				idempotent: descriptor.idempotency_key.is_some(),
				reauthenticated,
			};

			match self.retry.classify(&error, context) {
				Disposition::Retry(delay) => {
					obs::record_retry(attempts, delay, &error);
					obs::record_outcome(Operation::Request, Outcome::Retry);

					if let Error::RateLimited { retry_after: Some(pause) } = &error {
						self.limiter.throttle(*pause);
					}

					self.sleeper.sleep(delay).await;
				},
				Disposition::Reauthenticate => {
					obs::record_reauthentication();

					if let Some(token) = &token {
						self.credentials.invalidate_token(token.secret()).await?;
					}

					reauthenticated = true;
					free_attempt = true;
				},
				Disposition::Fail => return Err(error),
				Disposition::Exhausted =>
					return Err(Error::RetryExhausted { attempts, last: Box::new(error) }),
			}
		}
	}

	async fn send(
		&self,
		descriptor: &RequestDescriptor,
		url: &Url,
		token: &AccessToken,
	) -> Result<Value> {
		let mut request = TransportRequest::new(
			descriptor.method.clone(),
			url.clone(),
			self.config.request_timeout,
		);
		let authorization = HeaderValue::from_str(&token.bearer()).map_err(|_| {
			Error::Authentication {
				reason: "bearer token is not a valid header value".into(),
				status: None,
			}
		})?;

		request.headers.insert(AUTHORIZATION, authorization);
		request.headers.insert(ACCEPT, HeaderValue::from_static(JSON));
		request.headers.insert(USER_AGENT, self.user_agent.clone());

		if let Some(key) = &descriptor.idempotency_key {
			let value = HeaderValue::from_str(key).map_err(|_| {
				ValidationError::InvalidIdempotencyKey { reason: "must be a valid header value" }
			})?;

			request.headers.insert(HeaderName::from_static(IDEMPOTENCY_KEY), value);
		}
		if let Some(body) = &descriptor.body {
			let bytes = serde_json::to_vec(body).map_err(|e| ValidationError::InvalidField {
				field: "body".into(),
				reason: e.to_string(),
			})?;

			request.headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
			request.body = Some(bytes);
		}

		let response = self.transport.send(request).await?;

		interpret(&descriptor.method, response)
	}

	fn url_for(&self, descriptor: &RequestDescriptor) -> Url {
		let mut url = self.config.endpoint(&descriptor.normalized_path());

		if !descriptor.query_params.is_empty() {
			url.query_pairs_mut().extend_pairs(
				descriptor.query_params.iter().map(|(name, value)| (name.as_str(), value.as_str())),
			);
		}

		url
	}
}

fn interpret(method: &Method, response: TransportResponse) -> Result<Value> {
	let status = response.status;

	if status == StatusCode::TOO_MANY_REQUESTS {
		return Err(Error::RateLimited { retry_after: response.retry_after() });
	}
	if !status.is_success() {
		return Err(ApiError::from_response(status.as_u16(), &response.body).into());
	}
	if status == StatusCode::NO_CONTENT || *method == Method::HEAD {
		return Ok(Value::Null);
	}
	if response.body.iter().all(u8::is_ascii_whitespace) {
		return Err(Error::invalid_response("success response has an empty body", None));
	}

	serde_json::from_slice(&response.body).map_err(|e| {
		Error::invalid_response(format!("success body is not JSON: {e}"), Some(&response.body))
	})
}

fn default_transport(config: &ClientConfig) -> Result<Arc<dyn HttpTransport>, ConfigError> {
	#[cfg(feature = "reqwest")]
	{
		Ok(Arc::new(crate::http::ReqwestTransport::new(
			&config.user_agent,
			config.request_timeout,
		)?))
	}
	#[cfg(not(feature = "reqwest"))]
	{
		let _ = config;

		Err(ConfigError::invalid_option(
			"transport",
			"no HTTP transport supplied and the `reqwest` feature is disabled",
		))
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		_preludet::{ScriptedReply, ScriptedTransport, scripted_client, test_config},
		runtime::ManualClock,
	};

	const BASE: &str = "https://api.tcgplayer.com/";

	fn client_with(config: ClientConfig) -> (Client, Arc<ScriptedTransport>, ManualClock) {
		let transport = ScriptedTransport::new();
		let clock = ManualClock::new();

		transport.always("/token", ScriptedReply::token("token-1", 1_209_599));

		let client = scripted_client(config, Arc::clone(&transport), &clock);

		(client, transport, clock)
	}

	#[test]
	fn build_rejects_invalid_configuration() {
		let err = Client::builder(ClientConfig::default())
			.transport(ScriptedTransport::new())
			.build()
			.expect_err("Missing credentials should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::MissingCredentials)));
	}

	#[tokio::test]
	async fn requests_carry_auth_and_json_headers() {
		let (client, transport, _clock) = client_with(test_config(BASE));

		transport.respond("/stores/abc/inventory", ScriptedReply::json(200, "{\"success\":true}"));

		let descriptor = RequestDescriptor::post("/stores/abc/inventory")
			.query("force", true)
			.json(json!({"quantity": 2}))
			.idempotency_key("order-42");
		let value = client.execute(descriptor).await.expect("Write should succeed.");

		assert_eq!(value, json!({"success": true}));

		let requests = transport.requests();
		let call = requests
			.iter()
			.find(|request| request.url.path() == "/stores/abc/inventory")
			.expect("API call should be recorded.");

		assert_eq!(call.url.query(), Some("force=true"));
		assert_eq!(
			call.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
			Some("bearer token-1")
		);
		assert_eq!(call.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()), Some(JSON));
		assert_eq!(
			call.headers.get(IDEMPOTENCY_KEY).and_then(|v| v.to_str().ok()),
			Some("order-42")
		);
		assert_eq!(call.body.as_deref(), Some(&b"{\"quantity\":2}"[..]));
	}

	#[tokio::test]
	async fn api_version_prefixes_request_paths() {
		let (client, transport, _clock) =
			client_with(test_config(BASE).with_api_version("v1.39.0"));

		transport.respond("/v1.39.0/catalog/categories", ScriptedReply::json(200, "[]"));

		client.request("get", "catalog/categories", &[], None).await.expect("Call should succeed.");

		assert_eq!(transport.calls_to("/v1.39.0/catalog/categories"), 1);
	}

	#[tokio::test]
	async fn validation_fails_before_any_network_call() {
		let (client, transport, _clock) = client_with(test_config(BASE));
		let err = client
			.request("GET", "/catalog?x=1", &[], None)
			.await
			.expect_err("Inline query strings should be rejected.");

		assert!(matches!(err, Error::Validation(ValidationError::InvalidPath { .. })));

		let err = client
			.request("NOT A METHOD", "/catalog", &[], None)
			.await
			.expect_err("Malformed methods should be rejected.");

		assert!(matches!(err, Error::Validation(ValidationError::InvalidMethod { .. })));
		assert!(transport.requests().is_empty());
	}

	#[tokio::test]
	async fn store_context_gate_blocks_seller_calls() {
		let (client, transport, _clock) = client_with(test_config(BASE));
		let err = client
			.execute(RequestDescriptor::get("/stores/self").store_context())
			.await
			.expect_err("Store calls should require store context.");

		assert!(matches!(err, Error::Config(ConfigError::StoreContextDisabled { .. })));
		assert!(transport.requests().is_empty());

		let (client, transport, _clock) = client_with(test_config(BASE).with_store_context(true));

		transport.respond("/stores/self", ScriptedReply::json(200, "{\"results\":[]}"));

		client
			.execute(RequestDescriptor::get("/stores/self").store_context())
			.await
			.expect("Store calls should pass once enabled.");
	}

	#[tokio::test]
	async fn cached_reads_skip_the_network_until_expiry() {
		let (client, transport, clock) =
			client_with(test_config(BASE).with_cache_ttl(Duration::from_secs(60)));

		transport.always("/catalog/conditions", ScriptedReply::json(200, "{\"results\":[1]}"));

		let first = client.request("GET", "/catalog/conditions", &[], None).await;
		let second = client.request("GET", "/catalog/conditions", &[], None).await;

		assert_eq!(first.expect("First read should succeed."), json!({"results": [1]}));
		assert_eq!(second.expect("Second read should hit the cache."), json!({"results": [1]}));
		assert_eq!(transport.calls_to("/catalog/conditions"), 1);

		clock.advance(Duration::from_secs(61));
		client
			.request("GET", "/catalog/conditions", &[], None)
			.await
			.expect("Expired entries should be refetched.");

		assert_eq!(transport.calls_to("/catalog/conditions"), 2);
	}

	#[tokio::test]
	async fn writes_invalidate_registered_prefixes() {
		let (client, transport, _clock) = client_with(test_config(BASE).with_store_context(true));

		transport
			.always("/stores/abc/inventory", ScriptedReply::json(200, "{\"results\":[]}"))
			.always("/stores/abc/inventory/skus/1", ScriptedReply::json(200, "{\"success\":true}"));

		let read = || RequestDescriptor::get("/stores/abc/inventory").store_context();

		client.execute(read()).await.expect("Initial read should succeed.");
		client.execute(read()).await.expect("Second read should hit the cache.");

		assert_eq!(transport.calls_to("/stores/abc/inventory"), 1);

		client
			.execute(
				RequestDescriptor::put("/stores/abc/inventory/skus/1")
					.store_context()
					.json(json!({"price": 1.5}))
					.invalidates("/stores/abc/inventory"),
			)
			.await
			.expect("Write should succeed.");
		client.execute(read()).await.expect("Read after write should refetch.");

		assert_eq!(transport.calls_to("/stores/abc/inventory"), 2);
	}

	#[tokio::test]
	async fn non_json_success_bodies_are_invalid_responses() {
		let (client, transport, _clock) = client_with(test_config(BASE));

		transport
			.respond("/catalog/categories", ScriptedReply::text(200, "<html>oops</html>"))
			.respond("/catalog/languages", ScriptedReply::json(200, ""));

		let garbled = client.request("GET", "/catalog/categories", &[], None).await;
		let empty = client.request("GET", "/catalog/languages", &[], None).await;

		match garbled.expect_err("HTML should be rejected.") {
			Error::InvalidResponse { body_excerpt, .. } =>
				assert_eq!(body_excerpt.as_deref(), Some("<html>oops</html>")),
			other => panic!("Unexpected error: {other:?}."),
		}

		assert!(matches!(empty, Err(Error::InvalidResponse { .. })));
		assert_eq!(transport.calls_to("/catalog/categories"), 1);
	}

	#[tokio::test]
	async fn execute_as_names_the_failing_path() {
		#[derive(Debug, Deserialize)]
		struct Listing {
			results: Vec<u32>,
		}

		let (client, transport, _clock) = client_with(test_config(BASE));

		transport
			.respond("/catalog/products", ScriptedReply::json(200, "{\"results\":[1,2]}"))
			.respond("/catalog/products", ScriptedReply::json(200, "{\"results\":[1,\"x\"]}"));

		let ok = client
			.execute_as::<Listing>(RequestDescriptor::get("/catalog/products").no_cache())
			.await
			.expect("Well-formed payload should deserialize.");

		assert_eq!(ok.results, vec![1, 2]);

		let err = client
			.execute_as::<Listing>(RequestDescriptor::get("/catalog/products").no_cache())
			.await
			.expect_err("Mismatched payload should fail.");

		match err {
			Error::InvalidResponse { reason, .. } => assert!(reason.contains("results[1]")),
			other => panic!("Unexpected error: {other:?}."),
		}
	}
}
