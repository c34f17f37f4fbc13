//! Client configuration: typed options, environment loading, and validation.

// std
use std::{path::PathBuf, str::FromStr};
// crates.io
use time::format_description::well_known::{Rfc2822, Rfc3339};
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

const DEFAULT_BASE_URL: &str = "https://api.tcgplayer.com/";
// Upper bound for every duration option; keeps instant arithmetic far from overflow.
const MAX_DURATION_OPTION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Options controlling authentication, admission, caching, and retries for a
/// [`Client`](crate::Client).
///
/// Durations (de)serialize as integer milliseconds. Secrets are wrapped in
/// [`TokenSecret`] so `Debug` output never leaks them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// Public key used for the client-credentials exchange.
	pub client_id: Option<String>,
	/// Private key used for the client-credentials exchange.
	pub client_secret: Option<TokenSecret>,
	/// Pre-issued bearer token used instead of (or before) an exchange.
	pub bearer_token: Option<TokenSecret>,
	/// Expiry of [`bearer_token`](Self::bearer_token); assumed 14 days out when absent.
	#[serde(with = "time::serde::rfc3339::option")]
	pub bearer_token_expires_at: Option<OffsetDateTime>,
	/// API root.
	pub base_url: Url,
	/// OAuth token endpoint; defaults to `{base_url}token`.
	pub token_url: Option<Url>,
	/// Optional version segment inserted between the base URL and request paths.
	pub api_version: Option<String>,
	/// `User-Agent` header sent with every call.
	pub user_agent: String,
	/// Admissions allowed per rolling window.
	pub rate_limit_capacity: u32,
	/// Rolling window length.
	#[serde(with = "millis")]
	pub rate_limit_window: Duration,
	/// Whether successful reads are cached.
	pub cache_enabled: bool,
	/// TTL applied to cached reads without an explicit TTL.
	#[serde(with = "millis")]
	pub cache_ttl_default: Duration,
	/// Maximum number of cached responses.
	pub cache_max_entries: usize,
	/// Optional bound on the aggregate size of cached responses.
	pub cache_max_bytes: Option<usize>,
	/// Total attempt budget per request, including the first attempt.
	pub max_retries: u32,
	/// Delay before the first retry; doubles per retry.
	#[serde(with = "millis")]
	pub backoff_base: Duration,
	/// Upper bound for a single backoff delay.
	#[serde(with = "millis")]
	pub backoff_max: Duration,
	/// Adds up to 25 % random jitter to each backoff delay.
	pub backoff_jitter: bool,
	/// Deadline applied to every network exchange.
	#[serde(with = "millis")]
	pub request_timeout: Duration,
	/// Tokens closer than this to expiry are replaced before use.
	#[serde(with = "millis")]
	pub token_refresh_margin: Duration,
	/// Whether store-scoped requests are permitted.
	pub store_context_enabled: bool,
	/// Snapshot file for persisted tokens; tokens stay in memory when unset.
	pub token_cache_path: Option<PathBuf>,
}
impl ClientConfig {
	/// Loads configuration from `TCGPLAYER_*` environment variables on top of the defaults.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads configuration from an arbitrary variable source (for example a parsed `.env`).
	///
	/// Recognized variables: `TCGPLAYER_CLIENT_ID`, `TCGPLAYER_CLIENT_SECRET`,
	/// `TCGPLAYER_BEARER_TOKEN`, `TCGPLAYER_BEARER_TOKEN_EXPIRES` (RFC 3339 or HTTP date),
	/// `TCGPLAYER_BASE_URL`, `TCGPLAYER_TOKEN_URL`, `TCGPLAYER_API_VERSION`,
	/// `TCGPLAYER_USER_AGENT`, `TCGPLAYER_RATE_LIMIT_CAPACITY`,
	/// `TCGPLAYER_RATE_LIMIT_WINDOW_MS`, `TCGPLAYER_CACHE_ENABLED`, `TCGPLAYER_CACHE_TTL_MS`,
	/// `TCGPLAYER_CACHE_MAX_ENTRIES`, `TCGPLAYER_CACHE_MAX_BYTES`, `TCGPLAYER_MAX_RETRIES`,
	/// `TCGPLAYER_BACKOFF_BASE_MS`, `TCGPLAYER_BACKOFF_MAX_MS`, `TCGPLAYER_BACKOFF_JITTER`,
	/// `TCGPLAYER_REQUEST_TIMEOUT_MS`, `TCGPLAYER_TOKEN_REFRESH_MARGIN_MS`,
	/// `TCGPLAYER_STORE_CONTEXT_ENABLED`, `TCGPLAYER_TOKEN_CACHE_PATH`.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let env = EnvReader(lookup);
		let mut config = Self::default();

		if let Some(value) = env.string("TCGPLAYER_CLIENT_ID") {
			config.client_id = Some(value);
		}
		if let Some(value) = env.string("TCGPLAYER_CLIENT_SECRET") {
			config.client_secret = Some(TokenSecret::new(value));
		}
		if let Some(value) = env.string("TCGPLAYER_BEARER_TOKEN") {
			config.bearer_token = Some(TokenSecret::new(value));
		}
		if let Some(value) = env.string("TCGPLAYER_BEARER_TOKEN_EXPIRES") {
			let expires_at = parse_instant(&value).ok_or_else(|| ConfigError::InvalidEnv {
				var: "TCGPLAYER_BEARER_TOKEN_EXPIRES",
				reason: "expected an RFC 3339 timestamp or an HTTP date".into(),
			})?;

			config.bearer_token_expires_at = Some(expires_at);
		}
		if let Some(value) = env.string("TCGPLAYER_BASE_URL") {
			config.base_url = parse_url(&value)?;
		}
		if let Some(value) = env.string("TCGPLAYER_TOKEN_URL") {
			config.token_url = Some(parse_url(&value)?);
		}
		if let Some(value) = env.string("TCGPLAYER_API_VERSION") {
			config.api_version = Some(value);
		}
		if let Some(value) = env.string("TCGPLAYER_USER_AGENT") {
			config.user_agent = value;
		}
		if let Some(value) = env.parse("TCGPLAYER_RATE_LIMIT_CAPACITY")? {
			config.rate_limit_capacity = value;
		}
		if let Some(value) = env.millis("TCGPLAYER_RATE_LIMIT_WINDOW_MS")? {
			config.rate_limit_window = value;
		}
		if let Some(value) = env.flag("TCGPLAYER_CACHE_ENABLED")? {
			config.cache_enabled = value;
		}
		if let Some(value) = env.millis("TCGPLAYER_CACHE_TTL_MS")? {
			config.cache_ttl_default = value;
		}
		if let Some(value) = env.parse("TCGPLAYER_CACHE_MAX_ENTRIES")? {
			config.cache_max_entries = value;
		}
		if let Some(value) = env.parse("TCGPLAYER_CACHE_MAX_BYTES")? {
			config.cache_max_bytes = Some(value);
		}
		if let Some(value) = env.parse("TCGPLAYER_MAX_RETRIES")? {
			config.max_retries = value;
		}
		if let Some(value) = env.millis("TCGPLAYER_BACKOFF_BASE_MS")? {
			config.backoff_base = value;
		}
		if let Some(value) = env.millis("TCGPLAYER_BACKOFF_MAX_MS")? {
			config.backoff_max = value;
		}
		if let Some(value) = env.flag("TCGPLAYER_BACKOFF_JITTER")? {
			config.backoff_jitter = value;
		}
		if let Some(value) = env.millis("TCGPLAYER_REQUEST_TIMEOUT_MS")? {
			config.request_timeout = value;
		}
		if let Some(value) = env.millis("TCGPLAYER_TOKEN_REFRESH_MARGIN_MS")? {
			config.token_refresh_margin = value;
		}
		if let Some(value) = env.flag("TCGPLAYER_STORE_CONTEXT_ENABLED")? {
			config.store_context_enabled = value;
		}
		if let Some(value) = env.string("TCGPLAYER_TOKEN_CACHE_PATH") {
			config.token_cache_path = Some(PathBuf::from(value));
		}

		Ok(config)
	}

	/// Sets the API root.
	pub fn with_base_url(mut self, base_url: Url) -> Self {
		self.base_url = base_url;

		self
	}

	/// Overrides the OAuth token endpoint.
	pub fn with_token_url(mut self, token_url: Url) -> Self {
		self.token_url = Some(token_url);

		self
	}

	/// Sets the client-credentials pair.
	pub fn with_client_credentials(
		mut self,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		self.client_id = Some(client_id.into());
		self.client_secret = Some(TokenSecret::new(client_secret));

		self
	}

	/// Supplies a pre-issued bearer token and, optionally, its expiry.
	pub fn with_bearer_token(
		mut self,
		token: impl Into<String>,
		expires_at: Option<OffsetDateTime>,
	) -> Self {
		self.bearer_token = Some(TokenSecret::new(token));
		self.bearer_token_expires_at = expires_at;

		self
	}

	/// Inserts a version segment (for example `v1.39.0`) before every request path.
	pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
		self.api_version = Some(version.into());

		self
	}

	/// Overrides the `User-Agent` header.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Sets the admission capacity per rolling window.
	pub fn with_rate_limit(mut self, capacity: u32, window: Duration) -> Self {
		self.rate_limit_capacity = capacity;
		self.rate_limit_window = window;

		self
	}

	/// Sets the default TTL for cached reads and enables caching.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_enabled = true;
		self.cache_ttl_default = ttl;

		self
	}

	/// Sets the cache capacity bounds.
	pub fn with_cache_limits(mut self, max_entries: usize, max_bytes: Option<usize>) -> Self {
		self.cache_max_entries = max_entries;
		self.cache_max_bytes = max_bytes;

		self
	}

	/// Disables response caching.
	pub fn without_cache(mut self) -> Self {
		self.cache_enabled = false;

		self
	}

	/// Sets the total attempt budget per request.
	pub fn with_max_retries(mut self, attempts: u32) -> Self {
		self.max_retries = attempts;

		self
	}

	/// Sets the backoff base and cap.
	pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
		self.backoff_base = base;
		self.backoff_max = max;

		self
	}

	/// Enables or disables backoff jitter.
	pub fn with_backoff_jitter(mut self, enabled: bool) -> Self {
		self.backoff_jitter = enabled;

		self
	}

	/// Sets the per-exchange timeout.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Sets how long before expiry a token is replaced.
	pub fn with_token_refresh_margin(mut self, margin: Duration) -> Self {
		self.token_refresh_margin = margin;

		self
	}

	/// Allows or forbids store-scoped requests.
	pub fn with_store_context(mut self, enabled: bool) -> Self {
		self.store_context_enabled = enabled;

		self
	}

	/// Persists tokens to the provided snapshot file.
	pub fn with_token_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.token_cache_path = Some(path.into());

		self
	}

	/// Returns `true` when both halves of the client-credentials pair are present.
	pub fn has_client_credentials(&self) -> bool {
		self.client_id().is_some() && self.client_secret().is_some()
	}

	/// Client id, ignoring blank values.
	pub fn client_id(&self) -> Option<&str> {
		self.client_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
	}

	/// Client secret, ignoring blank values.
	pub fn client_secret(&self) -> Option<&TokenSecret> {
		self.client_secret.as_ref().filter(|secret| !secret.is_blank())
	}

	/// Bearer token, ignoring blank values.
	pub fn bearer_token(&self) -> Option<&TokenSecret> {
		self.bearer_token.as_ref().filter(|token| !token.is_blank())
	}

	/// Token endpoint, falling back to `{base_url}token`.
	pub fn resolved_token_url(&self) -> Result<Url, ConfigError> {
		match &self.token_url {
			Some(url) => Ok(url.clone()),
			None => self.base_url.join("token").map_err(|source| ConfigError::InvalidUrl {
				value: self.base_url.to_string(),
				source,
			}),
		}
	}

	/// Absolute URL for a normalized request path (leading `/`, no query).
	pub fn endpoint(&self, path: &str) -> Url {
		let mut url = self.base_url.clone();
		let mut full = self.base_url.path().trim_end_matches('/').to_owned();

		if let Some(version) =
			self.api_version.as_deref().map(|v| v.trim_matches('/')).filter(|v| !v.is_empty())
		{
			full.push('/');
			full.push_str(version);
		}

		full.push_str(path);
		url.set_path(&full);
		url.set_query(None);

		url
	}

	/// Checks credentials, endpoints, and numeric bounds.
	pub fn validate(&self) -> Result<(), ConfigError> {
		match (self.client_id().is_some(), self.client_secret().is_some()) {
			(true, false) =>
				return Err(ConfigError::IncompleteCredentials { missing: "client_secret" }),
			(false, true) =>
				return Err(ConfigError::IncompleteCredentials { missing: "client_id" }),
			(false, false) if self.bearer_token().is_none() =>
				return Err(ConfigError::MissingCredentials),
			_ => {},
		}

		if self.base_url.cannot_be_a_base() {
			return Err(ConfigError::invalid_option("base_url", "URL cannot serve as a base"));
		}

		ensure_secure("base_url", &self.base_url)?;
		ensure_secure("token_url", &self.resolved_token_url()?)?;

		if self.rate_limit_capacity == 0 {
			return Err(ConfigError::invalid_option("rate_limit_capacity", "must be positive"));
		}
		if self.rate_limit_window.is_zero() {
			return Err(ConfigError::invalid_option("rate_limit_window", "must be positive"));
		}
		if self.cache_enabled && self.cache_max_entries == 0 {
			return Err(ConfigError::invalid_option("cache_max_entries", "must be positive"));
		}
		if self.cache_max_bytes == Some(0) {
			return Err(ConfigError::invalid_option("cache_max_bytes", "must be positive"));
		}
		if self.max_retries == 0 {
			return Err(ConfigError::invalid_option(
				"max_retries",
				"the attempt budget must allow at least one attempt",
			));
		}
		if self.backoff_base > self.backoff_max {
			return Err(ConfigError::invalid_option(
				"backoff_base",
				"must not exceed backoff_max",
			));
		}
		if self.request_timeout.is_zero() {
			return Err(ConfigError::invalid_option("request_timeout", "must be positive"));
		}

		for (option, value) in [
			("rate_limit_window", self.rate_limit_window),
			("cache_ttl_default", self.cache_ttl_default),
			("backoff_max", self.backoff_max),
			("request_timeout", self.request_timeout),
			("token_refresh_margin", self.token_refresh_margin),
		] {
			if value > MAX_DURATION_OPTION {
				return Err(ConfigError::invalid_option(option, "must not exceed 365 days"));
			}
		}

		Ok(())
	}
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			client_id: None,
			client_secret: None,
			bearer_token: None,
			bearer_token_expires_at: None,
			base_url: default_base_url(),
			token_url: None,
			api_version: None,
			user_agent: format!("tcgplayer-client/{}", env!("CARGO_PKG_VERSION")),
			rate_limit_capacity: 10,
			rate_limit_window: Duration::from_secs(1),
			cache_enabled: true,
			cache_ttl_default: Duration::from_secs(300),
			cache_max_entries: 1_000,
			cache_max_bytes: None,
			max_retries: 3,
			backoff_base: Duration::from_secs(1),
			backoff_max: Duration::from_secs(30),
			backoff_jitter: true,
			request_timeout: Duration::from_secs(30),
			token_refresh_margin: Duration::from_secs(60),
			store_context_enabled: false,
			token_cache_path: None,
		}
	}
}

struct EnvReader<F>(F);
impl<F> EnvReader<F>
where
	F: Fn(&str) -> Option<String>,
{
	fn string(&self, var: &str) -> Option<String> {
		(self.0)(var)
			.map(|value| value.trim().to_owned())
			.filter(|value| !value.is_empty())
	}

	fn parse<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
	where
		T: FromStr,
		T::Err: Display,
	{
		self.string(var)
			.map(|raw| {
				raw.parse::<T>()
					.map_err(|e| ConfigError::InvalidEnv { var, reason: e.to_string() })
			})
			.transpose()
	}

	fn millis(&self, var: &'static str) -> Result<Option<Duration>, ConfigError> {
		Ok(self.parse::<u64>(var)?.map(Duration::from_millis))
	}

	fn flag(&self, var: &'static str) -> Result<Option<bool>, ConfigError> {
		self.string(var)
			.map(|raw| match raw.to_ascii_lowercase().as_str() {
				"1" | "true" | "yes" | "on" => Ok(true),
				"0" | "false" | "no" | "off" => Ok(false),
				_ => Err(ConfigError::InvalidEnv {
					var,
					reason: format!("`{raw}` is not a boolean"),
				}),
			})
			.transpose()
	}
}

fn default_base_url() -> Url {
	Url::parse(DEFAULT_BASE_URL).unwrap_or_else(|_| unreachable!("default base URL is valid"))
}

fn parse_url(value: &str) -> Result<Url, ConfigError> {
	Url::parse(value).map_err(|source| ConfigError::InvalidUrl { value: value.to_owned(), source })
}

fn parse_instant(value: &str) -> Option<OffsetDateTime> {
	OffsetDateTime::parse(value, &Rfc3339)
		.or_else(|_| OffsetDateTime::parse(value, &Rfc2822))
		.ok()
}

fn ensure_secure(endpoint: &'static str, url: &Url) -> Result<(), ConfigError> {
	let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));

	if url.scheme() == "https" || (url.scheme() == "http" && loopback) {
		Ok(())
	} else {
		Err(ConfigError::InsecureEndpoint { endpoint, url: url.to_string() })
	}
}

mod millis {
	// crates.io
	use serde::{Deserialize, Deserializer, Serializer};
	// self
	use super::Duration;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
