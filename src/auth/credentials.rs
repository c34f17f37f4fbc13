//! Credential lifecycle: cached bearer tokens, single-flight exchanges, and invalidation.
//!
//! [`CredentialManager::ensure_token`] hands out a token that stays valid for at least the
//! configured refresh margin. When the cached token is missing or too close to expiry the
//! manager takes its single-flight guard, re-checks the cache and the [`TokenStore`], and
//! only then calls the token endpoint, so concurrent callers share one exchange.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenSecret},
	config::ClientConfig,
	http::HttpTransport,
	oauth::TokenExchange,
	obs::{self, Operation, OperationSpan, Outcome},
	runtime::Clock,
	store::{StoreKey, TokenStore},
};

/// Lifetime assumed for a pre-supplied bearer token without an explicit expiry.
pub const DEFAULT_BEARER_LIFETIME: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Counters describing token exchange activity.
#[derive(Debug, Default)]
pub struct ExchangeMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl ExchangeMetrics {
	/// Returns the total number of exchanges started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of successful exchanges.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed exchanges.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}

/// Owns the bearer token used by a [`Client`](crate::Client).
pub struct CredentialManager {
	exchange: Option<TokenExchange>,
	store: Arc<dyn TokenStore>,
	key: StoreKey,
	refresh_margin: Duration,
	clock: Arc<dyn Clock>,
	wall_anchor: OffsetDateTime,
	instant_anchor: Instant,
	current: RwLock<Option<AccessToken>>,
	singleflight: AsyncMutex<()>,
	metrics: ExchangeMetrics,
}
impl CredentialManager {
	/// Builds a manager from validated configuration.
	///
	/// A configured bearer token seeds the cache; it expires at `bearer_token_expires_at`
	/// or [`DEFAULT_BEARER_LIFETIME`] from now.
	pub fn new(
		config: &ClientConfig,
		transport: Arc<dyn HttpTransport>,
		clock: Arc<dyn Clock>,
		store: Arc<dyn TokenStore>,
	) -> Result<Self> {
		let exchange = match (config.client_id(), config.client_secret()) {
			(Some(client_id), Some(secret)) => Some(TokenExchange::new(
				&config.resolved_token_url()?,
				client_id,
				secret,
				transport,
				config.request_timeout,
			)),
			_ => None,
		};
		let key = match config.client_id() {
			Some(client_id) if exchange.is_some() => StoreKey::client(client_id),
			_ => StoreKey::bearer(),
		};
		let wall_anchor = OffsetDateTime::now_utc();
		let seeded = config.bearer_token().map(|token| {
			let expires_at =
				config.bearer_token_expires_at.unwrap_or(wall_anchor + DEFAULT_BEARER_LIFETIME);

			AccessToken::new(token.clone(), wall_anchor.min(expires_at), expires_at)
		});

		Ok(Self {
			exchange,
			store,
			key,
			refresh_margin: config.token_refresh_margin,
			instant_anchor: clock.now(),
			clock,
			wall_anchor,
			current: RwLock::new(seeded),
			singleflight: AsyncMutex::new(()),
			metrics: ExchangeMetrics::default(),
		})
	}

	/// Returns a token valid for at least the refresh margin, exchanging credentials if needed.
	pub async fn ensure_token(&self) -> Result<AccessToken> {
		if let Some(token) = self.cached() {
			return Ok(token);
		}

		let _singleflight = self.singleflight.lock().await;

		if let Some(token) = self.cached() {
			return Ok(token);
		}

		let now = self.now_utc();

		if let Some(token) = self
			.store
			.fetch(&self.key)
			.await?
			.filter(|token| token.is_usable_at(now, self.refresh_margin))
		{
			*self.current.write() = Some(token.clone());

			return Ok(token);
		}

		self.exchange_locked().await
	}

	/// Forces a fresh exchange, replacing any cached token.
	pub async fn authenticate(&self) -> Result<AccessToken> {
		let _singleflight = self.singleflight.lock().await;

		self.exchange_locked().await
	}

	/// Clears the cached and persisted token.
	pub async fn invalidate(&self) -> Result<()> {
		let _singleflight = self.singleflight.lock().await;

		self.current.write().take();
		self.store.remove(&self.key).await?;

		Ok(())
	}

	/// Clears the cached token only if it is still `rejected`.
	///
	/// Returns `true` when the token was cleared. Concurrent callers that saw the same
	/// rejected token therefore trigger a single replacement exchange.
	pub async fn invalidate_token(&self, rejected: &TokenSecret) -> Result<bool> {
		let _singleflight = self.singleflight.lock().await;
		let matches =
			self.current.read().as_ref().is_some_and(|token| token.secret() == rejected);

		if !matches {
			return Ok(false);
		}

		self.current.write().take();
		self.store.remove(&self.key).await?;

		Ok(true)
	}

	/// Returns `true` when a usable token is cached.
	pub fn is_authenticated(&self) -> bool {
		self.cached().is_some()
	}

	/// Returns the cached token, usable or not.
	pub fn current(&self) -> Option<AccessToken> {
		self.current.read().clone()
	}

	/// Returns `true` when client credentials are configured.
	pub fn can_exchange(&self) -> bool {
		self.exchange.is_some()
	}

	/// Exchange counters.
	pub fn metrics(&self) -> &ExchangeMetrics {
		&self.metrics
	}

	fn cached(&self) -> Option<AccessToken> {
		let now = self.now_utc();

		self.current
			.read()
			.as_ref()
			.filter(|token| token.is_usable_at(now, self.refresh_margin))
			.cloned()
	}

	fn now_utc(&self) -> OffsetDateTime {
		self.wall_anchor + self.clock.now().saturating_duration_since(self.instant_anchor)
	}

	async fn exchange_locked(&self) -> Result<AccessToken> {
		const OPERATION: Operation = Operation::TokenExchange;

		let Some(exchange) = &self.exchange else {
			return Err(Error::Authentication {
				reason: "no usable bearer token and no client credentials are configured".into(),
				status: None,
			});
		};
		let span = OperationSpan::new(OPERATION, self.key.as_str());

		self.metrics.record_attempt();
		obs::record_outcome(OPERATION, Outcome::Attempt);

		let result = span.instrument(exchange.exchange(self.now_utc())).await;

		match result {
			Ok(token) => {
				self.metrics.record_success();
				obs::record_outcome(OPERATION, Outcome::Success);
				*self.current.write() = Some(token.clone());
				self.store.save(&self.key, token.clone()).await?;

				Ok(token)
			},
			Err(e) => {
				self.metrics.record_failure();
				obs::record_outcome(OPERATION, Outcome::Failure);

				Err(e)
			},
		}
	}
}
impl Debug for CredentialManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialManager")
			.field("key", &self.key)
			.field("exchange", &self.exchange)
			.field("current", &self.current.read())
			.field("refresh_margin", &self.refresh_margin)
			.finish_non_exhaustive()
	}
}
