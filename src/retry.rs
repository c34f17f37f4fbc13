//! Attempt budget, exponential backoff, and failure classification for the executor.

// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, config::ClientConfig, http::MAX_RETRY_AFTER};

/// What the executor does with a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
	/// Sleep for the delay, then try again.
	Retry(Duration),
	/// Drop the rejected token, exchange a new one, and retry without consuming budget.
	Reauthenticate,
	/// Surface the error unchanged.
	Fail,
	/// Surface the error wrapped in [`Error::RetryExhausted`].
	Exhausted,
}

/// Facts about the call that shape retry decisions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttemptContext {
	/// Attempts consumed from the budget so far, including the one that just failed.
	pub consumed: u32,
	/// `true` for anything other than `GET`/`HEAD`.
	pub is_write: bool,
	/// `true` when the call carries an idempotency key.
	pub idempotent: bool,
	/// `true` once the call has already re-authenticated after a 401.
	pub reauthenticated: bool,
}

/// Retry budget and backoff curve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	max_attempts: u32,
	backoff_base: Duration,
	backoff_max: Duration,
	jitter: bool,
}
impl RetryPolicy {
	/// Creates a jittered policy allowing `max_attempts` attempts in total.
	pub fn new(max_attempts: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
		Self { max_attempts: max_attempts.max(1), backoff_base, backoff_max, jitter: true }
	}

	/// Reads the budget and backoff curve from configuration.
	pub fn from_config(config: &ClientConfig) -> Self {
		Self::new(config.max_retries, config.backoff_base, config.backoff_max)
			.with_jitter(config.backoff_jitter)
	}

	/// Enables or disables the additive jitter.
	pub fn with_jitter(mut self, enabled: bool) -> Self {
		self.jitter = enabled;

		self
	}

	/// Total attempts allowed per call.
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	/// Delay before the `retry`-th retry (1-based), jittered when enabled.
	pub fn backoff(&self, retry: u32) -> Duration {
		if self.jitter { self.backoff_with_rng(retry, &mut rand::rng()) } else { self.curve(retry) }
	}

	/// Same as [`backoff`](Self::backoff) with a caller-supplied RNG.
	pub fn backoff_with_rng<R>(&self, retry: u32, rng: &mut R) -> Duration
	where
		R: Rng + ?Sized,
	{
		let delay = self.curve(retry);
		let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
		let extra = rng.random_range(0..=millis / 4);

		delay.saturating_add(Duration::from_millis(extra)).min(self.backoff_max)
	}

	/// Delay before retrying after `error`: the server's Retry-After when present,
	/// clamped to [`MAX_RETRY_AFTER`], otherwise the backoff curve.
	pub fn delay_for(&self, error: &Error, retry: u32) -> Duration {
		match error.retry_after() {
			Some(hint) => hint.min(MAX_RETRY_AFTER),
			None => self.backoff(retry),
		}
	}

	/// Decides how the executor handles a failed attempt.
	pub fn classify(&self, error: &Error, context: AttemptContext) -> Disposition {
		if error.status() == Some(401) && matches!(error, Error::Api(_)) {
			return if context.reauthenticated {
				Disposition::Fail
			} else {
				Disposition::Reauthenticate
			};
		}
		if !error.is_retryable() {
			return Disposition::Fail;
		}
		if context.is_write && !context.idempotent && error.is_ambiguous() {
			return Disposition::Fail;
		}
		if context.consumed >= self.max_attempts {
			return Disposition::Exhausted;
		}

		Disposition::Retry(self.delay_for(error, context.consumed))
	}

	fn curve(&self, retry: u32) -> Duration {
		let factor = 2_u32.saturating_pow(retry.saturating_sub(1));

		self.backoff_base.saturating_mul(factor).min(self.backoff_max)
	}
}
