//! Optional observability helpers for requests and token exchanges.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `tcgplayer_client.operation` with the
//!   `operation` and `target` fields, plus debug/warn events for retries, cache hits, and
//!   throttling.
//! - Enable `metrics` to increment the `tcgplayer_client_operation_total` counter for every
//!   attempt/cache hit/retry/success/failure, labeled by `operation` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// API call dispatched through the executor.
	Request,
	/// OAuth client-credentials exchange.
	TokenExchange,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::Request => "request",
			Operation::TokenExchange => "token_exchange",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// A network attempt was started.
	Attempt,
	/// The response was served from the cache.
	CacheHit,
	/// A failed attempt was scheduled for retry.
	Retry,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::CacheHit => "cache_hit",
			Outcome::Retry => "retry",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
