//! `tcgplayer_client_operation_total` counter.
//!
//! One increment per [`Outcome`] of an [`Operation`], labeled `operation` (`request`,
//! `token_exchange`) and `outcome` (`attempt`, `cache_hit`, `retry`, `success`,
//! `failure`). A request served from the cache records only `cache_hit`. Network requests
//! record `attempt` on every try and `retry` before every backoff; the last label is always
//! `success` or `failure`.

// self
use crate::obs::{Operation, Outcome};

/// Counter name exported through the global `metrics` recorder.
pub const OPERATION_COUNTER: &str = "tcgplayer_client_operation_total";

/// Increments [`OPERATION_COUNTER`]; a no-op without the `metrics` feature.
pub fn record_outcome(operation: Operation, outcome: Outcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		OPERATION_COUNTER,
		"operation" => operation.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (operation, outcome);
}
