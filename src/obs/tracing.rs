// self
use crate::{_prelude::*, obs::Operation};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type Instrumented<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type Instrumented<F> = F;

/// Span wrapping one request or token exchange.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Creates a span tagged with the operation and its target (for example `GET /catalog`).
	pub fn new(operation: Operation, target: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"tcgplayer_client.operation",
				operation = operation.as_str(),
				target
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (operation, target);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a warning before a failed attempt is retried.
pub fn record_retry(attempt: u32, delay: Duration, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, %error, "Retrying request.");
	#[cfg(not(feature = "tracing"))]
	let _ = (attempt, delay, error);
}

/// Emits a debug event when a read is answered from the cache.
pub fn record_cache_hit(key: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(key, "Served response from cache.");
	#[cfg(not(feature = "tracing"))]
	let _ = key;
}

/// Emits a warning when the upstream asks the client to slow down.
pub fn record_throttled(pause: Duration) {
	#[cfg(feature = "tracing")]
	tracing::warn!(pause_ms = pause.as_millis() as u64, "Upstream throttled requests.");
	#[cfg(not(feature = "tracing"))]
	let _ = pause;
}

/// Emits a debug event when a rejected token forces a new exchange.
pub fn record_reauthentication() {
	#[cfg(feature = "tracing")]
	tracing::debug!("Bearer token rejected; re-authenticating.");
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn event_helpers_run_without_subscriber() {
		record_retry(1, Duration::from_millis(10), &Error::RateLimited { retry_after: None });
		record_cache_hit("GET /catalog/conditions");
		record_throttled(Duration::from_secs(1));
		record_reauthentication();
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = OperationSpan::new(Operation::Request, "GET /catalog/conditions");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
