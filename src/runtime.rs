//! Time sources and sleep primitives injected into the limiter, retry loop, and caches.

// self
use crate::_prelude::*;

/// Boxed future returned by [`Sleeper::sleep`].
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send + Sync>>;

/// Monotonic time source.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> Instant;
}

/// Async sleep abstraction so waits can be observed or skipped in tests.
pub trait Sleeper
where
	Self: Send + Sync,
{
	/// Suspends for `duration`.
	fn sleep(&self, duration: Duration) -> SleepFuture;
}

/// [`Clock`] backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// [`Sleeper`] backed by [`tokio::time::sleep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;
impl Sleeper for TokioSleeper {
	fn sleep(&self, duration: Duration) -> SleepFuture {
		Box::pin(tokio::time::sleep(duration))
	}
}

/// Manually driven clock that doubles as a [`Sleeper`].
///
/// Sleeping advances the clock by the requested duration and returns immediately, and every
/// requested sleep is recorded so tests can assert backoff schedules.
#[derive(Clone, Debug)]
pub struct ManualClock {
	origin: Instant,
	offset: Arc<Mutex<Duration>>,
	sleeps: Arc<Mutex<Vec<Duration>>>,
}
impl ManualClock {
	/// Creates a clock anchored at the current instant.
	pub fn new() -> Self {
		Self {
			origin: Instant::now(),
			offset: Arc::new(Mutex::new(Duration::ZERO)),
			sleeps: Arc::new(Mutex::new(Vec::new())),
		}
	}

	/// Moves the clock forward.
	pub fn advance(&self, by: Duration) {
		*self.offset.lock() += by;
	}

	/// Time elapsed since the clock was created.
	pub fn elapsed(&self) -> Duration {
		*self.offset.lock()
	}

	/// Durations requested through [`Sleeper::sleep`], in call order.
	pub fn sleeps(&self) -> Vec<Duration> {
		self.sleeps.lock().clone()
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}
impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.origin + *self.offset.lock()
	}
}
impl Sleeper for ManualClock {
	fn sleep(&self, duration: Duration) -> SleepFuture {
		self.sleeps.lock().push(duration);
		self.advance(duration);

		Box::pin(std::future::ready(()))
	}
}
