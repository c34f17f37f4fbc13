//! Sliding-window admission control for outbound requests.
//!
//! The limiter records the instant of every admission inside the rolling window. A caller
//! is admitted when fewer than `capacity` admissions remain in the window; otherwise it
//! sleeps until the oldest admission ages out. Check-and-consume happens under one lock
//! and the sleep happens with the lock released, so a cancelled waiter never holds a
//! credit.

// std
use std::collections::VecDeque;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::MAX_RETRY_AFTER,
	obs,
	runtime::{Clock, Sleeper, SystemClock, TokioSleeper},
};

#[derive(Debug, Default)]
struct WindowState {
	admissions: VecDeque<Instant>,
	throttled_until: Option<Instant>,
}
impl WindowState {
	fn prune(&mut self, now: Instant, window: Duration) {
		while self.admissions.front().is_some_and(|&at| now.saturating_duration_since(at) >= window)
		{
			self.admissions.pop_front();
		}
	}

	fn throttle_remaining(&mut self, now: Instant) -> Option<Duration> {
		match self.throttled_until {
			Some(until) if until > now => Some(until - now),
			Some(_) => {
				self.throttled_until = None;

				None
			},
			None => None,
		}
	}
}

/// Admission gate allowing at most `capacity` requests per rolling `window`.
pub struct RateLimiter {
	capacity: u32,
	window: Duration,
	clock: Arc<dyn Clock>,
	sleeper: Arc<dyn Sleeper>,
	state: Mutex<WindowState>,
	admitted: AtomicU64,
}
impl RateLimiter {
	/// Creates a limiter driven by the system clock and tokio timers.
	pub fn new(capacity: u32, window: Duration) -> Result<Self, ConfigError> {
		Self::with_time(capacity, window, Arc::new(SystemClock), Arc::new(TokioSleeper))
	}

	/// Creates a limiter driven by the provided clock and sleeper.
	pub fn with_time(
		capacity: u32,
		window: Duration,
		clock: Arc<dyn Clock>,
		sleeper: Arc<dyn Sleeper>,
	) -> Result<Self, ConfigError> {
		if capacity == 0 {
			return Err(ConfigError::invalid_option("rate_limit_capacity", "must be positive"));
		}
		if window.is_zero() {
			return Err(ConfigError::invalid_option("rate_limit_window", "must be positive"));
		}

		Ok(Self {
			capacity,
			window,
			clock,
			sleeper,
			state: Mutex::new(WindowState::default()),
			admitted: AtomicU64::new(0),
		})
	}

	/// Waits until a credit is available, then consumes it.
	pub async fn acquire(&self) {
		loop {
			let wait = match self.admit() {
				Ok(()) => return,
				Err(wait) => wait,
			};

			self.sleeper.sleep(wait).await;
		}
	}

	/// Consumes a credit if one is available right now.
	pub fn try_acquire(&self) -> bool {
		self.admit().is_ok()
	}

	/// Credits currently available; zero while throttled.
	pub fn available(&self) -> u32 {
		let now = self.clock.now();
		let mut state = self.state.lock();

		if state.throttle_remaining(now).is_some() {
			return 0;
		}

		state.prune(now, self.window);

		self.capacity.saturating_sub(u32::try_from(state.admissions.len()).unwrap_or(u32::MAX))
	}

	/// Pauses all admissions for `pause`, extending any pause already in effect.
	///
	/// Pauses longer than [`MAX_RETRY_AFTER`] are clamped to it.
	pub fn throttle(&self, pause: Duration) {
		let pause = pause.min(MAX_RETRY_AFTER);
		let now = self.clock.now();
		let until = now.checked_add(pause).unwrap_or(now);
		let mut state = self.state.lock();

		if state.throttled_until.is_none_or(|current| current < until) {
			state.throttled_until = Some(until);
		}

		drop(state);
		obs::record_throttled(pause);
	}

	/// Total admissions granted so far.
	pub fn admitted(&self) -> u64 {
		self.admitted.load(Ordering::Relaxed)
	}

	/// Configured capacity per window.
	pub fn capacity(&self) -> u32 {
		self.capacity
	}

	/// Configured window length.
	pub fn window(&self) -> Duration {
		self.window
	}

	fn admit(&self) -> Result<(), Duration> {
		let now = self.clock.now();
		let mut state = self.state.lock();

		if let Some(wait) = state.throttle_remaining(now) {
			return Err(wait);
		}

		state.prune(now, self.window);

		if state.admissions.len() < self.capacity as usize {
			state.admissions.push_back(now);
			self.admitted.fetch_add(1, Ordering::Relaxed);

			return Ok(());
		}

		match state.admissions.front() {
			Some(&oldest) => Err(oldest
				.checked_add(self.window)
				.map_or(self.window, |free_at| free_at.saturating_duration_since(now))),
			None => Err(self.window),
		}
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter")
			.field("capacity", &self.capacity)
			.field("window", &self.window)
			.field("admitted", &self.admitted())
			.finish_non_exhaustive()
	}
}
