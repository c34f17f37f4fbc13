//! In-memory response cache with per-entry TTL and LRU eviction.

pub mod key;

pub use key::{CacheKey, normalize_path};

// self
use crate::{
	_prelude::*,
	runtime::{Clock, SystemClock},
};

/// Hit/miss/eviction counters for a [`ResponseCache`].
#[derive(Debug, Default)]
pub struct CacheStats {
	hits: AtomicU64,
	misses: AtomicU64,
	evictions: AtomicU64,
	expirations: AtomicU64,
}
impl CacheStats {
	/// Lookups answered from the cache.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Lookups that found no live entry.
	pub fn misses(&self) -> u64 {
		self.misses.load(Ordering::Relaxed)
	}

	/// Entries dropped to honor the capacity bounds.
	pub fn evictions(&self) -> u64 {
		self.evictions.load(Ordering::Relaxed)
	}

	/// Entries dropped because their TTL elapsed.
	pub fn expirations(&self) -> u64 {
		self.expirations.load(Ordering::Relaxed)
	}

	fn bump(counter: &AtomicU64, by: usize) {
		counter.fetch_add(by as u64, Ordering::Relaxed);
	}
}

#[derive(Debug)]
struct Entry {
	value: Value,
	created_at: Instant,
	// `None` when the TTL reaches past what `Instant` can represent.
	expires_at: Option<Instant>,
	size: usize,
	tick: u64,
}
impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

#[derive(Debug, Default)]
struct CacheState {
	entries: HashMap<CacheKey, Entry>,
	// Recency index: lowest tick is least recently used.
	recency: BTreeMap<u64, CacheKey>,
	next_tick: u64,
	total_bytes: usize,
}
impl CacheState {
	fn touch(&mut self) -> u64 {
		self.next_tick += 1;

		self.next_tick
	}

	fn remove(&mut self, key: &CacheKey) -> Option<Entry> {
		let entry = self.entries.remove(key)?;

		self.recency.remove(&entry.tick);
		self.total_bytes -= entry.size;

		Some(entry)
	}

	fn pop_lru(&mut self) -> Option<Entry> {
		let (_, key) = self.recency.pop_first()?;
		let entry = self.entries.remove(&key)?;

		self.total_bytes -= entry.size;

		Some(entry)
	}

	fn purge_expired(&mut self, now: Instant) -> usize {
		let expired = self
			.entries
			.iter()
			.filter(|(_, entry)| entry.is_expired(now))
			.map(|(key, _)| key.clone())
			.collect::<Vec<_>>();

		for key in &expired {
			self.remove(key);
		}

		expired.len()
	}
}

/// Thread-safe response cache keyed by [`CacheKey`].
///
/// An entry is never served at or past its expiry instant. Inserting purges expired
/// entries first, then evicts least-recently-used entries until both the entry-count
/// bound and the optional byte bound hold.
pub struct ResponseCache {
	max_entries: usize,
	max_bytes: Option<usize>,
	clock: Arc<dyn Clock>,
	state: Mutex<CacheState>,
	stats: CacheStats,
}
impl ResponseCache {
	/// Creates a cache driven by the system clock.
	pub fn new(max_entries: usize, max_bytes: Option<usize>) -> Self {
		Self::with_clock(max_entries, max_bytes, Arc::new(SystemClock))
	}

	/// Creates a cache driven by the provided clock.
	pub fn with_clock(
		max_entries: usize,
		max_bytes: Option<usize>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			max_entries: max_entries.max(1),
			max_bytes,
			clock,
			state: Mutex::new(CacheState::default()),
			stats: CacheStats::default(),
		}
	}

	/// Returns the live value for `key`, promoting it to most recently used.
	pub fn get(&self, key: &CacheKey) -> Option<Value> {
		let now = self.clock.now();
		let mut state = self.state.lock();
		let expired = match state.entries.get(key) {
			Some(entry) => entry.is_expired(now),
			None => {
				CacheStats::bump(&self.stats.misses, 1);

				return None;
			},
		};

		if expired {
			state.remove(key);
			CacheStats::bump(&self.stats.expirations, 1);
			CacheStats::bump(&self.stats.misses, 1);

			return None;
		}

		let tick = state.touch();
		let entry = state.entries.get_mut(key)?;
		let previous = std::mem::replace(&mut entry.tick, tick);
		let value = entry.value.clone();

		state.recency.remove(&previous);
		state.recency.insert(tick, key.clone());
		CacheStats::bump(&self.stats.hits, 1);

		Some(value)
	}

	/// Stores `value` under `key` for `ttl`, replacing any previous entry.
	///
	/// Returns `false` without storing when `ttl` is zero or the value alone exceeds the
	/// byte bound; any previous entry for `key` is dropped in both cases.
	pub fn put(&self, key: CacheKey, value: Value, ttl: Duration) -> bool {
		let size = estimate_size(&value);
		let now = self.clock.now();
		let mut state = self.state.lock();

		state.remove(&key);

		if ttl.is_zero() || self.max_bytes.is_some_and(|limit| size > limit) {
			return false;
		}

		let expired = state.purge_expired(now);

		CacheStats::bump(&self.stats.expirations, expired);

		while state.entries.len() >= self.max_entries
			|| self.max_bytes.is_some_and(|limit| state.total_bytes + size > limit)
		{
			if state.pop_lru().is_none() {
				break;
			}

			CacheStats::bump(&self.stats.evictions, 1);
		}

		let tick = state.touch();

		state.recency.insert(tick, key.clone());
		state.total_bytes += size;
		state.entries.insert(
			key,
			Entry { value, created_at: now, expires_at: now.checked_add(ttl), size, tick },
		);

		true
	}

	/// Drops the entry for `key`; returns `true` if one existed.
	pub fn invalidate(&self, key: &CacheKey) -> bool {
		self.state.lock().remove(key).is_some()
	}

	/// Drops every entry whose path equals `prefix` or lies beneath it.
	pub fn invalidate_path(&self, prefix: &str) -> usize {
		let mut state = self.state.lock();
		let matching = state
			.entries
			.keys()
			.filter(|key| key.is_under(prefix))
			.cloned()
			.collect::<Vec<_>>();

		for key in &matching {
			state.remove(key);
		}

		matching.len()
	}

	/// Drops every entry.
	pub fn clear(&self) {
		let mut state = self.state.lock();

		state.entries.clear();
		state.recency.clear();
		state.total_bytes = 0;
	}

	/// Drops every expired entry and returns how many were removed.
	pub fn purge_expired(&self) -> usize {
		let now = self.clock.now();
		let expired = self.state.lock().purge_expired(now);

		CacheStats::bump(&self.stats.expirations, expired);

		expired
	}

	/// Age of the live entry for `key`.
	pub fn age(&self, key: &CacheKey) -> Option<Duration> {
		let now = self.clock.now();
		let state = self.state.lock();

		state
			.entries
			.get(key)
			.filter(|entry| !entry.is_expired(now))
			.map(|entry| now.saturating_duration_since(entry.created_at))
	}

	/// Number of stored entries, including expired ones not yet purged.
	pub fn len(&self) -> usize {
		self.state.lock().entries.len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Aggregate size estimate of stored entries.
	pub fn total_bytes(&self) -> usize {
		self.state.lock().total_bytes
	}

	/// Cache counters.
	pub fn stats(&self) -> &CacheStats {
		&self.stats
	}
}
impl Debug for ResponseCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResponseCache")
			.field("max_entries", &self.max_entries)
			.field("max_bytes", &self.max_bytes)
			.field("len", &self.len())
			.field("stats", &self.stats)
			.finish_non_exhaustive()
	}
}

fn estimate_size(value: &Value) -> usize {
	serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or_default()
}
