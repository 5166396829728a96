// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-provider counters for credential renewals.
///
/// Exchanges are real calls to the token endpoint. Reuses count calls answered from the cache,
/// including callers that waited on another caller's exchange.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	exchanges: AtomicU64,
	succeeded: AtomicU64,
	failed: AtomicU64,
	forced: AtomicU64,
	reused: AtomicU64,
}
impl RefreshMetrics {
	/// Token exchanges started.
	pub fn attempts(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Exchanges that produced a credential.
	pub fn successes(&self) -> u64 {
		self.succeeded.load(Ordering::Relaxed)
	}

	/// Exchanges that failed.
	pub fn failures(&self) -> u64 {
		self.failed.load(Ordering::Relaxed)
	}

	/// Exchanges started because the API rejected the cached access token.
	pub fn forced(&self) -> u64 {
		self.forced.load(Ordering::Relaxed)
	}

	/// Calls served from the cached credential.
	pub fn reuses(&self) -> u64 {
		self.reused.load(Ordering::Relaxed)
	}

	pub(crate) fn record_exchange(&self, forced: bool) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);

		if forced {
			self.forced.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub(crate) fn record_outcome(&self, ok: bool) {
		let counter = if ok { &self.succeeded } else { &self.failed };

		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_reuse(&self) {
		self.reused.fetch_add(1, Ordering::Relaxed);
	}
}
