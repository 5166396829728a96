//! Single-flight credential cache shared by the refreshing providers.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret},
	clock::Clock,
	error::AuthErrorReason,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::RefreshMetrics,
	store::CredentialStore,
};

/// Terminal rejection remembered after `invalid_grant` / `invalid_client`.
#[derive(Clone, Debug)]
struct Revocation {
	reason: AuthErrorReason,
	message: String,
}
impl Revocation {
	fn from_error(err: &Error) -> Option<Self> {
		match err {
			Error::InvalidGrant { reason } =>
				Some(Self { reason: AuthErrorReason::InvalidGrant, message: reason.clone() }),
			Error::InvalidClient { reason } =>
				Some(Self { reason: AuthErrorReason::InvalidClient, message: reason.clone() }),
			_ => None,
		}
	}

	fn to_error(&self) -> Error {
		let reason = format!("{} (rejected earlier; re-authentication required)", self.message);

		match self.reason {
			AuthErrorReason::InvalidClient => Error::InvalidClient { reason },
			_ => Error::InvalidGrant { reason },
		}
	}
}

/// Cached credential plus the guard that serializes renewals.
///
/// Reads of a fresh credential only take the `RwLock` read guard. Renewals take the async
/// guard, re-check the cache, run the exchange, persist, and publish, so overlapping callers
/// collapse into one exchange and observe the same result.
///
/// A renewed credential whose save failed stays published but is marked unsaved. Every later
/// call retries the save before handing out a credential.
pub(crate) struct CredentialCache {
	kind: FlowKind,
	current: RwLock<Option<Credential>>,
	revoked: RwLock<Option<Revocation>>,
	guard: AsyncMutex<()>,
	store: Option<Arc<dyn CredentialStore>>,
	unsaved: AtomicBool,
	metrics: Arc<RefreshMetrics>,
}
impl CredentialCache {
	pub(crate) fn new(kind: FlowKind, seed: Option<Credential>) -> Self {
		Self {
			kind,
			current: RwLock::new(seed),
			revoked: RwLock::new(None),
			guard: AsyncMutex::new(()),
			store: None,
			unsaved: AtomicBool::new(false),
			metrics: Default::default(),
		}
	}

	pub(crate) fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
		self.store = Some(store);

		self
	}

	pub(crate) fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	pub(crate) fn snapshot(&self) -> Option<Credential> {
		self.current.read().clone()
	}

	/// Returns a credential valid beyond `margin`, renewing it when needed.
	///
	/// With `rejected` set, the cached credential is renewed if it still carries the rejected
	/// token; a credential that was already replaced by a concurrent renewal is returned as is.
	pub(crate) async fn get_or_renew<F, Fut>(
		&self,
		clock: &dyn Clock,
		margin: Duration,
		rejected: Option<&TokenSecret>,
		renew: F,
	) -> Result<Credential>
	where
		F: FnOnce(Option<Credential>) -> Fut,
		Fut: Future<Output = Result<Credential>>,
	{
		self.ensure_not_revoked()?;

		if let Some(fresh) = self.fresh(clock, margin, rejected) {
			self.metrics.record_reuse();

			return Ok(fresh);
		}

		let _singleflight = self.guard.lock().await;

		self.ensure_not_revoked()?;
		self.persist_unsaved().await?;

		// Another caller may have renewed while this one waited for the guard.
		if let Some(fresh) = self.fresh(clock, margin, rejected) {
			self.metrics.record_reuse();

			return Ok(fresh);
		}

		let stage = if rejected.is_some() { "force_refresh" } else { "renew" };
		let span = FlowSpan::new(self.kind, stage);

		obs::record_flow_outcome(self.kind, FlowOutcome::Attempt);
		self.metrics.record_exchange(rejected.is_some());

		let result = span.instrument(self.renew_and_publish(renew)).await;

		self.metrics.record_outcome(result.is_ok());

		match &result {
			Ok(_) => obs::record_flow_outcome(self.kind, FlowOutcome::Success),
			Err(err) => {
				obs::record_flow_outcome(self.kind, FlowOutcome::Failure);
				obs::trace_flow_failure(self.kind, err);
			},
		}

		result
	}

	async fn renew_and_publish<F, Fut>(&self, renew: F) -> Result<Credential>
	where
		F: FnOnce(Option<Credential>) -> Fut,
		Fut: Future<Output = Result<Credential>>,
	{
		let credential = match renew(self.snapshot()).await {
			Ok(credential) => credential,
			Err(err) => {
				if let Some(revocation) = Revocation::from_error(&err) {
					*self.revoked.write() = Some(revocation);
				}

				return Err(err);
			},
		};
		let persisted = match &self.store {
			Some(store) => store.save(&credential).await,
			None => Ok(()),
		};

		// The previous refresh token may already be rotated away, so publish regardless.
		self.unsaved.store(persisted.is_err(), Ordering::Release);
		*self.current.write() = Some(credential.clone());

		persisted.map_err(Error::from)?;

		Ok(credential)
	}

	/// Retries the save of a published credential whose earlier save failed.
	///
	/// Must run under the single-flight guard.
	async fn persist_unsaved(&self) -> Result<()> {
		if !self.unsaved.load(Ordering::Acquire) {
			return Ok(());
		}

		let (Some(store), Some(credential)) = (&self.store, self.snapshot()) else {
			self.unsaved.store(false, Ordering::Release);

			return Ok(());
		};

		if let Err(err) = store.save(&credential).await {
			let err = Error::from(err);

			obs::trace_flow_failure(self.kind, &err);

			return Err(err);
		}

		self.unsaved.store(false, Ordering::Release);

		Ok(())
	}

	fn fresh(
		&self,
		clock: &dyn Clock,
		margin: Duration,
		rejected: Option<&TokenSecret>,
	) -> Option<Credential> {
		if self.unsaved.load(Ordering::Acquire) {
			return None;
		}

		let current = self.current.read();
		let credential = current.as_ref()?;

		if rejected.is_some_and(|token| token == credential.access_token()) {
			return None;
		}
		if credential.needs_refresh_at(clock.now(), margin) {
			return None;
		}

		Some(credential.clone())
	}

	fn ensure_not_revoked(&self) -> Result<()> {
		match self.revoked.read().as_ref() {
			Some(revocation) => Err(revocation.to_error()),
			None => Ok(()),
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		clock::ManualClock,
		store::{MemoryStore, StoreError, StoreFuture},
	};

	const T0: OffsetDateTime = macros::datetime!(2025-01-01 00:00 UTC);

	fn credential(token: &str, ttl: i64) -> Credential {
		Credential::builder(token)
			.issued_at(T0)
			.expires_in(Duration::seconds(ttl))
			.build()
			.expect("Credential fixture should build.")
	}

	#[tokio::test]
	async fn fresh_credentials_skip_renewal() {
		let clock = ManualClock::new(T0);
		let cache = CredentialCache::new(FlowKind::ClientCredentials, Some(credential("a", 3600)));
		let calls = AtomicUsize::new(0);
		let renewed = cache
			.get_or_renew(&clock, Duration::ZERO, None, |_| async {
				calls.fetch_add(1, Ordering::SeqCst);

				Ok(credential("b", 3600))
			})
			.await
			.expect("Fresh credential should be returned.");

		assert_eq!(renewed.access_token().expose(), "a");
		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert_eq!(cache.metrics().attempts(), 0);
		assert_eq!(cache.metrics().reuses(), 1);
	}

	#[tokio::test]
	async fn rejected_token_forces_one_renewal_only_while_current() {
		let clock = ManualClock::new(T0);
		let cache = CredentialCache::new(FlowKind::Refresh, Some(credential("a", 3600)));
		let rejected = TokenSecret::new("a");
		let first = cache
			.get_or_renew(&clock, Duration::ZERO, Some(&rejected), |_| async {
				Ok(credential("b", 3600))
			})
			.await
			.expect("Forced renewal should succeed.");

		assert_eq!(first.access_token().expose(), "b");

		let second = cache
			.get_or_renew(&clock, Duration::ZERO, Some(&rejected), |_| async {
				Ok(credential("c", 3600))
			})
			.await
			.expect("Already replaced credential should be reused.");

		assert_eq!(second.access_token().expose(), "b");
		assert_eq!(cache.metrics().attempts(), 1);
		assert_eq!(cache.metrics().forced(), 1);
		assert_eq!(cache.metrics().reuses(), 1);
	}

	#[tokio::test]
	async fn invalid_grant_is_sticky() {
		let clock = ManualClock::new(T0);
		let cache = CredentialCache::new(FlowKind::Refresh, None);
		let err = cache
			.get_or_renew(&clock, Duration::ZERO, None, |_| async {
				Err(Error::InvalidGrant { reason: "Refresh token revoked".into() })
			})
			.await
			.expect_err("Revoked grant must fail.");

		assert!(matches!(err, Error::InvalidGrant { .. }));

		let again = cache
			.get_or_renew(&clock, Duration::ZERO, None, |_| async { Ok(credential("x", 3600)) })
			.await
			.expect_err("Revocation must short-circuit later calls.");

		assert!(matches!(again, Error::InvalidGrant { ref reason } if reason.contains("Refresh token revoked")));
		assert_eq!(cache.metrics().attempts(), 1);
	}

	#[tokio::test]
	async fn renewed_credentials_are_persisted_before_return() {
		let clock = ManualClock::new(T0);
		let store = Arc::new(MemoryStore::default());
		let cache = CredentialCache::new(FlowKind::Refresh, None).with_store(store.clone());
		let renewed = cache
			.get_or_renew(&clock, Duration::ZERO, None, |_| async { Ok(credential("p", 3600)) })
			.await
			.expect("Renewal should succeed.");

		assert_eq!(store.snapshot(), Some(renewed));
		assert_eq!(store.saves(), 1);
	}

	#[derive(Default)]
	struct FlakyStore {
		inner: MemoryStore,
		attempts: AtomicUsize,
	}
	impl CredentialStore for FlakyStore {
		fn save<'a>(&'a self, credential: &'a Credential) -> StoreFuture<'a, ()> {
			Box::pin(async move {
				if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
					return Err(StoreError::Backend { message: "disk full".into() });
				}

				self.inner.save(credential).await
			})
		}

		fn load(&self) -> StoreFuture<'_, Credential> {
			self.inner.load()
		}
	}

	#[tokio::test]
	async fn failed_save_is_retried_before_the_credential_is_reused() {
		let clock = ManualClock::new(T0);
		let store = Arc::new(FlakyStore::default());
		let cache = CredentialCache::new(FlowKind::Refresh, None).with_store(store.clone());
		let exchanges = AtomicUsize::new(0);
		let renew = |_| async {
			exchanges.fetch_add(1, Ordering::SeqCst);

			Ok(credential("rotated", 3600))
		};
		let err = cache
			.get_or_renew(&clock, Duration::ZERO, None, renew)
			.await
			.expect_err("A failed save must surface to the caller.");

		assert!(matches!(err, Error::Storage(StoreError::Backend { .. })));
		assert_eq!(
			cache.snapshot().map(|c| c.access_token().expose().to_owned()),
			Some("rotated".into())
		);
		assert_eq!(store.inner.saves(), 0);

		let reused = cache
			.get_or_renew(&clock, Duration::ZERO, None, renew)
			.await
			.expect("The retried save should succeed.");

		assert_eq!(reused.access_token().expose(), "rotated");
		assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
		assert_eq!(store.inner.snapshot(), Some(reused));
		assert_eq!(exchanges.load(Ordering::SeqCst), 1);

		cache
			.get_or_renew(&clock, Duration::ZERO, None, renew)
			.await
			.expect("A persisted credential should be reused.");

		assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
	}
}
