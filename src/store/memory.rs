//! In-process [`CredentialStore`] for tests and ephemeral sessions.

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{CredentialStore, StoreError, StoreFuture},
};

/// Keeps the latest credential in memory and counts saves.
#[derive(Debug, Default)]
pub struct MemoryStore {
	slot: RwLock<Option<Credential>>,
	saves: AtomicUsize,
}
impl MemoryStore {
	/// Creates a store pre-populated with `credential`.
	pub fn with_credential(credential: Credential) -> Self {
		Self { slot: RwLock::new(Some(credential)), saves: AtomicUsize::new(0) }
	}

	/// Latest stored credential.
	pub fn snapshot(&self) -> Option<Credential> {
		self.slot.read().clone()
	}

	/// Number of successful saves.
	pub fn saves(&self) -> usize {
		self.saves.load(Ordering::Relaxed)
	}
}
impl CredentialStore for MemoryStore {
	fn save<'a>(&'a self, credential: &'a Credential) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			*self.slot.write() = Some(credential.clone());

			self.saves.fetch_add(1, Ordering::Relaxed);

			Ok(())
		})
	}

	fn load(&self) -> StoreFuture<'_, Credential> {
		Box::pin(async move {
			self.snapshot().ok_or_else(|| StoreError::NotFound { path: "<memory>".into() })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn save_replaces_and_counts() {
		let store = MemoryStore::default();

		assert!(matches!(store.load().await, Err(StoreError::NotFound { .. })));

		for token in ["first", "second"] {
			let credential = Credential::builder(token)
				.never_expires()
				.build()
				.expect("Credential fixture should build.");

			store.save(&credential).await.expect("Memory store saves never fail.");
		}

		assert_eq!(store.saves(), 2);
		assert_eq!(
			store.load().await.expect("Latest record should load.").access_token().expose(),
			"second"
		);
	}
}
