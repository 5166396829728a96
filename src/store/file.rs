//! File-backed [`CredentialStore`] for CLIs, bots, and single-user services.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{self, CredentialStore, StoreError, StoreFuture},
};

/// Persists one credential record as JSON at a fixed path.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
}
impl FileStore {
	/// Targets `path`; nothing is read or written until the first operation.
	pub fn open(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Location of the record.
	pub fn path(&self) -> &Path {
		&self.path
	}
}
impl CredentialStore for FileStore {
	fn save<'a>(&'a self, credential: &'a Credential) -> StoreFuture<'a, ()> {
		Box::pin(async move { store::save(&self.path, credential) })
	}

	fn load(&self) -> StoreFuture<'_, Credential> {
		Box::pin(async move { store::load(&self.path) })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, fs, process};
	// self
	use super::*;
	use crate::auth::{ClientIdentity, ScopeSet};

	#[tokio::test]
	async fn save_and_reload_round_trip() {
		let path = env::temp_dir().join(format!(
			"spotify_auth_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		));
		let store = FileStore::open(&path);

		assert!(matches!(store.load().await, Err(StoreError::NotFound { .. })));

		let credential = Credential::builder("access-token")
			.refresh_token("rt1")
			.client(ClientIdentity::new("id", "secret").expect("Client fixture should be valid."))
			.scope(ScopeSet::from_str("streaming").expect("Scope fixture should parse."))
			.expires_in(Duration::hours(1))
			.build()
			.expect("Credential fixture should build.");

		store.save(&credential).await.expect("File store should persist the credential.");

		let reopened = FileStore::open(store.path());

		assert_eq!(reopened.load().await.expect("Record should reload."), credential);

		fs::remove_file(&path).expect("Temporary record should be removable.");
	}
}
