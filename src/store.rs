//! Credential persistence: the on-disk record format, atomic file writes, and the
//! [`CredentialStore`] seam providers persist through.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	process,
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::{
	_prelude::*,
	auth::{ClientIdentity, Credential, CredentialBuilder, ScopeSet, TokenSecret},
};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence backend holding one credential record.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Replaces the stored record with `credential`.
	fn save<'a>(&'a self, credential: &'a Credential) -> StoreFuture<'a, ()>;

	/// Reads the stored record back.
	fn load(&self) -> StoreFuture<'_, Credential>;
}

/// Error type produced by credential stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Nothing has been stored at the location yet.
	#[error("No credential record at {path}.")]
	NotFound {
		/// Location that was read.
		path: String,
	},
	/// The stored content is not a well-formed credential record.
	#[error("Credential record at {path} is corrupt: {message}.")]
	Corrupt {
		/// Location that was read.
		path: String,
		/// Decoding or validation failure.
		message: String,
	},
	/// The storage backend failed.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Persisted form of a [`Credential`].
///
/// Optional fields are omitted rather than written as `null`; `expiresAt` is unix seconds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
	/// Bearer-usable access token.
	pub access_token: TokenSecret,
	/// Absolute expiry instant.
	#[serde(with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
	/// Refresh token, when the grant issued one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Client identifier able to exchange the refresh token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	/// Client secret paired with `client_id`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_secret: Option<TokenSecret>,
	/// Granted scopes.
	#[serde(default)]
	pub scope: ScopeSet,
}
impl CredentialRecord {
	/// Validates the record and rebuilds the credential it describes.
	pub fn into_credential(self) -> Result<Credential, String> {
		let mut builder: CredentialBuilder = Credential::builder(self.access_token.expose())
			.expires_at(self.expires_at)
			.scope(self.scope);

		match (self.client_id, self.client_secret) {
			(Some(id), Some(secret)) => {
				let client =
					ClientIdentity::new(id, secret.expose()).map_err(|e| e.to_string())?;

				builder = builder.client(client);
			},
			(None, None) => {},
			_ => return Err("clientId and clientSecret must be stored together".into()),
		}
		if let Some(refresh) = self.refresh_token {
			builder = builder.refresh_token(refresh.expose());
		}

		builder.build().map_err(|e| e.to_string())
	}
}
impl From<&Credential> for CredentialRecord {
	fn from(credential: &Credential) -> Self {
		let client = credential.client();

		Self {
			access_token: credential.access_token().clone(),
			expires_at: credential.expires_at(),
			refresh_token: credential.refresh_token().cloned(),
			client_id: client.map(|c| c.client_id.to_string()),
			client_secret: client.map(|c| c.client_secret.clone()),
			scope: credential.scope().clone(),
		}
	}
}
impl Debug for CredentialRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialRecord")
			.field("expires_at", &self.expires_at)
			.field("has_refresh_token", &self.refresh_token.is_some())
			.field("client_id", &self.client_id)
			.field("scope", &self.scope)
			.finish_non_exhaustive()
	}
}

/// Writes `credential` to `path`, replacing any previous record atomically.
///
/// The record goes to a sibling temp file which is synced and then renamed over `path`, so
/// readers observe either the old record or the new one. Missing parent directories are
/// created.
pub fn save(path: impl AsRef<Path>, credential: &Credential) -> Result<(), StoreError> {
	let path = path.as_ref();

	ensure_parent_exists(path)?;

	let serialized = serde_json::to_vec_pretty(&CredentialRecord::from(credential))
		.map_err(|e| backend(format!("Failed to serialize credential record: {e}")))?;
	let tmp_path = temp_sibling(path);

	{
		let mut file = File::create(&tmp_path)
			.map_err(|e| backend(format!("Failed to create {}: {e}", tmp_path.display())))?;

		file.write_all(&serialized)
			.map_err(|e| backend(format!("Failed to write {}: {e}", tmp_path.display())))?;
		file.sync_all()
			.map_err(|e| backend(format!("Failed to sync {}: {e}", tmp_path.display())))?;
	}

	fs::rename(&tmp_path, path).map_err(|e| {
		let _ = fs::remove_file(&tmp_path);

		backend(format!("Failed to replace {}: {e}", path.display()))
	})
}

/// Reads the credential record stored at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<Credential, StoreError> {
	let path = path.as_ref();
	let bytes = fs::read(path).map_err(|e| match e.kind() {
		ErrorKind::NotFound => StoreError::NotFound { path: path.display().to_string() },
		_ => backend(format!("Failed to read {}: {e}", path.display())),
	})?;
	let corrupt =
		|message: String| StoreError::Corrupt { path: path.display().to_string(), message };
	let mut de = serde_json::Deserializer::from_slice(&bytes);
	let record: CredentialRecord =
		serde_path_to_error::deserialize(&mut de).map_err(|e| corrupt(e.to_string()))?;

	de.end().map_err(|e| corrupt(e.to_string()))?;

	record.into_credential().map_err(corrupt)
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| {
			backend(format!("Failed to create store directory {}: {e}", parent.display()))
		})?;
	}

	Ok(())
}

// Every write gets its own temp file, so concurrent saves to one path never share one.
fn temp_sibling(path: &Path) -> PathBuf {
	static NEXT: AtomicU64 = AtomicU64::new(0);

	let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
	let seq = NEXT.fetch_add(1, Ordering::Relaxed);

	path.with_file_name(format!(".{name}.{}.{seq}.tmp", process::id()))
}

fn backend(message: String) -> StoreError {
	StoreError::Backend { message }
}
