//! User-token provider renewed through the refresh-token grant.
//!
//! The provider is seeded with a refresh token obtained once through user consent (see
//! [`crate::consent`]) or reloaded from a persisted credential record. Each renewal exchanges
//! the current refresh token; a rotated `refresh_token` in the response replaces it and is
//! used by every later exchange, otherwise the previous one is carried forward. When a store
//! is attached, the renewed credential is saved before it is published or returned.

// self
use crate::{
	_prelude::*,
	auth::{ClientIdentity, Credential, TokenSecret},
	classify::{DefaultClassifier, TokenErrorClassifier},
	clock::{Clock, SystemClock},
	config::AuthConfig,
	error::ConfigError,
	http::TokenHttpClient,
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	obs::FlowKind,
	provider::{AuthProvider, CredentialCache, ProviderFuture, RefreshMetrics},
	store::{self, CredentialStore, FileStore},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Authorization-code provider specialized for the crate's reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestAuthorizationCode =
	AuthorizationCodeProvider<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Keeps a user credential valid by exchanging its refresh token.
pub struct AuthorizationCodeProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: AuthConfig,
	client: ClientIdentity,
	seed_refresh: TokenSecret,
	facade: BasicFacade<C, M>,
	classifier: Arc<dyn TokenErrorClassifier>,
	clock: Arc<dyn Clock>,
	cache: CredentialCache,
}
impl<C, M> AuthorizationCodeProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a provider seeded with a refresh token; the first call performs an exchange.
	pub fn with_http_client(
		config: AuthConfig,
		client: ClientIdentity,
		refresh_token: impl Into<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let seed_refresh = TokenSecret::new(refresh_token);

		if seed_refresh.is_empty() {
			return Err(ConfigError::MissingRefreshToken.into());
		}

		Self::assemble(config, client, seed_refresh, None, http_client, mapper)
	}

	/// Creates a provider from an existing credential, reusing its access token while valid.
	///
	/// The credential must carry a refresh token (and therefore a client identity).
	pub fn from_credential(
		config: AuthConfig,
		credential: Credential,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let (Some(refresh), Some(client)) =
			(credential.refresh_token().cloned(), credential.client().cloned())
		else {
			return Err(ConfigError::MissingRefreshToken.into());
		};

		config.check_scope(credential.scope())?;

		Self::assemble(config, client, refresh, Some(credential), http_client, mapper)
	}

	/// Rebuilds a provider from the record at `path` and keeps persisting renewals there.
	pub fn load_from_path(
		config: AuthConfig,
		path: impl Into<PathBuf>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let path = path.into();
		let credential = store::load(&path)?;

		Ok(Self::from_credential(config, credential, http_client, mapper)?
			.with_store(Arc::new(FileStore::open(path))))
	}

	/// Rebuilds a provider from `store` and keeps persisting renewals there.
	pub async fn load_from_store(
		config: AuthConfig,
		store: Arc<dyn CredentialStore>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let credential = store.load().await?;

		Ok(Self::from_credential(config, credential, http_client, mapper)?.with_store(store))
	}

	fn assemble(
		config: AuthConfig,
		client: ClientIdentity,
		seed_refresh: TokenSecret,
		seed: Option<Credential>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let facade = BasicFacade::from_config(&config, &client, http_client, mapper)?;

		Ok(Self {
			config,
			client,
			seed_refresh,
			facade,
			classifier: Arc::new(DefaultClassifier),
			clock: Arc::new(SystemClock),
			cache: CredentialCache::new(FlowKind::Refresh, seed),
		})
	}

	/// Persists every renewed credential to `store` before returning it.
	pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
		self.cache = self.cache.with_store(store);

		self
	}

	/// Persists every renewed credential to the file at `path`.
	pub fn with_persist_path(self, path: impl Into<PathBuf>) -> Self {
		self.with_store(Arc::new(FileStore::open(path)))
	}

	/// Replaces the time source.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Replaces the token error classifier.
	pub fn with_classifier(mut self, classifier: Arc<dyn TokenErrorClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Exchange counters for this provider.
	pub fn metrics(&self) -> &RefreshMetrics {
		self.cache.metrics()
	}

	/// Cached credential, if one is held.
	pub fn cached(&self) -> Option<Credential> {
		self.cache.snapshot()
	}

	/// Refresh token the next exchange will present.
	pub fn refresh_token(&self) -> TokenSecret {
		self.cache
			.snapshot()
			.and_then(|credential| credential.refresh_token().cloned())
			.unwrap_or_else(|| self.seed_refresh.clone())
	}

	async fn obtain(&self, rejected: Option<&TokenSecret>) -> Result<Credential> {
		self.cache
			.get_or_renew(self.clock.as_ref(), self.config.safety_margin, rejected, |current| {
				self.exchange(current)
			})
			.await
	}

	async fn exchange(&self, current: Option<Credential>) -> Result<Credential> {
		let refresh = current
			.as_ref()
			.and_then(|credential| credential.refresh_token().cloned())
			.unwrap_or_else(|| self.seed_refresh.clone());
		let carried_scope = current
			.as_ref()
			.map(|credential| credential.scope().clone())
			.unwrap_or_else(|| self.config.required_scope.clone());
		let grant = self.facade.refresh_token(self.classifier.as_ref(), &refresh).await?;

		#[cfg(feature = "tracing")]
		if grant.rotates_refresh_token() {
			tracing::debug!("token endpoint rotated the refresh token");
		}

		let credential =
			grant.into_credential(self.clock.now(), &self.client, Some(&refresh), &carried_scope)?;

		self.config.check_scope(credential.scope())?;

		Ok(credential)
	}
}
#[cfg(feature = "reqwest")]
impl AuthorizationCodeProvider<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a provider for the Spotify accounts service using the default reqwest transport.
	pub fn new(client: ClientIdentity, refresh_token: impl Into<String>) -> Result<Self> {
		let config = AuthConfig::spotify().map_err(ConfigError::from)?;

		Self::with_http_client(
			config,
			client,
			refresh_token,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}

	/// Rebuilds a provider from the record at `path` against the Spotify accounts service.
	///
	/// The restored access token is reused while valid; renewals are written back to `path`.
	pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
		let config = AuthConfig::spotify().map_err(ConfigError::from)?;

		Self::load_from_path(
			config,
			path,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> AuthProvider for AuthorizationCodeProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn valid_credential(&self) -> ProviderFuture<'_, Credential> {
		Box::pin(self.obtain(None))
	}

	fn force_refresh<'a>(&'a self, rejected: &'a TokenSecret) -> ProviderFuture<'a, Credential> {
		Box::pin(self.obtain(Some(rejected)))
	}
}
impl<C, M> Debug for AuthorizationCodeProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationCodeProvider")
			.field("client", &self.client)
			.field("token_endpoint", &self.config.token_endpoint.as_str())
			.field("cached", &self.cache.snapshot())
			.finish_non_exhaustive()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{auth::ScopeSet, config::ScopePolicy};

	fn config() -> AuthConfig {
		AuthConfig::spotify().expect("Default configuration should build.")
	}

	#[test]
	fn from_credential_requires_refresh_token() {
		let credential = Credential::builder("abc")
			.never_expires()
			.build()
			.expect("Credential fixture should build.");
		let err = ReqwestAuthorizationCode::from_credential(
			config(),
			credential,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect_err("Credentials without a refresh token cannot seed the provider.");

		assert!(matches!(err, Error::Config(ConfigError::MissingRefreshToken)));
	}

	#[test]
	fn seeded_provider_reports_refresh_token() {
		let client = ClientIdentity::new("id", "secret").expect("Client fixture should be valid.");
		let credential = Credential::builder("abc")
			.refresh_token("rt1")
			.client(client)
			.scope(ScopeSet::default())
			.expires_at(macros::datetime!(2020-01-01 00:00 UTC))
			.build()
			.expect("Credential fixture should build.");
		let provider = ReqwestAuthorizationCode::from_credential(
			config(),
			credential,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect("Refreshable credential should seed the provider.");

		assert_eq!(provider.refresh_token().expose(), "rt1");
		assert_eq!(provider.metrics().attempts(), 0);
		assert!(!format!("{provider:?}").contains("rt1"));
	}

	#[test]
	fn reauthenticate_policy_rejects_narrower_stored_scope() {
		let config = AuthConfig::builder()
			.required_scope(
				ScopeSet::new(["user-read-private", "streaming"])
					.expect("Required scope fixture should be valid."),
			)
			.scope_policy(ScopePolicy::Reauthenticate)
			.build()
			.expect("Config with a scope policy should build.");
		let credential = Credential::builder("abc")
			.refresh_token("rt1")
			.client(ClientIdentity::new("id", "secret").expect("Client fixture should be valid."))
			.scope(ScopeSet::new(["user-read-private"]).expect("Granted scope should be valid."))
			.never_expires()
			.build()
			.expect("Credential fixture should build.");
		let err = ReqwestAuthorizationCode::from_credential(
			config,
			credential,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect_err("A credential missing required scopes must be refused.");

		assert!(matches!(err, Error::InsufficientScope { ref reason } if reason.contains("streaming")));
	}
}
