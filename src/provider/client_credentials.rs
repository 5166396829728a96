//! App-only provider backed by the client-credentials grant.

// self
use crate::{
	_prelude::*,
	auth::{ClientIdentity, Credential, ScopeSet, TokenSecret},
	classify::{DefaultClassifier, TokenErrorClassifier},
	clock::{Clock, SystemClock},
	config::AuthConfig,
	error::ConfigError,
	http::TokenHttpClient,
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	obs::FlowKind,
	provider::{AuthProvider, CredentialCache, ProviderFuture, RefreshMetrics},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Client-credentials provider specialized for the crate's reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestClientCredentials =
	ClientCredentialsProvider<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Caches an app-only access token and re-runs the client-credentials grant when it nears
/// expiry.
///
/// No refresh token exists for this grant; renewal is a fresh exchange. Concurrent callers
/// share one exchange.
pub struct ClientCredentialsProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: AuthConfig,
	client: ClientIdentity,
	facade: BasicFacade<C, M>,
	classifier: Arc<dyn TokenErrorClassifier>,
	clock: Arc<dyn Clock>,
	cache: CredentialCache,
}
impl<C, M> ClientCredentialsProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a provider on a caller-supplied transport and error mapper.
	pub fn with_http_client(
		config: AuthConfig,
		client: ClientIdentity,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let facade = BasicFacade::from_config(&config, &client, http_client, mapper)?;

		Ok(Self {
			config,
			client,
			facade,
			classifier: Arc::new(DefaultClassifier),
			clock: Arc::new(SystemClock),
			cache: CredentialCache::new(FlowKind::ClientCredentials, None),
		})
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

	/// Cached credential, if one was obtained.
	pub fn cached(&self) -> Option<Credential> {
		self.cache.snapshot()
	}

	async fn obtain(&self, rejected: Option<&TokenSecret>) -> Result<Credential> {
		self.cache
			.get_or_renew(self.clock.as_ref(), self.config.safety_margin, rejected, |_| {
				self.exchange()
			})
			.await
	}

	async fn exchange(&self) -> Result<Credential> {
		let grant = self.facade.exchange_client_credentials(self.classifier.as_ref()).await?;

		grant.into_credential(self.clock.now(), &self.client, None, &ScopeSet::default())
	}
}
#[cfg(feature = "reqwest")]
impl ClientCredentialsProvider<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a provider for the Spotify accounts service using the default reqwest transport.
	pub fn new(client: ClientIdentity) -> Result<Self> {
		let config = AuthConfig::spotify().map_err(ConfigError::from)?;

		Self::with_http_client(
			config,
			client,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> AuthProvider for ClientCredentialsProvider<C, M>
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
impl<C, M> Debug for ClientCredentialsProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentialsProvider")
			.field("client", &self.client)
			.field("token_endpoint", &self.config.token_endpoint.as_str())
			.field("cached", &self.cache.snapshot())
			.finish()
	}
}
