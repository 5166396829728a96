//! `oauth2` facade: builds token requests for the three grants and maps responses and
//! failures into crate types.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId as OAuthClientId, ClientSecret,
	EndpointNotSet, EndpointSet, HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken,
	RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{ClientIdentity, Credential, ScopeSet, TokenSecret},
	classify::{TokenErrorClassifier, TokenErrorContext, TokenErrorKind},
	config::{AuthConfig, ClientAuthMethod, GrantType},
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(grant, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unrecognized transport failure"),
		}
	}
}

/// Successful token endpoint response, before it is anchored to an issuance instant.
pub(crate) struct TokenGrant {
	access_token: String,
	expires_in: Duration,
	refresh_token: Option<String>,
	scope: Option<ScopeSet>,
}
impl TokenGrant {
	/// Whether the endpoint issued a new refresh token.
	pub(crate) fn rotates_refresh_token(&self) -> bool {
		self.refresh_token.is_some()
	}

	/// Builds the credential, anchoring `expires_in` at `issued_at`.
	///
	/// A missing `refresh_token` or `scope` in the response keeps the carried values.
	pub(crate) fn into_credential(
		self,
		issued_at: OffsetDateTime,
		client: &ClientIdentity,
		carried_refresh: Option<&TokenSecret>,
		carried_scope: &ScopeSet,
	) -> Result<Credential> {
		let mut builder = Credential::builder(self.access_token)
			.client(client.clone())
			.scope(self.scope.unwrap_or_else(|| carried_scope.clone()))
			.issued_at(issued_at)
			.expires_in(self.expires_in);

		match (self.refresh_token, carried_refresh) {
			(Some(rotated), _) => builder = builder.refresh_token(rotated),
			(None, Some(carried)) => builder = builder.refresh_token(carried.expose()),
			(None, None) => {},
		}

		builder.build().map_err(|e| ConfigError::from(e).into())
	}
}

pub(crate) trait OAuth2Facade: Send + Sync {
	fn exchange_client_credentials<'a>(
		&'a self,
		classifier: &'a dyn TokenErrorClassifier,
	) -> FacadeFuture<'a, TokenGrant>;

	fn refresh_token<'a>(
		&'a self,
		classifier: &'a dyn TokenErrorClassifier,
		refresh_token: &'a TokenSecret,
	) -> FacadeFuture<'a, TokenGrant>;

	fn exchange_authorization_code<'a>(
		&'a self,
		classifier: &'a dyn TokenErrorClassifier,
		code: &'a str,
		pkce_verifier: Option<&'a str>,
		redirect_uri: &'a Url,
	) -> FacadeFuture<'a, TokenGrant>;
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_config(
		config: &AuthConfig,
		client: &ClientIdentity,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(config.authorization_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let token_url = TokenUrl::new(config.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let mut oauth_client = BasicClient::new(OAuthClientId::new(client.client_id.to_string()))
			.set_client_secret(ClientSecret::new(client.client_secret.expose().to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		if config.client_auth_method == ClientAuthMethod::ClientSecretPost {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self {
			oauth_client,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	fn map_error(
		&self,
		classifier: &dyn TokenErrorClassifier,
		grant: GrantType,
		meta: &ResponseMetadataSlot,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		map_request_error(classifier, grant, meta.take(), err, self.error_mapper.as_ref())
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_client_credentials<'a>(
		&'a self,
		classifier: &'a dyn TokenErrorClassifier,
	) -> FacadeFuture<'a, TokenGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let response = self
				.oauth_client
				.exchange_client_credentials()
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					self.map_error(classifier, GrantType::ClientCredentials, &meta, err)
				})?;

			map_token_response(response)
		})
	}

	fn refresh_token<'a>(
		&'a self,
		classifier: &'a dyn TokenErrorClassifier,
		refresh_token: &'a TokenSecret,
	) -> FacadeFuture<'a, TokenGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_error(classifier, GrantType::RefreshToken, &meta, err))?;

			map_token_response(response)
		})
	}

	fn exchange_authorization_code<'a>(
		&'a self,
		classifier: &'a dyn TokenErrorClassifier,
		code: &'a str,
		pkce_verifier: Option<&'a str>,
		redirect_uri: &'a Url,
	) -> FacadeFuture<'a, TokenGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let redirect_url = RedirectUrl::new(redirect_uri.to_string())
				.map_err(|source| ConfigError::InvalidRedirect { source })?;
			let mut request = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_redirect_uri(Cow::Owned(redirect_url));

			if let Some(verifier) = pkce_verifier {
				request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()));
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				self.map_error(classifier, GrantType::AuthorizationCode, &meta, err)
			})?;

			map_token_response(response)
		})
	}
}

fn map_token_response(response: BasicTokenResponse) -> Result<TokenGrant> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	// Spotify sends `"scope": ""` for app-only tokens.
	let scope = response
		.scopes()
		.map(|scopes| {
			ScopeSet::new(
				scopes.iter().map(|scope| scope.as_str()).filter(|scope| !scope.is_empty()),
			)
		})
		.transpose()
		.map_err(ConfigError::from)?;

	Ok(TokenGrant {
		access_token: response.access_token().secret().to_owned(),
		expires_in: Duration::seconds(expires_in),
		refresh_token: response.refresh_token().map(|token| token.secret().to_owned()),
		scope,
	})
}

fn map_request_error<E, M>(
	classifier: &dyn TokenErrorClassifier,
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	if !matches!(err, RequestTokenError::Request(_)) && meta_status(meta_ref) == Some(429) {
		return rate_limited(meta_ref);
	}

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(classifier, grant, response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
				.into(),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(
	classifier: &dyn TokenErrorClassifier,
	grant: GrantType,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let code: &str = response.error().as_ref();
	let mut ctx = TokenErrorContext::new(grant).with_oauth_error(code);

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = match response.error_description() {
		Some(description) => format!("{code}: {description}"),
		None => code.to_owned(),
	};

	match classifier.classify(&ctx) {
		TokenErrorKind::InvalidGrant => Error::InvalidGrant { reason: message },
		TokenErrorKind::InvalidClient => Error::InvalidClient { reason: message },
		TokenErrorKind::InsufficientScope => Error::InsufficientScope { reason: message },
		TokenErrorKind::RateLimited => rate_limited(meta),
		TokenErrorKind::Transient => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(grant: GrantType, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: format!("{grant} request timed out"),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn rate_limited(meta: Option<&ResponseMetadata>) -> Error {
	TransientError::RateLimited { status: meta_status(meta), retry_after: meta_retry_after(meta) }
		.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
