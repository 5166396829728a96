//! User consent handshake that produces the first refresh token.
//!
//! A [`ConsentSession`] builds the Spotify authorize URL (with a random `state` and a PKCE
//! S256 challenge), validates the redirect the browser lands on, and exchanges the returned
//! `code` for a user credential. Listening for the redirect and opening a browser are left to
//! the caller.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ClientIdentity, ScopeSet},
	classify::DefaultClassifier,
	clock::{Clock, SystemClock},
	config::AuthConfig,
	error::ConfigError,
	http::TokenHttpClient,
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::AuthorizationCodeProvider,
	store::CredentialStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// PKCE challenge method sent with the authorize request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 (RFC 7636 `S256`).
	S256,
}
impl PkceCodeChallengeMethod {
	/// RFC 7636 identifier.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Options applied when building the authorize URL.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsentOptions {
	/// Forces Spotify to show the consent dialog even when the user already approved the app.
	pub show_dialog: bool,
}

/// One in-flight consent handshake.
#[derive(Clone)]
pub struct ConsentSession {
	client: ClientIdentity,
	scope: ScopeSet,
	redirect_uri: Url,
	authorize_url: Url,
	state: String,
	pkce: PkcePair,
	clock: Arc<dyn Clock>,
}
impl ConsentSession {
	/// Starts a handshake requesting `config.required_scope`.
	pub fn start(
		config: &AuthConfig,
		client: ClientIdentity,
		redirect_uri: Url,
		options: ConsentOptions,
	) -> Self {
		let state = random_string(STATE_LEN);
		let pkce = PkcePair::generate();
		let scope = config.required_scope.clone();
		let authorize_url = build_authorize_url(
			&config.authorization_endpoint,
			&client,
			&redirect_uri,
			&scope,
			&state,
			&pkce,
			options,
		);

		Self {
			client,
			scope,
			redirect_uri,
			authorize_url,
			state,
			pkce,
			clock: Arc::new(SystemClock),
		}
	}

	/// Replaces the time source used to anchor the issued credential's expiry.
	///
	/// The provider returned by the exchange inherits this clock.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// URL the user must open to grant access.
	pub fn authorize_url(&self) -> &Url {
		&self.authorize_url
	}

	/// Redirect URI registered for the application.
	pub fn redirect_uri(&self) -> &Url {
		&self.redirect_uri
	}

	/// Opaque value that must come back unchanged on the redirect.
	pub fn state(&self) -> &str {
		&self.state
	}

	/// Scopes requested from the user.
	pub fn scope(&self) -> &ScopeSet {
		&self.scope
	}

	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	/// PKCE challenge method; always `S256`.
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		PkceCodeChallengeMethod::S256
	}

	/// Extracts the authorization code from the redirect URL.
	///
	/// Fails with [`Error::InvalidGrant`] when the user denied access (`error=access_denied`),
	/// the `state` does not match, or no `code` is present.
	pub fn parse_redirect(&self, redirect: &Url) -> Result<String> {
		let mut code = None;
		let mut state = None;
		let mut error = None;

		for (key, value) in redirect.query_pairs() {
			match key.as_ref() {
				"code" => code = Some(value.into_owned()),
				"state" => state = Some(value.into_owned()),
				"error" => error = Some(value.into_owned()),
				_ => {},
			}
		}

		if let Some(error) = error {
			return Err(Error::InvalidGrant { reason: format!("consent failed with `{error}`") });
		}
		if state.as_deref() != Some(self.state.as_str()) {
			return Err(Error::InvalidGrant { reason: "authorization state mismatch".into() });
		}

		code.filter(|code| !code.is_empty()).ok_or_else(|| Error::InvalidGrant {
			reason: "redirect carries no authorization code".into(),
		})
	}

	/// Exchanges the code carried by `redirect` and seeds a provider with the issued
	/// credential.
	///
	/// With a `store`, the credential is saved before the provider is returned and every later
	/// renewal is persisted there as well.
	pub async fn exchange_with_http_client<C, M>(
		self,
		config: AuthConfig,
		redirect: &Url,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
		store: Option<Arc<dyn CredentialStore>>,
	) -> Result<AuthorizationCodeProvider<C, M>>
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let span = FlowSpan::new(FlowKind::AuthorizationCode, "exchange");

		obs::record_flow_outcome(FlowKind::AuthorizationCode, FlowOutcome::Attempt);

		let result = span
			.instrument(self.exchange_inner(config, redirect, http_client, mapper, store))
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::AuthorizationCode, FlowOutcome::Success),
			Err(err) => {
				obs::record_flow_outcome(FlowKind::AuthorizationCode, FlowOutcome::Failure);
				obs::trace_flow_failure(FlowKind::AuthorizationCode, err);
			},
		}

		result
	}

	async fn exchange_inner<C, M>(
		self,
		config: AuthConfig,
		redirect: &Url,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
		store: Option<Arc<dyn CredentialStore>>,
	) -> Result<AuthorizationCodeProvider<C, M>>
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let code = self.parse_redirect(redirect)?;
		let http_client = http_client.into();
		let mapper = mapper.into();
		let facade =
			BasicFacade::<C, M>::from_config(&config, &self.client, http_client.clone(), mapper.clone())?;
		let grant = facade
			.exchange_authorization_code(
				&DefaultClassifier,
				&code,
				Some(&self.pkce.verifier),
				&self.redirect_uri,
			)
			.await?;

		if !grant.rotates_refresh_token() {
			return Err(ConfigError::MissingRefreshToken.into());
		}

		let credential =
			grant.into_credential(self.clock.now(), &self.client, None, &self.scope)?;
		let provider = AuthorizationCodeProvider::from_credential(
			config,
			credential.clone(),
			http_client,
			mapper,
		)?
		.with_clock(self.clock);

		match store {
			Some(store) => {
				store.save(&credential).await?;

				Ok(provider.with_store(store))
			},
			None => Ok(provider),
		}
	}

	/// Exchanges the code against the Spotify accounts service using the default reqwest
	/// transport.
	#[cfg(feature = "reqwest")]
	pub async fn exchange(
		self,
		config: AuthConfig,
		redirect: &Url,
		store: Option<Arc<dyn CredentialStore>>,
	) -> Result<AuthorizationCodeProvider<ReqwestHttpClient, ReqwestTransportErrorMapper>> {
		self.exchange_with_http_client(
			config,
			redirect,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
			store,
		)
		.await
	}
}
impl Debug for ConsentSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConsentSession")
			.field("client_id", &self.client.client_id)
			.field("scope", &self.scope)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("state", &self.state)
			.field("code_challenge", &self.pkce.challenge)
			.finish()
	}
}

#[derive(Clone)]
struct PkcePair {
	verifier: String,
	challenge: String,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge }
	}
}

fn build_authorize_url(
	endpoint: &Url,
	client: &ClientIdentity,
	redirect_uri: &Url,
	scope: &ScopeSet,
	state: &str,
	pkce: &PkcePair,
	options: ConsentOptions,
) -> Url {
	let mut url = endpoint.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("client_id", &client.client_id);
	pairs.append_pair("response_type", "code");
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if !scope.is_empty() {
		pairs.append_pair("scope", &scope.normalized());
	}

	pairs.append_pair("state", state);
	pairs.append_pair("code_challenge", &pkce.challenge);
	pairs.append_pair("code_challenge_method", PkceCodeChallengeMethod::S256.as_str());

	if options.show_dialog {
		pairs.append_pair("show_dialog", "true");
	}

	drop(pairs);

	url
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let digest = Sha256::digest(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}
