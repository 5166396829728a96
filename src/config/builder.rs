// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	config::{
		AuthConfig, ClientAuthMethod, DEFAULT_SAFETY_MARGIN, SPOTIFY_AUTHORIZE_URL,
		SPOTIFY_TOKEN_URL, ScopePolicy,
	},
};

/// Errors raised while constructing or validating an [`AuthConfig`].
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum AuthConfigError {
	/// A default endpoint constant failed to parse.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	InvalidEndpoint {
		/// Which endpoint failed to parse.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Builder for [`AuthConfig`] values.
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
	authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	client_auth_method: ClientAuthMethod,
	safety_margin: Option<Duration>,
	required_scope: ScopeSet,
	scope_policy: ScopePolicy,
}
impl AuthConfigBuilder {
	/// Creates a builder seeded with the Spotify accounts-service defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Overrides the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Overrides the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Overrides the client authentication method.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Overrides the expiry safety margin (default 60 seconds).
	pub fn safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = Some(margin);

		self
	}

	/// Sets the scopes requested during consent and checked by [`ScopePolicy::Reauthenticate`].
	pub fn required_scope(mut self, scope: ScopeSet) -> Self {
		self.required_scope = scope;

		self
	}

	/// Sets the reaction to credentials lacking the required scopes.
	pub fn scope_policy(mut self, policy: ScopePolicy) -> Self {
		self.scope_policy = policy;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<AuthConfig, AuthConfigError> {
		let authorization_endpoint = match self.authorization_endpoint {
			Some(url) => url,
			None => parse_default("authorization", SPOTIFY_AUTHORIZE_URL)?,
		};
		let token_endpoint = match self.token_endpoint {
			Some(url) => url,
			None => parse_default("token", SPOTIFY_TOKEN_URL)?,
		};

		validate_endpoint("authorization", &authorization_endpoint)?;
		validate_endpoint("token", &token_endpoint)?;

		let config = AuthConfig {
			authorization_endpoint,
			token_endpoint,
			client_auth_method: self.client_auth_method,
			safety_margin: DEFAULT_SAFETY_MARGIN,
			required_scope: self.required_scope,
			scope_policy: self.scope_policy,
		};

		Ok(match self.safety_margin {
			Some(margin) => config.with_safety_margin(margin),
			None => config,
		})
	}
}

fn parse_default(endpoint: &'static str, raw: &str) -> Result<Url, AuthConfigError> {
	Url::parse(raw).map_err(|source| AuthConfigError::InvalidEndpoint { endpoint, source })
}

fn validate_endpoint(endpoint: &'static str, url: &Url) -> Result<(), AuthConfigError> {
	if url.scheme() == "https" || is_loopback(url) {
		Ok(())
	} else {
		Err(AuthConfigError::InsecureEndpoint { endpoint, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}
