//! Token endpoint configuration shared by every provider and the consent flow.
//!
//! [`AuthConfig`] bundles the accounts-service endpoints, the client authentication mode, the
//! expiry safety margin, and the scope policy. Construct it through [`AuthConfig::builder`] so
//! endpoint validation always runs.

/// Builder API for assembling validated [`AuthConfig`] values.
pub mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, auth::ScopeSet};

/// Spotify accounts-service authorization endpoint.
pub const SPOTIFY_AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
/// Spotify accounts-service token endpoint.
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
/// Window before expiry inside which a cached credential is renewed.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);

/// OAuth 2.0 grant types exchanged against the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization Code grant, used once after user consent.
	AuthorizationCode,
	/// Refresh Token grant for long-lived user sessions.
	RefreshToken,
	/// Client Credentials grant for app-only tokens.
	ClientCredentials,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
			GrantType::ClientCredentials => "client_credentials",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// How the client id and secret reach the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Reaction to a credential whose granted scopes do not cover [`AuthConfig::required_scope`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopePolicy {
	/// Use the credential anyway; granted scopes stay informational.
	#[default]
	Ignore,
	/// Reject the credential with [`Error::InsufficientScope`] so the caller re-runs consent.
	Reauthenticate,
}

/// Validated token-lifecycle configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthConfig {
	/// Authorization endpoint used to start user consent.
	pub authorization_endpoint: Url,
	/// Token endpoint used for every exchange.
	pub token_endpoint: Url,
	/// Client authentication mode for token requests.
	pub client_auth_method: ClientAuthMethod,
	/// Credentials expiring within this window are treated as expired.
	pub safety_margin: Duration,
	/// Scopes requested during consent and optionally enforced on credentials.
	pub required_scope: ScopeSet,
	/// Reaction to credentials lacking [`AuthConfig::required_scope`].
	pub scope_policy: ScopePolicy,
}
impl AuthConfig {
	/// Creates a builder seeded with the Spotify accounts-service defaults.
	pub fn builder() -> AuthConfigBuilder {
		AuthConfigBuilder::new()
	}

	/// Spotify accounts-service configuration with default margin and scope policy.
	pub fn spotify() -> Result<Self, AuthConfigError> {
		Self::builder().build()
	}

	/// Returns a copy with a different safety margin; negative values clamp to zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = clamp_margin(margin);

		self
	}

	/// Applies the scope policy to `granted`.
	pub fn check_scope(&self, granted: &ScopeSet) -> Result<()> {
		if self.scope_policy == ScopePolicy::Ignore || granted.covers(&self.required_scope) {
			return Ok(());
		}

		let missing = granted.missing(&self.required_scope).join(" ");

		Err(Error::InsufficientScope { reason: format!("missing `{missing}`") })
	}
}

fn clamp_margin(margin: Duration) -> Duration {
	if margin.is_negative() { Duration::ZERO } else { margin }
}
