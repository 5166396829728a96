//! Crate-level error types shared across providers, stores, and the request authorizer.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse reason codes callers use to decide between re-authentication and retrying later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorReason {
	/// The grant (refresh token, authorization code, or access token) was rejected or revoked.
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// The token endpoint could not be reached.
	Network,
	/// The token endpoint throttled the request.
	RateLimited,
}
impl AuthErrorReason {
	/// Returns the OAuth-style label for the reason.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthErrorReason::InvalidGrant => "invalid_grant",
			AuthErrorReason::InvalidClient => "invalid_client",
			AuthErrorReason::Network => "network",
			AuthErrorReason::RateLimited => "rate_limited",
		}
	}

	/// Returns `true` when the failure may succeed if retried later.
	pub const fn is_retriable(self) -> bool {
		matches!(self, AuthErrorReason::Network | AuthErrorReason::RateLimited)
	}
}
impl Display for AuthErrorReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Granted scopes do not cover the configured requirement.
	#[error("Credential lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Human-readable description of the missing scopes.
		reason: String,
	},
	/// Authorization server or API rejected the grant (revoked, expired, or rotated token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Maps the error onto the coarse reason taxonomy, when it belongs to one.
	pub fn reason(&self) -> Option<AuthErrorReason> {
		match self {
			Error::InvalidGrant { .. } => Some(AuthErrorReason::InvalidGrant),
			Error::InvalidClient { .. } => Some(AuthErrorReason::InvalidClient),
			Error::Transient(TransientError::RateLimited { .. }) =>
				Some(AuthErrorReason::RateLimited),
			Error::Transient(_) | Error::Transport(_) => Some(AuthErrorReason::Network),
			Error::Storage(_) | Error::Config(_) | Error::InsufficientScope { .. } => None,
		}
	}

	/// Returns `true` when retrying later may succeed.
	pub fn is_retriable(&self) -> bool {
		self.reason().is_some_and(AuthErrorReason::is_retriable)
	}

	/// Returns `true` when only a fresh user consent (or new client credentials) can recover.
	pub fn requires_reauthentication(&self) -> bool {
		matches!(
			self,
			Error::InvalidGrant { .. } | Error::InvalidClient { .. } | Error::InsufficientScope { .. }
		)
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for Error {
	fn from(e: ReqwestError) -> Self {
		Self::Transport(e.into())
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Configured endpoint URL is rejected by the OAuth client.
	#[error("Configured endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Endpoint or margin configuration failed validation.
	#[error(transparent)]
	AuthConfig(#[from] crate::config::AuthConfigError),
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Client identity is missing or malformed.
	#[error("Client identity is invalid: {reason}.")]
	InvalidClientIdentity {
		/// Validation failure summary.
		reason: String,
	},
	/// A refresh-capable provider was built from a credential without a refresh token.
	#[error("Credential is missing a refresh token.")]
	MissingRefreshToken,
	/// Persisted or issued scopes cannot be normalized.
	#[error("Scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint answered with HTTP 429.
	#[error("Token endpoint rate limited the request.")]
	RateLimited {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or crate-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl TransientError {
	/// Retry-After hint carried by the failure, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			TransientError::RateLimited { retry_after, .. }
			| TransientError::TokenEndpoint { retry_after, .. } => *retry_after,
			TransientError::TokenResponseParse { .. } => None,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
