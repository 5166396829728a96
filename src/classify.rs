//! Token endpoint error classification.
//!
//! The OAuth facade collects what it knows about a failed exchange into a
//! [`TokenErrorContext`] (status code, OAuth `error`/`error_description`, whether the request
//! ever reached the server) and asks a [`TokenErrorClassifier`] which [`TokenErrorKind`] it
//! represents. The kind decides the crate error variant and therefore whether callers retry or
//! re-authenticate.

// self
use crate::{_prelude::*, config::GrantType};

/// Maps token endpoint failures onto the crate taxonomy.
pub trait TokenErrorClassifier: Send + Sync {
	/// Classifies a failed token request.
	fn classify(&self, ctx: &TokenErrorContext) -> TokenErrorKind;
}

/// Canonical categories for failed token requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenErrorKind {
	/// The grant (refresh token or authorization code) was rejected or revoked.
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes were refused.
	InsufficientScope,
	/// The endpoint throttled the request.
	RateLimited,
	/// Temporary failure; retry later.
	Transient,
}

/// Transport-agnostic facts about a failed token request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenErrorContext {
	/// Grant type of the failing request.
	pub grant_type: GrantType,
	/// HTTP status code, when a response arrived.
	pub http_status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Whether the failure happened before any response arrived.
	pub network_error: bool,
}
impl TokenErrorContext {
	/// Creates an empty context for the grant type.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			network_error: false,
		}
	}

	/// Context for failures that never produced a response.
	pub fn network_failure(grant_type: GrantType) -> Self {
		Self { network_error: true, ..Self::new(grant_type) }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description`.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}
}

/// Classifier tuned to the Spotify accounts service.
///
/// Throttling (HTTP 429) wins over everything else, then structured OAuth fields, then the
/// description text Spotify attaches to plain `400` responses (`Invalid refresh token`,
/// `Refresh token revoked`, `Invalid client secret`), and finally the status code alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultClassifier;
impl TokenErrorClassifier for DefaultClassifier {
	fn classify(&self, ctx: &TokenErrorContext) -> TokenErrorKind {
		if ctx.network_error {
			return TokenErrorKind::Transient;
		}
		if ctx.http_status == Some(429) {
			return TokenErrorKind::RateLimited;
		}

		ctx.oauth_error
			.as_deref()
			.and_then(match_error_code)
			.or_else(|| ctx.error_description.as_deref().and_then(match_description))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

fn match_error_code(code: &str) -> Option<TokenErrorKind> {
	let code = code.to_ascii_lowercase();

	match code.as_str() {
		"invalid_grant" | "access_denied" => Some(TokenErrorKind::InvalidGrant),
		"invalid_client" | "unauthorized_client" => Some(TokenErrorKind::InvalidClient),
		"invalid_scope" | "insufficient_scope" => Some(TokenErrorKind::InsufficientScope),
		"temporarily_unavailable" | "server_error" => Some(TokenErrorKind::Transient),
		"slow_down" => Some(TokenErrorKind::RateLimited),
		_ => None,
	}
}

fn match_description(description: &str) -> Option<TokenErrorKind> {
	let lowered = description.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("refresh token") || text.contains("authorization code") =>
			Some(TokenErrorKind::InvalidGrant),
		text if text.contains("client") => Some(TokenErrorKind::InvalidClient),
		text if text.contains("scope") => Some(TokenErrorKind::InsufficientScope),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> TokenErrorKind {
	match status {
		Some(400) => TokenErrorKind::InvalidGrant,
		Some(401) => TokenErrorKind::InvalidClient,
		Some(403) => TokenErrorKind::InsufficientScope,
		_ => TokenErrorKind::Transient,
	}
}
