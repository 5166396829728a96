//! Credential model, lifecycle helpers, and builder.

// crates.io
use time::macros;
// self
use crate::{
	_prelude::*,
	auth::{ClientIdentity, ScopeSet, TokenSecret},
};

/// Expiry assigned to credentials that carry no server-reported lifetime.
pub const NEVER_EXPIRES: OffsetDateTime = macros::datetime!(9999-12-31 23:59:59 UTC);

/// Lifecycle status of a credential relative to an instant and a safety margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Valid beyond the safety margin.
	Active,
	/// Still valid, but inside the safety margin; callers should refresh before use.
	Expiring,
	/// At or past its expiry instant.
	Expired,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when the access token value is empty.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the expiry instant cannot be represented.
	#[error("Expiry instant is out of range.")]
	ExpiryOutOfRange,
	/// Issued when a refresh token is supplied without the client identity needed to use it.
	#[error("A refresh token requires the client id and secret that can exchange it.")]
	RefreshWithoutClient,
}

/// Access token plus everything required to judge and renew it.
///
/// Expiry is an absolute instant computed once when the token is received and stored at
/// whole-second precision.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	access_token: TokenSecret,
	expires_at: OffsetDateTime,
	refresh_token: Option<TokenSecret>,
	client: Option<ClientIdentity>,
	scope: ScopeSet,
}
impl Credential {
	/// Returns a builder seeded with the access token value.
	pub fn builder(access_token: impl Into<String>) -> CredentialBuilder {
		CredentialBuilder::new(access_token.into())
	}

	/// Bearer-usable access token.
	pub fn access_token(&self) -> &TokenSecret {
		&self.access_token
	}

	/// Absolute expiry instant.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Refresh token, present for authorization-code credentials.
	pub fn refresh_token(&self) -> Option<&TokenSecret> {
		self.refresh_token.as_ref()
	}

	/// Client identity able to exchange the refresh token.
	pub fn client(&self) -> Option<&ClientIdentity> {
		self.client.as_ref()
	}

	/// Scopes granted with this credential.
	pub fn scope(&self) -> &ScopeSet {
		&self.scope
	}

	/// Returns `true` when the credential carries a usable refresh grant.
	pub fn is_refreshable(&self) -> bool {
		self.refresh_token.is_some() && self.client.is_some()
	}

	/// Computes the lifecycle status at `instant` using `margin` as the early-refresh window.
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> CredentialStatus {
		if instant >= self.expires_at {
			return CredentialStatus::Expired;
		}
		if self.expires_at - instant <= margin {
			return CredentialStatus::Expiring;
		}

		CredentialStatus::Active
	}

	/// Returns `true` if the credential has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant, Duration::ZERO), CredentialStatus::Expired)
	}

	/// Returns `true` when the credential must be renewed before being handed out.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		!matches!(self.status_at(instant, margin), CredentialStatus::Active)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("client", &self.client)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	access_token: TokenSecret,
	refresh_token: Option<TokenSecret>,
	client: Option<ClientIdentity>,
	scope: ScopeSet,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialBuilder {
	fn new(access_token: String) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: None,
			client: None,
			scope: ScopeSet::default(),
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Sets the instant `expires_in` is measured from (defaults to the current clock).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Marks the credential as never expiring.
	pub fn never_expires(self) -> Self {
		self.expires_at(NEVER_EXPIRES)
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Attaches the client identity able to exchange the refresh token.
	pub fn client(mut self, client: ClientIdentity) -> Self {
		self.client = Some(client);

		self
	}

	/// Sets the granted scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		if self.access_token.is_empty() {
			return Err(CredentialBuilderError::MissingAccessToken);
		}
		if self.refresh_token.is_some() && self.client.is_none() {
			return Err(CredentialBuilderError::RefreshWithoutClient);
		}

		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => self
				.issued_at
				.unwrap_or_else(OffsetDateTime::now_utc)
				.checked_add(delta)
				.ok_or(CredentialBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};
		let expires_at = OffsetDateTime::from_unix_timestamp(expires_at.unix_timestamp())
			.map_err(|_| CredentialBuilderError::ExpiryOutOfRange)?;

		Ok(Credential {
			access_token: self.access_token,
			expires_at,
			refresh_token: self.refresh_token,
			client: self.client,
			scope: self.scope,
		})
	}
}
