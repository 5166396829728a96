//! Provider for a caller-supplied access token.

// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret},
	error::ConfigError,
	provider::{AuthProvider, ProviderFuture},
};

/// Hands out one fixed access token; meant for short-lived scripts and tests.
///
/// The credential expires at [`crate::auth::NEVER_EXPIRES`] and is never renewed. A forced
/// refresh (the API rejected the token) fails with [`Error::InvalidGrant`].
#[derive(Clone, Debug)]
pub struct PlainAccessTokenProvider {
	credential: Credential,
}
impl PlainAccessTokenProvider {
	/// Wraps `access_token`.
	pub fn new(access_token: impl Into<String>) -> Result<Self> {
		let credential =
			Credential::builder(access_token).never_expires().build().map_err(ConfigError::from)?;

		Ok(Self { credential })
	}
}
impl AuthProvider for PlainAccessTokenProvider {
	fn valid_credential(&self) -> ProviderFuture<'_, Credential> {
		let credential = self.credential.clone();

		Box::pin(async move { Ok(credential) })
	}

	fn force_refresh<'a>(&'a self, _rejected: &'a TokenSecret) -> ProviderFuture<'a, Credential> {
		Box::pin(async move {
			Err(Error::InvalidGrant {
				reason: "static access token was rejected and cannot be refreshed".into(),
			})
		})
	}
}
