//! Credential providers for the three Spotify grant variants.
//!
//! Every provider implements [`AuthProvider`]: [`AuthProvider::valid_credential`] returns a
//! credential that has not expired at the moment of return, renewing it first when the cached
//! one is missing or inside the configured safety margin. [`AuthProvider::force_refresh`]
//! renews regardless of expiry and is driven by the request authorizer after a `401`.
//!
//! - [`ClientCredentialsProvider`]: app-only tokens, re-running the client-credentials grant.
//! - [`AuthorizationCodeProvider`]: user tokens renewed through the refresh-token grant, with
//!   rotation and optional persistence.
//! - [`PlainAccessTokenProvider`]: a caller-supplied token with no lifecycle.

pub mod authorization_code;
pub mod client_credentials;
pub mod plain;

mod cache;
mod metrics;

pub use authorization_code::*;
pub use client_credentials::*;
pub use metrics::RefreshMetrics;
pub use plain::*;

pub(crate) use cache::CredentialCache;

// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret},
};

/// Boxed future returned by [`AuthProvider`] operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Source of currently valid credentials.
pub trait AuthProvider
where
	Self: Send + Sync,
{
	/// Returns a credential whose expiry lies after the instant of return.
	fn valid_credential(&self) -> ProviderFuture<'_, Credential>;

	/// Renews the credential after `rejected` was refused by the API.
	///
	/// If the cached credential no longer carries `rejected` (another caller already renewed
	/// it), the cached credential is returned without a new exchange.
	fn force_refresh<'a>(&'a self, rejected: &'a TokenSecret) -> ProviderFuture<'a, Credential>;
}
impl<P> AuthProvider for Arc<P>
where
	P: ?Sized + AuthProvider,
{
	fn valid_credential(&self) -> ProviderFuture<'_, Credential> {
		(**self).valid_credential()
	}

	fn force_refresh<'a>(&'a self, rejected: &'a TokenSecret) -> ProviderFuture<'a, Credential> {
		(**self).force_refresh(rejected)
	}
}
