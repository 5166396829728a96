//! Spotify Web API token lifecycle for Rust.
//!
//! Providers hand out access tokens that are valid at the moment of return: app-only tokens
//! through the client-credentials grant, user tokens renewed through the refresh-token grant,
//! or a fixed caller-supplied token. Renewals are single-flight, user credentials can be
//! persisted to an atomically replaced file, and [`authorizer::RequestAuthorizer`] attaches
//! bearer tokens to outbound requests with one forced refresh on `401`.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authorizer;
pub mod classify;
pub mod clock;
pub mod config;
pub mod consent;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::{
		_prelude::*,
		clock::{Clock, ManualClock},
		provider::{ReqwestAuthorizationCode, ReqwestClientCredentials},
	};

	// self
	use crate::{
		auth::{ClientIdentity, ScopeSet},
		config::{AuthConfig, ClientAuthMethod},
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		provider::{AuthorizationCodeProvider, ClientCredentialsProvider},
	};

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds an [`AuthConfig`] whose endpoints point at a mock server base URL.
	///
	/// The safety margin is zeroed so tests reason about raw expiry instants; override it with
	/// [`AuthConfig::with_safety_margin`] where the margin itself is under test.
	pub fn test_config(base_url: &str) -> AuthConfig {
		let authorize = Url::parse(&format!("{base_url}/authorize"))
			.expect("Mock authorize endpoint should parse successfully.");
		let token = Url::parse(&format!("{base_url}/api/token"))
			.expect("Mock token endpoint should parse successfully.");

		AuthConfig::builder()
			.authorization_endpoint(authorize)
			.token_endpoint(token)
			.client_auth_method(ClientAuthMethod::ClientSecretPost)
			.safety_margin(Duration::ZERO)
			.build()
			.expect("Test auth config should build successfully.")
	}

	/// Client identity fixture shared by integration tests.
	pub fn test_client() -> ClientIdentity {
		ClientIdentity::new("client-it", "secret-it").expect("Client identity fixture is valid.")
	}

	/// Empty scope fixture.
	pub fn no_scope() -> ScopeSet {
		ScopeSet::default()
	}

	/// Builds a client-credentials provider wired to the insecure test transport and a manual
	/// clock.
	pub fn build_client_credentials(
		config: AuthConfig,
		clock: Arc<ManualClock>,
	) -> ReqwestClientCredentials {
		ClientCredentialsProvider::with_http_client(
			config,
			test_client(),
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect("Client credentials provider should build successfully.")
		.with_clock(clock)
	}

	/// Builds an authorization-code provider seeded with `refresh_token`, wired to the insecure
	/// test transport and a manual clock.
	pub fn build_authorization_code(
		config: AuthConfig,
		refresh_token: &str,
		clock: Arc<ManualClock>,
	) -> ReqwestAuthorizationCode {
		AuthorizationCodeProvider::with_http_client(
			config,
			test_client(),
			refresh_token,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect("Authorization code provider should build successfully.")
		.with_clock(clock)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		path::{Path, PathBuf},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
