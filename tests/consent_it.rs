#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
use time::macros;
// self
use spotify_auth::{
	_preludet::*,
	auth::{ScopeSet, TokenSecret},
	config::AuthConfig,
	consent::{ConsentOptions, ConsentSession},
	error::AuthErrorReason,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	provider::{AuthProvider, ReqwestAuthorizationCode},
	store::{CredentialStore, MemoryStore},
};

const REDIRECT: &str = "http://127.0.0.1:8888/callback";
const T0: OffsetDateTime = macros::datetime!(2025-03-01 12:00 UTC);

fn consent_config(server: &MockServer) -> AuthConfig {
	let mut config = test_config(&server.base_url());

	config.required_scope =
		ScopeSet::new(["user-read-private", "user-modify-playback-state"])
			.expect("Scope fixture should be valid.");

	config
}

fn start(config: &AuthConfig) -> ConsentSession {
	ConsentSession::start(
		config,
		test_client(),
		Url::parse(REDIRECT).expect("Redirect fixture should parse."),
		ConsentOptions::default(),
	)
}

#[tokio::test]
async fn code_exchange_seeds_provider_and_persists_credential() {
	let server = MockServer::start_async().await;
	let config = consent_config(&server);
	let clock = Arc::new(ManualClock::new(T0));
	let session = start(&config).with_clock(clock.clone());

	assert!(session.authorize_url().as_str().starts_with(&server.url("/authorize")));

	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/token")
				.form_urlencoded_tuple("grant_type", "authorization_code")
				.form_urlencoded_tuple("code", "AQD-consent")
				.form_urlencoded_tuple("redirect_uri", REDIRECT);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"BQ-consented\",\"token_type\":\"Bearer\",\"expires_in\":3600,\"refresh_token\":\"AQ-consented\",\"scope\":\"user-modify-playback-state user-read-private\"}",
			);
		})
		.await;
	let redirect = Url::parse(&format!("{REDIRECT}?code=AQD-consent&state={}", session.state()))
		.expect("Redirect should parse.");
	let store = Arc::new(MemoryStore::default());
	let provider: ReqwestAuthorizationCode = session
		.exchange_with_http_client(
			config.clone(),
			&redirect,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
			Some(store.clone() as Arc<dyn CredentialStore>),
		)
		.await
		.expect("Code exchange should succeed.");

	assert_eq!(provider.refresh_token().expose(), "AQ-consented");
	assert_eq!(store.saves(), 1);

	let stored = store.snapshot().expect("Consented credential should be persisted.");

	assert_eq!(stored.refresh_token().map(TokenSecret::expose), Some("AQ-consented"));
	assert!(stored.scope().covers(&config.required_scope));
	assert_eq!(stored.expires_at(), T0 + Duration::seconds(3600));

	let credential = provider.valid_credential().await.expect("Seeded credential should be used.");

	assert_eq!(credential, stored);

	clock.set(T0 + Duration::seconds(3599));

	provider.valid_credential().await.expect("The provider should follow the session clock.");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn denied_consent_never_reaches_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let config = consent_config(&server);
	let session = start(&config);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token");
			then.status(500);
		})
		.await;
	let redirect =
		Url::parse(&format!("{REDIRECT}?error=access_denied&state={}", session.state()))
			.expect("Redirect should parse.");
	let err = session
		.exchange_with_http_client::<ReqwestHttpClient, ReqwestTransportErrorMapper>(
			config,
			&redirect,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
			None,
		)
		.await
		.expect_err("Denied consent should fail.");

	assert_eq!(err.reason(), Some(AuthErrorReason::InvalidGrant));

	mock.assert_calls_async(0).await;
}
