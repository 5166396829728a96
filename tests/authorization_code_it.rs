#![cfg(all(feature = "reqwest", feature = "test"))]

// std
use std::process;
// crates.io
use httpmock::prelude::*;
use time::macros;
// self
use spotify_auth::{
	_preludet::*,
	auth::{Credential, ScopeSet, TokenSecret},
	error::AuthErrorReason,
	oauth::ReqwestTransportErrorMapper,
	provider::AuthProvider,
	store::{self, CredentialStore, MemoryStore},
};

const T0: OffsetDateTime = macros::datetime!(2025-03-01 12:00 UTC);

fn scratch_path(name: &str) -> PathBuf {
	std::env::temp_dir()
		.join(format!("spotify-auth-it-{}", process::id()))
		.join(format!("{name}.json"))
}

fn persisted(access: &str, refresh: &str, issued_at: OffsetDateTime) -> Credential {
	Credential::builder(access)
		.refresh_token(refresh)
		.client(test_client())
		.scope(ScopeSet::new(["user-read-private"]).expect("Scope fixture should be valid."))
		.issued_at(issued_at)
		.expires_in(Duration::seconds(3600))
		.build()
		.expect("Persisted credential fixture should build.")
}

#[tokio::test]
async fn rotated_refresh_token_drives_the_next_exchange() {
	let server = MockServer::start_async().await;
	let clock = Arc::new(ManualClock::new(T0));
	let provider =
		build_authorization_code(test_config(&server.base_url()), "AQ-refresh-1", clock.clone());
	let first_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/token")
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "AQ-refresh-1");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"BQ-user-1\",\"token_type\":\"Bearer\",\"expires_in\":3600,\"refresh_token\":\"AQ-refresh-2\",\"scope\":\"user-read-private user-top-read\"}",
			);
		})
		.await;
	let second_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/token")
				.form_urlencoded_tuple("refresh_token", "AQ-refresh-2");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"BQ-user-2\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let first = provider.valid_credential().await.expect("Seeded exchange should succeed.");

	assert_eq!(first.access_token().expose(), "BQ-user-1");
	assert_eq!(first.refresh_token().map(TokenSecret::expose), Some("AQ-refresh-2"));
	assert_eq!(first.scope().normalized(), "user-read-private user-top-read");
	assert_eq!(provider.refresh_token().expose(), "AQ-refresh-2");

	clock.advance(Duration::seconds(3601));

	let second = provider.valid_credential().await.expect("Rotated exchange should succeed.");

	assert_eq!(second.access_token().expose(), "BQ-user-2");
	// The response omitted `refresh_token` and `scope`; both carry forward.
	assert_eq!(second.refresh_token().map(TokenSecret::expose), Some("AQ-refresh-2"));
	assert_eq!(second.scope(), first.scope());

	first_mock.assert_calls_async(1).await;
	second_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn invalid_grant_is_terminal() {
	let server = MockServer::start_async().await;
	let clock = Arc::new(ManualClock::new(T0));
	let provider = build_authorization_code(test_config(&server.base_url()), "AQ-revoked", clock);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token");
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"error_description\":\"Refresh token revoked\"}",
			);
		})
		.await;
	let first = provider.valid_credential().await.expect_err("Revoked token should fail.");

	assert_eq!(first.reason(), Some(AuthErrorReason::InvalidGrant));
	assert!(first.requires_reauthentication());

	let forced = provider
		.force_refresh(&TokenSecret::new("BQ-anything"))
		.await
		.expect_err("Forced refresh after revocation should fail too.");

	assert_eq!(forced.reason(), Some(AuthErrorReason::InvalidGrant));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_forced_refreshes_collapse_into_one_exchange() {
	let server = MockServer::start_async().await;
	let clock = Arc::new(ManualClock::new(T0));
	let provider = Arc::new(build_authorization_code(
		test_config(&server.base_url()),
		"AQ-refresh",
		clock,
	));
	let mut initial = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"BQ-stale\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let stale = provider.valid_credential().await.expect("Initial exchange should succeed.");

	initial.assert_calls_async(1).await;
	initial.delete_async().await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(100))
				.body(
					"{\"access_token\":\"BQ-fresh\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
				);
		})
		.await;
	let rejected = stale.access_token().clone();
	let handles = (0..4)
		.map(|_| {
			let provider = Arc::clone(&provider);
			let rejected = rejected.clone();

			tokio::spawn(async move { provider.force_refresh(&rejected).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let credential = handle
			.await
			.expect("Forced refresh task should not panic.")
			.expect("Forced refresh should succeed.");

		assert_eq!(credential.access_token().expose(), "BQ-fresh");
	}

	mock.assert_calls_async(1).await;

	assert_eq!(provider.metrics().attempts(), 2);
}

#[tokio::test]
async fn renewed_credential_is_saved_before_it_is_returned() {
	let server = MockServer::start_async().await;
	let clock = Arc::new(ManualClock::new(T0));
	let store = Arc::new(MemoryStore::default());
	let provider =
		build_authorization_code(test_config(&server.base_url()), "AQ-persist", clock)
			.with_store(store.clone());

	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"BQ-saved\",\"token_type\":\"Bearer\",\"expires_in\":3600,\"refresh_token\":\"AQ-persist-2\"}",
			);
		})
		.await;

	let credential = provider.valid_credential().await.expect("Exchange should succeed.");

	assert_eq!(store.saves(), 1);
	assert_eq!(store.snapshot(), Some(credential));
}

#[tokio::test]
async fn load_with_past_expiry_refreshes_on_first_call() {
	let server = MockServer::start_async().await;
	let clock = Arc::new(ManualClock::new(T0));
	let path = scratch_path("past-expiry");

	store::save(&path, &persisted("BQ-stale", "AQ-stored", T0 - Duration::hours(2)))
		.expect("Seeding the credential file should succeed.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/token")
				.form_urlencoded_tuple("refresh_token", "AQ-stored");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"BQ-restored\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let provider = ReqwestAuthorizationCode::load_from_path(
		test_config(&server.base_url()),
		&path,
		test_reqwest_http_client(),
		Arc::new(ReqwestTransportErrorMapper),
	)
	.expect("Provider should load from the credential file.")
	.with_clock(clock);
	let credential = provider.valid_credential().await.expect("First call should refresh.");

	assert_eq!(credential.access_token().expose(), "BQ-restored");
	assert!(credential.expires_at() > T0);

	mock.assert_calls_async(1).await;

	let reloaded = store::load(&path).expect("Renewed credential should be on disk.");

	assert_eq!(reloaded, credential);
	assert_eq!(reloaded.refresh_token().map(TokenSecret::expose), Some("AQ-stored"));

	let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn load_with_valid_record_skips_the_network() {
	let server = MockServer::start_async().await;
	let clock = Arc::new(ManualClock::new(T0 + Duration::minutes(5)));
	let store = Arc::new(MemoryStore::with_credential(persisted("BQ-live", "AQ-live", T0)));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token");
			then.status(500);
		})
		.await;
	let provider = ReqwestAuthorizationCode::load_from_store(
		test_config(&server.base_url()),
		store.clone() as Arc<dyn CredentialStore>,
		test_reqwest_http_client(),
		Arc::new(ReqwestTransportErrorMapper),
	)
	.await
	.expect("Provider should load from the store.");
	let provider = provider.with_clock(clock);
	let credential = provider.valid_credential().await.expect("Live credential should be reused.");

	assert_eq!(credential.access_token().expose(), "BQ-live");
	assert_eq!(store.saves(), 0);

	mock.assert_calls_async(0).await;
}

#[test]
fn load_reports_missing_file() {
	let err = ReqwestAuthorizationCode::load_from_path(
		test_config("http://127.0.0.1:9"),
		scratch_path("does-not-exist"),
		test_reqwest_http_client(),
		Arc::new(ReqwestTransportErrorMapper),
	)
	.expect_err("Loading a missing file should fail.");

	assert!(matches!(err, Error::Storage(store::StoreError::NotFound { .. })));
}
