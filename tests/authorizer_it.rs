#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
use time::macros;
// self
use spotify_auth::{
	_preludet::*,
	authorizer::RequestAuthorizer,
	error::AuthErrorReason,
	provider::PlainAccessTokenProvider,
};

const T0: OffsetDateTime = macros::datetime!(2025-03-01 12:00 UTC);

async fn mock_rotating_tokens(server: &MockServer) {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token").form_urlencoded_tuple("refresh_token", "AQ-1");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"BQ-old\",\"token_type\":\"Bearer\",\"expires_in\":3600,\"refresh_token\":\"AQ-2\"}",
			);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token").form_urlencoded_tuple("refresh_token", "AQ-2");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"BQ-new\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
}

#[tokio::test]
async fn rejected_token_is_refreshed_and_retried_once() {
	let server = MockServer::start_async().await;
	let clock = Arc::new(ManualClock::new(T0));
	let provider =
		Arc::new(build_authorization_code(test_config(&server.base_url()), "AQ-1", clock));
	let authorizer = RequestAuthorizer::new(Arc::clone(&provider));
	let http = test_reqwest_http_client();

	mock_rotating_tokens(&server).await;

	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/me").header("authorization", "Bearer BQ-old");
			then.status(401)
				.body("{\"error\":{\"status\":401,\"message\":\"The access token expired\"}}");
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/me").header("authorization", "Bearer BQ-new");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":\"wizzler\"}");
		})
		.await;
	let response = authorizer
		.execute(
			|| http.get(server.url("/v1/me")),
			|request: reqwest::RequestBuilder| request.send(),
		)
		.await
		.expect("The retried request should succeed.");

	assert_eq!(response.status(), reqwest::StatusCode::OK);

	rejected.assert_calls_async(1).await;
	accepted.assert_calls_async(1).await;

	assert_eq!(provider.metrics().attempts(), 2);
}

#[tokio::test]
async fn repeated_unauthorized_dispatches_exactly_twice() {
	let server = MockServer::start_async().await;
	let clock = Arc::new(ManualClock::new(T0));
	let provider =
		Arc::new(build_authorization_code(test_config(&server.base_url()), "AQ-1", clock));
	let authorizer = RequestAuthorizer::new(Arc::clone(&provider));
	let http = test_reqwest_http_client();

	mock_rotating_tokens(&server).await;

	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/me/player");
			then.status(401);
		})
		.await;
	let err = authorizer
		.execute(
			|| http.get(server.url("/v1/me/player")),
			|request: reqwest::RequestBuilder| request.send(),
		)
		.await
		.expect_err("A second 401 should surface as an error.");

	assert_eq!(err.reason(), Some(AuthErrorReason::InvalidGrant));

	api.assert_calls_async(2).await;

	assert_eq!(provider.metrics().attempts(), 2);
}

#[tokio::test]
async fn static_token_is_not_retried() {
	let server = MockServer::start_async().await;
	let provider =
		Arc::new(PlainAccessTokenProvider::new("BQ-static").expect("Static token should wrap."));
	let authorizer = RequestAuthorizer::new(provider);
	let http = test_reqwest_http_client();
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/me").header("authorization", "Bearer BQ-static");
			then.status(401);
		})
		.await;
	let err = authorizer
		.execute(
			|| http.get(server.url("/v1/me")),
			|request: reqwest::RequestBuilder| request.send(),
		)
		.await
		.expect_err("A rejected static token cannot recover.");

	assert_eq!(err.reason(), Some(AuthErrorReason::InvalidGrant));

	api.assert_calls_async(1).await;
}
