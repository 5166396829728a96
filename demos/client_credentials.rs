//! Runs the client-credentials provider against a local mock of the accounts service and shows
//! the cached app token being reused until it nears expiry.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use spotify_auth::{
	auth::ClientIdentity,
	config::AuthConfig,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	provider::{AuthProvider, ClientCredentialsProvider},
	reqwest::Client,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/token")
				.form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"BQ-demo\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let config = AuthConfig::builder()
		.authorization_endpoint(Url::parse(&server.url("/authorize"))?)
		.token_endpoint(Url::parse(&server.url("/api/token"))?)
		.build()?;
	let http_client = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let provider =
		<ClientCredentialsProvider<ReqwestHttpClient, ReqwestTransportErrorMapper>>::with_http_client(
			config,
			ClientIdentity::new("demo-client", "super-secret")?,
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		)?;
	let first = provider.valid_credential().await?;
	let second = provider.valid_credential().await?;

	println!("App token: {}.", first.access_token().expose());
	println!("Expires at {}.", first.expires_at());
	println!(
		"Second call reused the cache: {} ({} exchange).",
		first == second,
		provider.metrics().attempts()
	);

	token_mock.assert_async().await;

	Ok(())
}
