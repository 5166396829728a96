//! Starts a Spotify consent handshake, prints the authorize URL, and shows how the redirect
//! handler validates the URL the browser lands on before exchanging the code.

// std
use std::collections::HashMap;
// crates.io
use color_eyre::Result;
use url::Url;
// self
use spotify_auth::{
	auth::{ClientIdentity, ScopeSet},
	config::AuthConfig,
	consent::{ConsentOptions, ConsentSession},
};

fn main() -> Result<()> {
	color_eyre::install()?;

	let config = AuthConfig::builder()
		.required_scope(ScopeSet::new(["user-read-private", "user-modify-playback-state"])?)
		.build()?;
	let session = ConsentSession::start(
		&config,
		ClientIdentity::new("demo-client", "demo-secret")?,
		Url::parse("http://127.0.0.1:8888/callback")?,
		ConsentOptions { show_dialog: true },
	);

	println!("Send your user to {}.", session.authorize_url());
	println!(
		"PKCE challenge ({}): {}.",
		session.code_challenge_method().as_str(),
		session.code_challenge()
	);

	let mut sessions: HashMap<String, ConsentSession> = HashMap::new();

	sessions.insert(session.state().to_owned(), session.clone());

	// What the browser would be redirected to after the user approves.
	let redirect = Url::parse(&format!(
		"{}?code=AQD-demo&state={}",
		session.redirect_uri(),
		session.state()
	))?;
	let returned_state = redirect
		.query_pairs()
		.find(|(key, _)| key == "state")
		.map(|(_, value)| value.into_owned())
		.unwrap_or_default();

	if let Some(stashed) = sessions.remove(&returned_state) {
		let code = stashed.parse_redirect(&redirect)?;

		println!("Validated state for scope `{}`; received code `{code}`.", stashed.scope());
		println!("Call ConsentSession::exchange with this redirect to obtain a refresh token.");
	} else {
		eprintln!("State `{returned_state}` was not recognized.");
	}

	Ok(())
}
