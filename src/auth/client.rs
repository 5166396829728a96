//! Application identity used to authenticate against the token endpoint.

// std
use std::env;
// self
use crate::{
	_prelude::*,
	auth::{ClientId, TokenSecret},
	error::ConfigError,
};

/// Environment variable read by [`ClientIdentity::from_env`] for the client id.
pub const CLIENT_ID_ENV: &str = "SPOTIFY_CLIENT_ID";
/// Environment variable read by [`ClientIdentity::from_env`] for the client secret.
pub const CLIENT_SECRET_ENV: &str = "SPOTIFY_CLIENT_SECRET";

/// Client id + secret pair required by every confidential grant.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientIdentity {
	/// Public client identifier.
	pub client_id: ClientId,
	/// Confidential client secret.
	pub client_secret: TokenSecret,
}
impl ClientIdentity {
	/// Validates and wraps a client id + secret pair.
	pub fn new(client_id: impl AsRef<str>, client_secret: impl Into<String>) -> Result<Self> {
		let client_id = ClientId::new(client_id)
			.map_err(|e| ConfigError::InvalidClientIdentity { reason: e.to_string() })?;
		let client_secret = TokenSecret::new(client_secret);

		if client_secret.is_empty() {
			return Err(ConfigError::InvalidClientIdentity {
				reason: "client secret cannot be empty".into(),
			}
			.into());
		}

		Ok(Self { client_id, client_secret })
	}

	/// Reads the identity from `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET`.
	pub fn from_env() -> Result<Self> {
		let client_id = read_env(CLIENT_ID_ENV)?;
		let client_secret = read_env(CLIENT_SECRET_ENV)?;

		Self::new(client_id, client_secret)
	}
}
impl Debug for ClientIdentity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientIdentity")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.finish()
	}
}

fn read_env(name: &'static str) -> Result<String> {
	env::var(name).map_err(|e| {
		ConfigError::InvalidClientIdentity { reason: format!("{name} is not usable: {e}") }.into()
	})
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn rejects_blank_secret_and_bad_id() {
		assert!(ClientIdentity::new("id", "").is_err());
		assert!(ClientIdentity::new("bad id", "secret").is_err());

		let identity =
			ClientIdentity::new("id", "s3cr3t-value").expect("Identity fixture should be valid.");

		assert_eq!(identity.client_id.as_ref(), "id");
		assert!(!format!("{identity:?}").contains("s3cr3t"));
	}
}
