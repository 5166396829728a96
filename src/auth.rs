//! Auth-domain identifiers, scope sets, secrets, and the credential model.

pub mod client;
pub mod credential;
pub mod id;
pub mod scope;
pub mod secret;

pub use client::*;
pub use credential::*;
pub use id::*;
pub use scope::*;
pub use secret::*;
