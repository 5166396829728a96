//! Bearer attachment and bounded `401` recovery for outbound Web API requests.
//!
//! [`RequestAuthorizer::authorize`] decorates a request with the current access token.
//! When the API answers `401`, [`RequestAuthorizer::handle_unauthorized`] forces one refresh
//! and re-authorizes the request; a second `401` for the same request is terminal and never
//! triggers another refresh. [`RequestAuthorizer::execute`] runs that loop for callers that
//! can rebuild their request.

// crates.io
use oauth2::{
	HttpResponse,
	http::{StatusCode, header::AUTHORIZATION, request::Builder as HttpRequestBuilder},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::AuthProvider,
};

/// Request types that can carry an `Authorization: Bearer` header.
pub trait BearerRequest
where
	Self: Sized,
{
	/// Returns the request with `Authorization: Bearer <token>` set.
	fn with_bearer(self, token: &TokenSecret) -> Self;
}
#[cfg(feature = "reqwest")]
impl BearerRequest for reqwest::RequestBuilder {
	fn with_bearer(self, token: &TokenSecret) -> Self {
		self.bearer_auth(token.expose())
	}
}
impl BearerRequest for HttpRequestBuilder {
	fn with_bearer(self, token: &TokenSecret) -> Self {
		self.header(AUTHORIZATION, token.bearer_header_value())
	}
}

/// Responses that report whether the API rejected the bearer token.
pub trait AuthorizationStatus {
	/// Returns `true` for HTTP `401 Unauthorized`.
	fn is_unauthorized(&self) -> bool;
}
#[cfg(feature = "reqwest")]
impl AuthorizationStatus for reqwest::Response {
	fn is_unauthorized(&self) -> bool {
		self.status() == reqwest::StatusCode::UNAUTHORIZED
	}
}
impl AuthorizationStatus for HttpResponse {
	fn is_unauthorized(&self) -> bool {
		self.status() == StatusCode::UNAUTHORIZED
	}
}

/// Token attached to a dispatched request and whether that dispatch was already the retry.
#[derive(Clone, Debug)]
pub struct Attempt {
	token: TokenSecret,
	retry: bool,
}
impl Attempt {
	/// Access token that was attached.
	pub fn token(&self) -> &TokenSecret {
		&self.token
	}

	/// `true` once the request has been re-authorized after a `401`.
	pub fn is_retry(&self) -> bool {
		self.retry
	}
}

/// A request decorated with a bearer token, ready to dispatch.
#[derive(Debug)]
pub struct AuthorizedRequest<R> {
	request: R,
	attempt: Attempt,
}
impl<R> AuthorizedRequest<R> {
	/// Attempt metadata; keep it to pass to [`RequestAuthorizer::handle_unauthorized`].
	pub fn attempt(&self) -> &Attempt {
		&self.attempt
	}

	/// Splits into the decorated request and its attempt metadata.
	pub fn into_parts(self) -> (R, Attempt) {
		(self.request, self.attempt)
	}

	/// Returns the decorated request, discarding attempt metadata.
	pub fn into_request(self) -> R {
		self.request
	}
}

/// Attaches provider-issued bearer tokens and recovers once from a rejected token.
pub struct RequestAuthorizer<P>
where
	P: ?Sized + AuthProvider,
{
	provider: Arc<P>,
}
impl<P> RequestAuthorizer<P>
where
	P: ?Sized + AuthProvider,
{
	/// Wraps a shared provider.
	pub fn new(provider: Arc<P>) -> Self {
		Self { provider }
	}

	/// Provider backing this authorizer.
	pub fn provider(&self) -> &Arc<P> {
		&self.provider
	}

	/// Decorates `request` with a currently valid access token.
	pub async fn authorize<R>(&self, request: R) -> Result<AuthorizedRequest<R>>
	where
		R: BearerRequest,
	{
		let credential = self.provider.valid_credential().await?;
		let token = credential.access_token().clone();

		Ok(AuthorizedRequest {
			request: request.with_bearer(&token),
			attempt: Attempt { token, retry: false },
		})
	}

	/// Recovers from a `401` answered for the dispatch described by `rejected`.
	///
	/// A first attempt forces one refresh (collapsed with concurrent recoveries for the same
	/// token) and returns `request` re-authorized as the retry. A rejected retry fails with
	/// [`Error::InvalidGrant`] without refreshing again.
	pub async fn handle_unauthorized<R>(
		&self,
		rejected: &Attempt,
		request: R,
	) -> Result<AuthorizedRequest<R>>
	where
		R: BearerRequest,
	{
		if rejected.retry {
			let err = Error::InvalidGrant {
				reason: "access token was rejected again after a forced refresh".into(),
			};

			obs::record_flow_outcome(FlowKind::Authorize, FlowOutcome::Failure);
			obs::trace_flow_failure(FlowKind::Authorize, &err);

			return Err(err);
		}

		let span = FlowSpan::new(FlowKind::Authorize, "handle_unauthorized");

		obs::record_flow_outcome(FlowKind::Authorize, FlowOutcome::Attempt);

		let refreshed = span.instrument(self.provider.force_refresh(&rejected.token)).await;

		match refreshed {
			Ok(credential) => {
				obs::record_flow_outcome(FlowKind::Authorize, FlowOutcome::Success);

				let token = credential.access_token().clone();

				Ok(AuthorizedRequest {
					request: request.with_bearer(&token),
					attempt: Attempt { token, retry: true },
				})
			},
			Err(err) => {
				obs::record_flow_outcome(FlowKind::Authorize, FlowOutcome::Failure);
				obs::trace_flow_failure(FlowKind::Authorize, &err);

				Err(err)
			},
		}
	}

	/// Dispatches a request built by `build`, retrying once through
	/// [`RequestAuthorizer::handle_unauthorized`] on `401`.
	///
	/// `dispatch` runs at most twice. A second `401` surfaces as [`Error::InvalidGrant`]; any
	/// other response is returned as-is.
	pub async fn execute<R, T, E, B, D, Fut>(&self, mut build: B, mut dispatch: D) -> Result<T>
	where
		R: BearerRequest,
		T: AuthorizationStatus,
		E: Into<Error>,
		B: FnMut() -> R,
		D: FnMut(R) -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		let mut authorized = self.authorize(build()).await?;

		loop {
			let (request, attempt) = authorized.into_parts();
			let response = dispatch(request).await.map_err(Into::into)?;

			if !response.is_unauthorized() {
				return Ok(response);
			}

			authorized = self.handle_unauthorized(&attempt, build()).await?;
		}
	}
}
impl<P> Clone for RequestAuthorizer<P>
where
	P: ?Sized + AuthProvider,
{
	fn clone(&self) -> Self {
		Self { provider: Arc::clone(&self.provider) }
	}
}
impl<P> Debug for RequestAuthorizer<P>
where
	P: ?Sized + AuthProvider,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestAuthorizer").finish_non_exhaustive()
	}
}
