//! Authenticated procedures.
//!
//! Every call, which acts on behalf of a user goes through [`authenticated`]
//! (directly, or through the [`AuthContext`] extractor). The caller's identity
//! is resolved once per call and handed to the handler together with the
//! stores it may use. Calls without a resolvable identity are rejected before
//! the handler runs.

use std::future::Future;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};

use tracing::{debug, warn};

use crate::api::handlers::HandlerError;
use crate::api::util::prelude::*;
use crate::api::AppState;
use crate::auth::{AuthenticatorError, Identity, UserId};
use crate::db::{BlobStore, ThingStore};

pub const AUTH_COOKIE: &str = "auth_token";

/// Token from the `Authorization: Bearer` header, falling back to the auth cookie.
pub fn request_token(headers: &HeaderMap) -> Option<String> {
	if let Some(auth) = headers.typed_get::<Authorization<Bearer>>() {
		return Some(auth.token().to_owned());
	}

	CookieJar::from_headers(headers)
		.get(AUTH_COOKIE)
		.map(|c| c.value().to_owned())
}

/// Everything a call carries before its caller is known.
pub struct RequestContext {
	pub token: Option<String>,
	pub state: AppState,
}

impl RequestContext {
	pub fn from_headers(headers: &HeaderMap, state: AppState) -> Self {
		Self {
			token: request_token(headers),
			state,
		}
	}
}

/// Context of an authenticated call.
#[derive(Clone)]
pub struct AuthContext {
	pub user: Identity,
	pub user_id: UserId,
	pub things: Arc<dyn ThingStore>,
	pub blobs: Arc<dyn BlobStore>,
}

impl AuthContext {
	pub async fn resolve(ctx: RequestContext) -> Result<Self, HandlerError> {
		let Some(token) = ctx.token else {
			debug!("call without credentials");
			return Err(HandlerError::Unauthorized);
		};

		let user = match ctx.state.auth.resolve(&token).await {
			Ok(u) => u,
			Err(AuthenticatorError::Expired) => {
				warn!("authentication claims invalid, token expired");
				return Err(HandlerError::Unauthorized);
			}
			Err(AuthenticatorError::KeyFetch(e)) => {
				// not the caller's fault
				return Err(HandlerError::Internal(e));
			}
			Err(e) => {
				warn!(%e, "invalid jwt");
				return Err(HandlerError::Unauthorized);
			}
		};

		Ok(Self {
			user_id: user.user_id(),
			user,
			things: ctx.state.stores.things,
			blobs: ctx.state.stores.blobs,
		})
	}
}

/// Runs `handler` on behalf of the caller behind `ctx`.
///
/// Fails with [`HandlerError::Unauthorized`] without invoking `handler` if no
/// identity can be resolved. Whatever `handler` returns is passed through.
pub async fn authenticated<T, F, Fut>(ctx: RequestContext, handler: F) -> Result<T, HandlerError>
where
	F: FnOnce(AuthContext) -> Fut,
	Fut: Future<Output = Result<T, HandlerError>>,
{
	let auth = AuthContext::resolve(ctx).await?;

	handler(auth).await
}

/// The caller, as the identity provider sees them.
pub async fn me(ctx: AuthContext) -> WebResult<Identity, ApiError> {
	Ok(ctx.user.into())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
	type Rejection = WebError<ApiError>;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &AppState,
	) -> Result<Self, Self::Rejection> {
		let ctx = RequestContext::from_headers(&parts.headers, state.clone());

		Ok(authenticated(ctx, |auth| async move { Ok(auth) }).await?)
	}
}
