use axum::http::StatusCode;
use tracing::error;

use crate::api::util::{ApiError, WebError};
use crate::auth::UserId;
use crate::db::model::HasUserId;
use crate::validation::ValidationErrors;

pub mod storage;
pub mod thing;

#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
	#[error("unauthorized")]
	Unauthorized,
	/// Missing and foreign records are reported the same way.
	#[error("not found or not authorized")]
	NotFoundOrUnauthorized,
	#[error(transparent)]
	Invalid(#[from] ValidationErrors),
	#[error("internal server error")]
	Internal(#[from] anyhow::Error),
}

impl From<HandlerError> for WebError<ApiError> {
	fn from(v: HandlerError) -> WebError<ApiError> {
		use HandlerError::*;
		match v {
			Unauthorized => (
				StatusCode::UNAUTHORIZED,
				ApiError::new("UNAUTHORIZED", "unauthorized"),
			)
				.into(),
			NotFoundOrUnauthorized => (
				StatusCode::NOT_FOUND,
				ApiError::new("NOT_FOUND_OR_UNAUTHORIZED", "not found or not authorized"),
			)
				.into(),
			Invalid(errors) => (StatusCode::UNPROCESSABLE_ENTITY, ApiError::from(errors)).into(),
			Internal(e) => {
				error!(err=?e, "handler failed");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ApiError::new("INTERNAL", "internal server error"),
				)
					.into()
			}
		}
	}
}

pub fn check_object_belong_to_userid<'a, T: HasUserId + 'a>(
	mut objects: impl Iterator<Item = &'a T>,
	user_id: &UserId,
) -> anyhow::Result<()> {
	let Some(invalid) = objects.find(|i| i.user_id() != user_id.as_str()) else {
		return Ok(());
	};

	error!(
		id = invalid.identifier(),
		"application attempted to return object, which does not belong to user!"
	);

	// technically true and avoids leaking this information.
	Err(anyhow::anyhow!(
		"application attempt to return object, which doesn't belong to user"
	))
}
