use axum::extract::rejection::{BytesRejection, JsonRejection, QueryRejection};
use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use serde::Serialize;

use crate::validation::ValidationErrors;

#[must_use]
pub struct WebSuccess<M: Serialize> {
	pub code: StatusCode,
	pub msg: M,
}

impl<M: Serialize> WebSuccess<M> {
	pub fn new(code: StatusCode, msg: M) -> Self {
		Self { code, msg }
	}
}

impl<M: Serialize> From<M> for WebSuccess<M> {
	fn from(msg: M) -> Self {
		Self {
			code: StatusCode::OK,
			msg,
		}
	}
}

#[must_use]
#[derive(Debug)]
pub struct WebError<E: Serialize> {
	pub code: StatusCode,
	pub error: E,
}

impl<E: Serialize> From<(StatusCode, E)> for WebError<E> {
	fn from((code, error): (StatusCode, E)) -> Self {
		Self { code, error }
	}
}

pub type WebResult<M, E> = Result<WebSuccess<M>, WebError<E>>;

#[derive(Serialize)]
struct Msg<T> {
	msg: T,
}

#[derive(Serialize)]
struct Error<T> {
	error: T,
}

impl<M: Serialize> IntoResponse for WebSuccess<M> {
	fn into_response(self) -> axum::response::Response {
		(self.code, Json(Msg { msg: self.msg })).into_response()
	}
}

impl<E: Serialize> IntoResponse for WebError<E> {
	fn into_response(self) -> axum::response::Response {
		(self.code, Json(Error { error: self.error })).into_response()
	}
}

/// Error body of every failed call.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct ApiError {
	pub code: &'static str,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fields: Option<ValidationErrors>,
}

impl ApiError {
	pub fn new(code: &'static str, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			fields: None,
		}
	}
}

impl From<ValidationErrors> for ApiError {
	fn from(errors: ValidationErrors) -> Self {
		Self {
			code: "VALIDATION_FAILED",
			message: errors.to_string(),
			fields: Some(errors),
		}
	}
}

/// Requests axum couldn't even parse. The status is axum's.
macro_rules! rejection_into_api_error {
	($($rejection:ty),*) => {
		$(
			impl From<$rejection> for WebError<ApiError> {
				fn from(r: $rejection) -> Self {
					(r.status(), ApiError::new("INVALID_REQUEST", r.body_text())).into()
				}
			}
		)*
	};
}

rejection_into_api_error!(JsonRejection, QueryRejection, BytesRejection);

pub mod prelude {
	pub use super::ApiError;
	pub use super::WebError;
	pub use super::WebResult;
	pub use super::WebSuccess;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn validation_message_is_the_first_field_message() {
		let mut errors = ValidationErrors::default();
		errors.push("title", "Title is required");
		errors.push("imageId", "Invalid image id");

		let e: ApiError = errors.into();

		assert_eq!(e.code, "VALIDATION_FAILED");
		assert_eq!(e.message, "Title is required");
		assert_eq!(e.fields.unwrap().0.len(), 2);
	}
}
