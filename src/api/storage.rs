use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use serde::Serialize;
use tracing::{debug, error};

use crate::api::auth::AuthContext;
use crate::api::handlers;
use crate::api::util::prelude::*;
use crate::api::AppState;
use crate::db::model::{StorageId, UploadUrl};

pub enum StorageError {
	InvalidUploadUrl,
	NotFound,
	Internal,
}

impl From<StorageError> for WebError<ApiError> {
	fn from(v: StorageError) -> WebError<ApiError> {
		use StorageError::*;
		match v {
			InvalidUploadUrl => (
				StatusCode::NOT_FOUND,
				ApiError::new("UPLOAD_URL_INVALID", "upload url unknown, used or expired"),
			)
				.into(),
			NotFound => (
				StatusCode::NOT_FOUND,
				ApiError::new("NOT_FOUND", "not found"),
			)
				.into(),
			Internal => (
				StatusCode::INTERNAL_SERVER_ERROR,
				ApiError::new("INTERNAL", "internal server error"),
			)
				.into(),
		}
	}
}

pub async fn generate_upload_url(ctx: AuthContext) -> WebResult<UploadUrl, ApiError> {
	Ok(handlers::storage::generate_upload_url(&ctx).await?.into())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Uploaded {
	storage_id: StorageId,
}

/// Redeems an upload url. The token in the path is the only authorization.
pub async fn upload(
	State(AppState { stores, .. }): State<AppState>,
	Path(token): Path<String>,
	headers: HeaderMap,
	body: Result<Bytes, BytesRejection>,
) -> WebResult<Uploaded, ApiError> {
	let body = body?;

	let content_type = headers
		.get(CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.map(ToOwned::to_owned);

	let stored = stores
		.blobs
		.store_upload(&token, content_type, body.to_vec())
		.await
		.map_err(|e| {
			error!(err=?e, "unable to store upload");
			StorageError::Internal
		})?;

	match stored {
		Some(storage_id) => {
			debug!(%storage_id, "stored upload");
			Ok(Uploaded { storage_id }.into())
		}
		None => Err(StorageError::InvalidUploadUrl)?,
	}
}

pub async fn download(
	State(AppState { stores, .. }): State<AppState>,
	Path(id): Path<String>,
) -> Result<Response, WebError<ApiError>> {
	let Ok(id) = id.parse::<StorageId>() else {
		return Err(StorageError::NotFound)?;
	};

	let blob = stores.blobs.fetch(id).await.map_err(|e| {
		error!(err=?e, "unable to fetch blob");
		StorageError::Internal
	})?;

	let Some(blob) = blob else {
		return Err(StorageError::NotFound)?;
	};

	let content_type = blob
		.content_type
		.as_deref()
		.and_then(|c| HeaderValue::from_str(c).ok())
		.unwrap_or(HeaderValue::from_static("application/octet-stream"));

	Ok(([(CONTENT_TYPE, content_type)], blob.data).into_response())
}
