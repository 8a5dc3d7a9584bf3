use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;

use tokio::time::timeout;
use tracing::error;

use crate::api::util::prelude::*;
use crate::api::AppState;
use crate::db::ThingStore;

pub enum HealthCheckError {
	DatabaseUnavailable,
}

impl From<HealthCheckError> for WebError<&'static str> {
	fn from(v: HealthCheckError) -> WebError<&'static str> {
		use HealthCheckError::*;
		match v {
			DatabaseUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "database unavailable").into(),
		}
	}
}

pub async fn database_test(db: &dyn ThingStore) -> bool {
	match timeout(Duration::from_millis(500), db.ping()).await {
		Ok(Ok(())) => true,
		Ok(Err(e)) => {
			error!(err=%e, "health check error");
			false
		}
		Err(_) => {
			error!("health check timed out");
			false
		}
	}
}

pub async fn health_check(
	State(AppState { stores, .. }): State<AppState>,
) -> WebResult<&'static str, &'static str> {
	if !database_test(stores.things.as_ref()).await {
		return Err(HealthCheckError::DatabaseUnavailable)?;
	}

	Ok("healthy".into())
}
