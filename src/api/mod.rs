use std::sync::Arc;

use anyhow::Context;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;

use axum_server::tls_rustls::RustlsConfig;
use tower_http::request_id::{
	MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

use crate::auth::IdentityProvider;
use crate::configuration::Config;
use crate::db::Stores;

mod auth;
mod handlers;
mod health;
mod storage;
mod thing;
mod util;

#[derive(Clone)]
pub struct AppState {
	pub stores: Stores,
	pub auth: Arc<dyn IdentityProvider>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
	Router::new()
		.route("/health", get(health::health_check))
		.route("/me", get(auth::me))
		.route("/things", get(thing::list).post(thing::create))
		.route(
			"/things/:id",
			get(thing::get).patch(thing::update).delete(thing::remove),
		)
		.route("/storage/upload-url", post(storage::generate_upload_url))
		.route(
			"/storage/upload/:token",
			post(storage::upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
		)
		.route("/storage/:id", get(storage::download))
		.with_state(state)
}

pub async fn run(stores: Stores, cfg: Config, auth: Arc<dyn IdentityProvider>) -> anyhow::Result<()> {
	let state = AppState { stores, auth };

	let app = router(state, cfg.storage.max_upload_bytes)
		.layer(
			TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
				let request_id = request
					.extensions()
					.get::<RequestId>()
					.and_then(|id| id.header_value().to_str().ok())
					.unwrap_or("unknown");

				info_span!("request", id = %request_id, method = %request.method(), uri = %request.uri())
			}),
		)
		.layer(PropagateRequestIdLayer::x_request_id())
		.layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

	info!(uri=%cfg.hosturl, public_url=%cfg.public_url, "Starting server");

	match &cfg.tls {
		Some(tls) => {
			let rustls = RustlsConfig::from_pem_file(&tls.certpath, &tls.keypath)
				.await
				.context("unable to load tls certificate")?;

			axum_server::bind_rustls(cfg.hosturl, rustls)
				.serve(app.into_make_service())
				.await?;
		}
		None => {
			let listener = tokio::net::TcpListener::bind(cfg.hosturl)
				.await
				.context("unable to bind")?;

			axum::serve(listener, app).await?;
		}
	}

	Ok(())
}
