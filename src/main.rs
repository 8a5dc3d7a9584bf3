#![deny(clippy::todo)]
#![forbid(unsafe_code)]
#![deny(clippy::pedantic)]
// This lint is stupid
#![allow(clippy::module_name_repetitions)]
// I like the match operator
#![allow(clippy::single_match_else)]
#![allow(clippy::manual_let_else)]
// I like using globbed enums
#![allow(clippy::enum_glob_use)]

use std::sync::Arc;

use anyhow::Context;

use auth::Authenticator;

mod api;
mod auth;
mod configuration;
mod db;
mod util;
mod validation;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	if let Err(e) = dotenvy::dotenv() {
		println!("WARN: Error getting dotenv file: {e}");
	}

	util::logging::init_from_env();

	let cfg = configuration::load().context("unable to load configuration")?;

	let stores = db::connect(&cfg).await?;

	let auth = Authenticator::from_config(&cfg.auth)
		.await
		.context("unable to set up authenticator")?;

	api::run(stores, cfg, Arc::new(auth)).await
}
