use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query};
use axum::http::StatusCode;

use serde::Serialize;

use crate::api::auth::AuthContext;
use crate::api::handlers;
use crate::api::util::prelude::*;
use crate::db::model::{ThingId, WebThing};
use crate::validation::thing::{CreateThingArgs, ListArgs, UpdateThingArgs};

pub async fn list(
	ctx: AuthContext,
	args: Result<Query<ListArgs>, QueryRejection>,
) -> WebResult<Vec<WebThing>, ApiError> {
	let Query(args) = args?;

	Ok(handlers::thing::list(&ctx, args).await?.into())
}

pub async fn get(ctx: AuthContext, Path(id): Path<String>) -> WebResult<Option<WebThing>, ApiError> {
	Ok(handlers::thing::get(&ctx, &id).await?.into())
}

#[derive(Serialize)]
pub struct CreatedThing {
	id: ThingId,
}

pub async fn create(
	ctx: AuthContext,
	args: Result<Json<CreateThingArgs>, JsonRejection>,
) -> WebResult<CreatedThing, ApiError> {
	let Json(args) = args?;
	let id = handlers::thing::create(&ctx, args).await?;

	Ok(WebSuccess::new(StatusCode::CREATED, CreatedThing { id }))
}

pub async fn update(
	ctx: AuthContext,
	Path(id): Path<String>,
	args: Result<Json<UpdateThingArgs>, JsonRejection>,
) -> WebResult<&'static str, ApiError> {
	let Json(args) = args?;
	handlers::thing::update(&ctx, &id, args).await?;

	Ok("updated thing".into())
}

pub async fn remove(ctx: AuthContext, Path(id): Path<String>) -> WebResult<&'static str, ApiError> {
	handlers::thing::remove(&ctx, &id).await?;

	Ok("removed thing".into())
}
