use futures_util::future::try_join_all;
use tracing::{debug, info};
use url::Url;

use crate::api::auth::AuthContext;
use crate::db::model::{convert_thing, NewThing, Patch, StorageId, Thing, ThingId, WebThing};
use crate::validation::thing::{CreateThingArgs, ListArgs, UpdateThingArgs};
use crate::validation::{IntoValid, ValidationErrors};

use super::{check_object_belong_to_userid, HandlerError};

async fn image_url(ctx: &AuthContext, image_id: Option<StorageId>) -> anyhow::Result<Option<Url>> {
	match image_id {
		Some(id) => ctx.blobs.get_url(id).await,
		None => Ok(None),
	}
}

/// Only whoever uploaded an image may attach it. Missing images fail the same way.
async fn check_image_owner(ctx: &AuthContext, image: StorageId) -> Result<(), HandlerError> {
	if ctx.blobs.is_owned_by(image, &ctx.user_id).await? {
		return Ok(());
	}

	debug!(%image, user=%ctx.user_id, "refusing foreign or missing image");

	let mut errors = ValidationErrors::default();
	errors.push("imageId", "Invalid image id");
	Err(errors.into())
}

/// The thing behind `id`, if it exists and belongs to the caller.
async fn get_owned(ctx: &AuthContext, id: &str) -> anyhow::Result<Option<Thing>> {
	let Ok(id) = id.parse::<ThingId>() else {
		debug!(id, "malformed thing id");
		return Ok(None);
	};

	Ok(ctx
		.things
		.get(id)
		.await?
		.filter(|t| t.user_id == ctx.user_id.as_str()))
}

pub async fn list(ctx: &AuthContext, args: ListArgs) -> Result<Vec<WebThing>, HandlerError> {
	let limit = args.into_valid()?;

	let things = ctx.things.list_by_owner(&ctx.user_id, limit).await?;

	check_object_belong_to_userid(things.iter(), &ctx.user_id)?;

	let urls = try_join_all(things.iter().map(|t| image_url(ctx, t.image_id))).await?;

	Ok(things
		.into_iter()
		.zip(urls)
		.map(|(t, url)| convert_thing(t, url))
		.collect())
}

/// `None` for things, which don't exist or belong to someone else.
pub async fn get(ctx: &AuthContext, id: &str) -> Result<Option<WebThing>, HandlerError> {
	let Some(thing) = get_owned(ctx, id).await? else {
		return Ok(None);
	};

	let url = image_url(ctx, thing.image_id).await?;

	Ok(Some(convert_thing(thing, url)))
}

pub async fn create(ctx: &AuthContext, args: CreateThingArgs) -> Result<ThingId, HandlerError> {
	let valid = args.into_valid()?;

	if let Some(image) = valid.image_id {
		check_image_owner(ctx, image).await?;
	}

	let id = ctx
		.things
		.insert(NewThing {
			user_id: ctx.user_id.clone(),
			title: valid.title,
			description: valid.description,
			image_id: valid.image_id,
		})
		.await?;

	info!(thing=%id, user=%ctx.user_id, "created thing");

	Ok(id)
}

pub async fn update(ctx: &AuthContext, id: &str, args: UpdateThingArgs) -> Result<(), HandlerError> {
	let patch = args.into_valid()?;

	let Some(thing) = get_owned(ctx, id).await? else {
		return Err(HandlerError::NotFoundOrUnauthorized);
	};

	if let Patch::Set(new) = patch.image_id {
		if thing.image_id != Some(new) {
			check_image_owner(ctx, new).await?;
		}
	}

	// The old image is gone before the patch lands. If the patch fails the
	// record keeps pointing at a deleted blob, nothing compensates for that.
	if let (Patch::Set(new), Some(old)) = (&patch.image_id, thing.image_id) {
		if *new != old {
			debug!(thing=%thing.id, image=%old, "releasing replaced image");
			ctx.blobs.delete(old).await?;
		}
	}

	ctx.things.patch(thing.id, &patch).await?;

	Ok(())
}

pub async fn remove(ctx: &AuthContext, id: &str) -> Result<(), HandlerError> {
	let Some(thing) = get_owned(ctx, id).await? else {
		return Err(HandlerError::NotFoundOrUnauthorized);
	};

	if let Some(image) = thing.image_id {
		ctx.blobs.delete(image).await?;
	}

	ctx.things.delete(thing.id).await?;

	info!(thing=%thing.id, user=%ctx.user_id, "removed thing");

	Ok(())
}
