use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::{info, warn};
use url::Url;

use crate::auth::UserId;
use crate::configuration::Config;

use self::model::{Blob, NewThing, StorageId, Thing, ThingId, ThingPatch, UploadUrl};

pub mod memory;
pub mod model;
pub mod queries;

/// Persisted things. Ownership is enforced by the callers, not here.
#[async_trait]
pub trait ThingStore: Send + Sync {
	async fn get(&self, id: ThingId) -> anyhow::Result<Option<Thing>>;
	/// Assigns id and creation time.
	async fn insert(&self, thing: NewThing) -> anyhow::Result<ThingId>;
	async fn patch(&self, id: ThingId, patch: &ThingPatch) -> anyhow::Result<()>;
	async fn delete(&self, id: ThingId) -> anyhow::Result<()>;
	/// Newest first.
	async fn list_by_owner(&self, u: &UserId, limit: Option<u32>) -> anyhow::Result<Vec<Thing>>;
	async fn ping(&self) -> anyhow::Result<()>;
}

/// Binary objects referenced by things.
#[async_trait]
pub trait BlobStore: Send + Sync {
	/// Short lived url, which accepts exactly one upload. The blob stored
	/// through it belongs to `owner`.
	async fn generate_upload_url(&self, owner: &UserId) -> anyhow::Result<UploadUrl>;
	/// Consumes the upload token. `None` if the token is unknown, used or expired.
	async fn store_upload(
		&self,
		token: &str,
		content_type: Option<String>,
		data: Vec<u8>,
	) -> anyhow::Result<Option<StorageId>>;
	/// `None` if no such blob exists.
	async fn get_url(&self, id: StorageId) -> anyhow::Result<Option<Url>>;
	async fn fetch(&self, id: StorageId) -> anyhow::Result<Option<Blob>>;
	/// `false` for missing blobs as well.
	async fn is_owned_by(&self, id: StorageId, owner: &UserId) -> anyhow::Result<bool>;
	/// Deleting a blob, which doesn't exist is not an error.
	async fn delete(&self, id: StorageId) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct Stores {
	pub things: Arc<dyn ThingStore>,
	pub blobs: Arc<dyn BlobStore>,
}

/// Public url of a stored blob.
pub fn blob_url(public_url: &Url, id: StorageId) -> anyhow::Result<Url> {
	public_url
		.join(&format!("storage/{id}"))
		.context("unable to build blob url")
}

/// Public url an upload token can be redeemed at.
pub fn upload_url(public_url: &Url, token: &str) -> anyhow::Result<Url> {
	public_url
		.join(&format!("storage/upload/{token}"))
		.context("unable to build upload url")
}

pub async fn get_pool(uri: &str) -> anyhow::Result<PgPool> {
	let pg_options = uri
		.parse::<PgConnectOptions>()
		.context("Invalid database URI")?
		.application_name("things_backend");

	let pool_options = PgPoolOptions::new()
		.max_connections(5)
		.min_connections(1)
		.max_lifetime(Duration::from_secs(3600))
		.acquire_timeout(Duration::from_secs(30));

	let pool = pool_options
		.connect_with(pg_options)
		.await
		.context("Could not connect to db")?;

	sqlx::migrate!()
		.run(&pool)
		.await
		.context("Couldn't complete migrations")?;

	Ok(pool)
}

pub async fn connect(cfg: &Config) -> anyhow::Result<Stores> {
	let ttl = cfg.storage.upload_url_ttl();

	match &cfg.database {
		Some(db) => {
			let pool = get_pool(db.uri.expose_secret()).await?;
			info!("using postgres storage");

			Ok(Stores {
				things: Arc::new(queries::thing::PgThingStore::new(pool.clone())),
				blobs: Arc::new(queries::storage::PgBlobStore::new(
					pool,
					cfg.public_url.clone(),
					ttl,
				)),
			})
		}
		None => {
			warn!("no database configured, data will not survive a restart");

			Ok(Stores {
				things: Arc::new(memory::MemoryThingStore::default()),
				blobs: Arc::new(memory::MemoryBlobStore::new(cfg.public_url.clone(), ttl)),
			})
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn urls_are_relative_to_public_url() {
		let base = Url::parse("https://things.example.com/api/").unwrap();
		let id = StorageId::new();

		assert_eq!(
			blob_url(&base, id).unwrap().as_str(),
			format!("https://things.example.com/api/storage/{id}")
		);
		assert_eq!(
			upload_url(&base, "abc").unwrap().as_str(),
			"https://things.example.com/api/storage/upload/abc"
		);
	}
}
