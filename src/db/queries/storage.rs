use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::auth::UserId;
use crate::db::model::{Blob, StorageId, UploadUrl};
use crate::db::{blob_url, upload_url, BlobStore};
use crate::util::random_token;

#[derive(sqlx::FromRow)]
struct BlobRow {
	content_type: Option<String>,
	data: Vec<u8>,
}

pub struct PgBlobStore {
	db: PgPool,
	public_url: Url,
	ttl: chrono::Duration,
}

impl PgBlobStore {
	pub fn new(db: PgPool, public_url: Url, ttl: chrono::Duration) -> Self {
		Self { db, public_url, ttl }
	}

	async fn delete_expired_tokens(&self) -> anyhow::Result<()> {
		sqlx::query("DELETE FROM upload_tokens WHERE expires < NOW()")
			.execute(&self.db)
			.await?;

		Ok(())
	}
}

#[async_trait]
impl BlobStore for PgBlobStore {
	async fn generate_upload_url(&self, owner: &UserId) -> anyhow::Result<UploadUrl> {
		self.delete_expired_tokens().await?;

		let token = random_token();
		let expires_at = Utc::now() + self.ttl;

		sqlx::query("INSERT INTO upload_tokens (token, owner, expires) VALUES ($1, $2, $3)")
			.bind(&token)
			.bind(owner.as_str())
			.bind(expires_at)
			.execute(&self.db)
			.await?;

		Ok(UploadUrl {
			url: upload_url(&self.public_url, &token)?,
			expires_at,
		})
	}

	async fn store_upload(
		&self,
		token: &str,
		content_type: Option<String>,
		data: Vec<u8>,
	) -> anyhow::Result<Option<StorageId>> {
		let mut tx = self.db.begin().await?;

		let owner: Option<(String,)> = sqlx::query_as(
			"DELETE FROM upload_tokens WHERE token = $1 AND expires > NOW() RETURNING owner",
		)
		.bind(token)
		.fetch_optional(&mut *tx)
		.await?;

		let Some((owner,)) = owner else {
			debug!("upload token unknown, used or expired");
			return Ok(None);
		};

		let id = StorageId::new();

		sqlx::query("INSERT INTO blobs (id, owner, content_type, data) VALUES ($1, $2, $3, $4)")
			.bind(id.0)
			.bind(owner)
			.bind(content_type)
			.bind(data)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;

		Ok(Some(id))
	}

	async fn get_url(&self, id: StorageId) -> anyhow::Result<Option<Url>> {
		let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM blobs WHERE id = $1")
			.bind(id.0)
			.fetch_optional(&self.db)
			.await?;

		match exists {
			Some(_) => Ok(Some(blob_url(&self.public_url, id)?)),
			None => Ok(None),
		}
	}

	async fn fetch(&self, id: StorageId) -> anyhow::Result<Option<Blob>> {
		let row = sqlx::query_as::<_, BlobRow>(
			"SELECT content_type, data FROM blobs WHERE id = $1",
		)
		.bind(id.0)
		.fetch_optional(&self.db)
		.await?;

		Ok(row.map(|r| Blob {
			content_type: r.content_type,
			data: r.data,
		}))
	}

	async fn is_owned_by(&self, id: StorageId, owner: &UserId) -> anyhow::Result<bool> {
		let found: Option<(Uuid,)> =
			sqlx::query_as("SELECT id FROM blobs WHERE id = $1 AND owner = $2")
				.bind(id.0)
				.bind(owner.as_str())
				.fetch_optional(&self.db)
				.await?;

		Ok(found.is_some())
	}

	async fn delete(&self, id: StorageId) -> anyhow::Result<()> {
		sqlx::query("DELETE FROM blobs WHERE id = $1")
			.bind(id.0)
			.execute(&self.db)
			.await?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn store(pool: PgPool, ttl: chrono::Duration) -> PgBlobStore {
		PgBlobStore::new(pool, Url::parse("http://localhost:8080/").unwrap(), ttl)
	}

	fn token_of(u: &UploadUrl) -> String {
		u.url.path_segments().unwrap().last().unwrap().to_owned()
	}

	#[sqlx::test]
	#[ignore = "needs DATABASE_URL pointing at a postgres server"]
	async fn upload_tokens_are_redeemed_once(pool: PgPool) {
		let store = store(pool, chrono::Duration::minutes(5));
		let owner = UserId("u1".into());
		let token = token_of(&store.generate_upload_url(&owner).await.unwrap());

		let id = store
			.store_upload(&token, Some("image/png".into()), vec![1, 2, 3])
			.await
			.unwrap()
			.unwrap();

		assert!(store
			.store_upload(&token, None, vec![4])
			.await
			.unwrap()
			.is_none());

		let blob = store.fetch(id).await.unwrap().unwrap();
		assert_eq!(blob.data, [1, 2, 3]);
		assert_eq!(blob.content_type.as_deref(), Some("image/png"));

		assert!(store.is_owned_by(id, &owner).await.unwrap());
		assert!(!store.is_owned_by(id, &UserId("u2".into())).await.unwrap());

		store.delete(id).await.unwrap();
		store.delete(id).await.unwrap();
		assert!(store.get_url(id).await.unwrap().is_none());
	}

	#[sqlx::test]
	#[ignore = "needs DATABASE_URL pointing at a postgres server"]
	async fn expired_tokens_are_refused(pool: PgPool) {
		let store = store(pool, chrono::Duration::seconds(-1));
		let token = token_of(
			&store
				.generate_upload_url(&UserId("u1".into()))
				.await
				.unwrap(),
		);

		assert!(store
			.store_upload(&token, None, vec![1])
			.await
			.unwrap()
			.is_none());
	}
}
