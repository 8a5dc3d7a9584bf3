//! In-process stores, used when no database is configured and in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use url::Url;

use crate::auth::UserId;
use crate::db::model::{Blob, NewThing, StorageId, Thing, ThingId, ThingPatch, UploadUrl};
use crate::db::{blob_url, upload_url, BlobStore, ThingStore};
use crate::util::random_token;

#[derive(Default)]
struct Things {
	next_seq: u64,
	// seq gives a total insertion order, creation times may collide
	rows: HashMap<ThingId, (u64, Thing)>,
}

#[derive(Default)]
pub struct MemoryThingStore {
	inner: RwLock<Things>,
}

#[async_trait]
impl ThingStore for MemoryThingStore {
	async fn get(&self, id: ThingId) -> anyhow::Result<Option<Thing>> {
		Ok(self.inner.read().await.rows.get(&id).map(|(_, t)| t.clone()))
	}

	async fn insert(&self, thing: NewThing) -> anyhow::Result<ThingId> {
		let id = ThingId::new();
		let mut inner = self.inner.write().await;

		let seq = inner.next_seq;
		inner.next_seq += 1;

		inner.rows.insert(
			id,
			(
				seq,
				Thing {
					id,
					user_id: thing.user_id.0,
					title: thing.title,
					description: thing.description,
					image_id: thing.image_id,
					creation_time: Utc::now(),
				},
			),
		);

		Ok(id)
	}

	async fn patch(&self, id: ThingId, patch: &ThingPatch) -> anyhow::Result<()> {
		if let Some((_, t)) = self.inner.write().await.rows.get_mut(&id) {
			patch.apply(t);
		}

		Ok(())
	}

	async fn delete(&self, id: ThingId) -> anyhow::Result<()> {
		self.inner.write().await.rows.remove(&id);

		Ok(())
	}

	async fn list_by_owner(&self, u: &UserId, limit: Option<u32>) -> anyhow::Result<Vec<Thing>> {
		let inner = self.inner.read().await;

		let mut owned: Vec<_> = inner
			.rows
			.values()
			.filter(|(_, t)| t.user_id == u.as_str())
			.collect();

		owned.sort_unstable_by(|a, b| b.0.cmp(&a.0));

		let limit = limit.map_or(usize::MAX, |l| l as usize);

		Ok(owned
			.into_iter()
			.take(limit)
			.map(|(_, t)| t.clone())
			.collect())
	}

	async fn ping(&self) -> anyhow::Result<()> {
		Ok(())
	}
}

struct StoredBlob {
	owner: String,
	blob: Blob,
}

struct UploadToken {
	owner: String,
	expires: DateTime<Utc>,
}

pub struct MemoryBlobStore {
	public_url: Url,
	ttl: chrono::Duration,
	blobs: RwLock<HashMap<StorageId, StoredBlob>>,
	tokens: RwLock<HashMap<String, UploadToken>>,
}

impl MemoryBlobStore {
	pub fn new(public_url: Url, ttl: chrono::Duration) -> Self {
		Self {
			public_url,
			ttl,
			blobs: RwLock::default(),
			tokens: RwLock::default(),
		}
	}

	/// Stores a blob without going through an upload url.
	#[cfg(test)]
	pub async fn put(&self, owner: &UserId, data: &[u8]) -> StorageId {
		let id = StorageId::new();
		self.blobs.write().await.insert(
			id,
			StoredBlob {
				owner: owner.0.clone(),
				blob: Blob {
					content_type: None,
					data: data.to_vec(),
				},
			},
		);
		id
	}

	#[cfg(test)]
	pub async fn contains(&self, id: StorageId) -> bool {
		self.blobs.read().await.contains_key(&id)
	}
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
	async fn generate_upload_url(&self, owner: &UserId) -> anyhow::Result<UploadUrl> {
		let token = random_token();
		let now = Utc::now();
		let expires_at = now + self.ttl;

		let mut tokens = self.tokens.write().await;
		tokens.retain(|_, t| t.expires > now);
		tokens.insert(
			token.clone(),
			UploadToken {
				owner: owner.0.clone(),
				expires: expires_at,
			},
		);

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
		let Some(upload) = self.tokens.write().await.remove(token) else {
			return Ok(None);
		};

		if upload.expires <= Utc::now() {
			return Ok(None);
		}

		let id = StorageId::new();
		self.blobs.write().await.insert(
			id,
			StoredBlob {
				owner: upload.owner,
				blob: Blob { content_type, data },
			},
		);

		Ok(Some(id))
	}

	async fn get_url(&self, id: StorageId) -> anyhow::Result<Option<Url>> {
		if !self.blobs.read().await.contains_key(&id) {
			return Ok(None);
		}

		Ok(Some(blob_url(&self.public_url, id)?))
	}

	async fn fetch(&self, id: StorageId) -> anyhow::Result<Option<Blob>> {
		Ok(self.blobs.read().await.get(&id).map(|s| s.blob.clone()))
	}

	async fn is_owned_by(&self, id: StorageId, owner: &UserId) -> anyhow::Result<bool> {
		Ok(self
			.blobs
			.read()
			.await
			.get(&id)
			.is_some_and(|s| s.owner == owner.as_str()))
	}

	async fn delete(&self, id: StorageId) -> anyhow::Result<()> {
		self.blobs.write().await.remove(&id);

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn new_thing(u: &str, title: &str) -> NewThing {
		NewThing {
			user_id: UserId(u.into()),
			title: title.into(),
			description: None,
			image_id: None,
		}
	}

	fn blobs(ttl: chrono::Duration) -> MemoryBlobStore {
		MemoryBlobStore::new(Url::parse("http://localhost:8080/").unwrap(), ttl)
	}

	fn owner() -> UserId {
		UserId("u1".into())
	}

	fn token_of(u: &UploadUrl) -> String {
		u.url.path_segments().unwrap().last().unwrap().to_owned()
	}

	#[tokio::test]
	async fn list_is_newest_first_and_limited() {
		let store = MemoryThingStore::default();
		for title in ["a", "b", "c"] {
			store.insert(new_thing("u1", title)).await.unwrap();
		}
		store.insert(new_thing("u2", "other")).await.unwrap();

		let all = store.list_by_owner(&UserId("u1".into()), None).await.unwrap();
		let titles: Vec<_> = all.iter().map(|t| t.title.as_str()).collect();
		assert_eq!(titles, ["c", "b", "a"]);

		let two = store
			.list_by_owner(&UserId("u1".into()), Some(2))
			.await
			.unwrap();
		assert_eq!(two.len(), 2);
		assert_eq!(two[0].title, "c");
	}

	#[tokio::test]
	async fn patching_a_missing_thing_is_a_no_op() {
		let store = MemoryThingStore::default();

		store
			.patch(ThingId::new(), &ThingPatch::default())
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn upload_urls_are_write_once() {
		let store = blobs(chrono::Duration::minutes(5));
		let upload = store.generate_upload_url(&owner()).await.unwrap();
		let token = token_of(&upload);

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
		assert!(store.get_url(id).await.unwrap().is_some());
		assert!(store.is_owned_by(id, &owner()).await.unwrap());
		assert!(!store
			.is_owned_by(id, &UserId("u2".into()))
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn expired_upload_urls_are_refused() {
		let store = blobs(chrono::Duration::seconds(-1));
		let upload = store.generate_upload_url(&owner()).await.unwrap();

		assert!(store
			.store_upload(&token_of(&upload), None, vec![1])
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn deleted_blobs_have_no_url() {
		let store = blobs(chrono::Duration::minutes(5));
		let id = store.put(&owner(), b"img").await;

		store.delete(id).await.unwrap();
		// deleting twice is fine
		store.delete(id).await.unwrap();

		assert!(store.get_url(id).await.unwrap().is_none());
	}
}
