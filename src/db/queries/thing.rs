use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::UserId;
use crate::db::model::{NewThing, Patch, StorageId, Thing, ThingId, ThingPatch};
use crate::db::ThingStore;

#[derive(sqlx::FromRow)]
struct ThingRow {
	id: Uuid,
	user_id: String,
	title: String,
	description: Option<String>,
	image_id: Option<Uuid>,
	creation_time: DateTime<Utc>,
}

impl From<ThingRow> for Thing {
	fn from(r: ThingRow) -> Self {
		Thing {
			id: ThingId(r.id),
			user_id: r.user_id,
			title: r.title,
			description: r.description,
			image_id: r.image_id.map(StorageId),
			creation_time: r.creation_time,
		}
	}
}

pub struct PgThingStore {
	db: PgPool,
}

impl PgThingStore {
	pub fn new(db: PgPool) -> Self {
		Self { db }
	}
}

/// Splits a patch into "touch this column" and the value it gets.
fn patch_columns<T>(p: &Patch<T>) -> (bool, Option<&T>) {
	match p {
		Patch::Unset => (false, None),
		Patch::Clear => (true, None),
		Patch::Set(v) => (true, Some(v)),
	}
}

#[async_trait]
impl ThingStore for PgThingStore {
	async fn get(&self, id: ThingId) -> anyhow::Result<Option<Thing>> {
		let row = sqlx::query_as::<_, ThingRow>(
			"SELECT id, user_id, title, description, image_id, creation_time FROM things WHERE id = $1",
		)
		.bind(id.0)
		.fetch_optional(&self.db)
		.await?;

		Ok(row.map(Into::into))
	}

	async fn insert(&self, thing: NewThing) -> anyhow::Result<ThingId> {
		let id = ThingId::new();

		sqlx::query(
			"INSERT INTO things (id, user_id, title, description, image_id, creation_time) VALUES ($1, $2, $3, $4, $5, $6)",
		)
		.bind(id.0)
		.bind(thing.user_id.as_str())
		.bind(&thing.title)
		.bind(&thing.description)
		.bind(thing.image_id.map(|i| i.0))
		.bind(Utc::now())
		.execute(&self.db)
		.await?;

		Ok(id)
	}

	async fn patch(&self, id: ThingId, patch: &ThingPatch) -> anyhow::Result<()> {
		let (set_description, description) = patch_columns(&patch.description);
		let (set_image, image_id) = patch_columns(&patch.image_id);

		sqlx::query(
			r"UPDATE things SET
				title = COALESCE($2, title),
				description = CASE WHEN $3 THEN $4 ELSE description END,
				image_id = CASE WHEN $5 THEN $6 ELSE image_id END
			WHERE id = $1",
		)
		.bind(id.0)
		.bind(&patch.title)
		.bind(set_description)
		.bind(description)
		.bind(set_image)
		.bind(image_id.map(|i| i.0))
		.execute(&self.db)
		.await?;

		Ok(())
	}

	async fn delete(&self, id: ThingId) -> anyhow::Result<()> {
		sqlx::query("DELETE FROM things WHERE id = $1")
			.bind(id.0)
			.execute(&self.db)
			.await?;

		Ok(())
	}

	async fn list_by_owner(&self, u: &UserId, limit: Option<u32>) -> anyhow::Result<Vec<Thing>> {
		// LIMIT NULL is no limit
		let rows = sqlx::query_as::<_, ThingRow>(
			"SELECT id, user_id, title, description, image_id, creation_time FROM things WHERE user_id = $1 ORDER BY creation_time DESC, id DESC LIMIT $2",
		)
		.bind(u.as_str())
		.bind(limit.map(i64::from))
		.fetch_all(&self.db)
		.await?;

		Ok(rows.into_iter().map(Into::into).collect())
	}

	async fn ping(&self) -> anyhow::Result<()> {
		sqlx::query("SELECT 1").execute(&self.db).await?;

		Ok(())
	}
}
