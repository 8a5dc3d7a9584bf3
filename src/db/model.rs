use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::auth::UserId;

macro_rules! opaque_id {
	($name:ident) => {
		#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
		#[serde(transparent)]
		pub struct $name(pub Uuid);

		impl $name {
			pub fn new() -> Self {
				Self(Uuid::new_v4())
			}
		}

		impl FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Uuid::parse_str(s).map(Self)
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				self.0.fmt(f)
			}
		}
	};
}

opaque_id!(ThingId);
opaque_id!(StorageId);

/// Field update in a partial patch.
///
/// Deserializes a missing field as `Unset` (needs `#[serde(default)]` on the
/// field), `null` as `Clear` and anything else as `Set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
	Unset,
	Clear,
	Set(T),
}

impl<T> Patch<T> {
	pub fn as_set(&self) -> Option<&T> {
		match self {
			Patch::Set(v) => Some(v),
			_ => None,
		}
	}
}

impl<T> Default for Patch<T> {
	fn default() -> Self {
		Patch::Unset
	}
}

impl<T: Clone> Patch<T> {
	pub fn apply(&self, target: &mut Option<T>) {
		match self {
			Patch::Unset => (),
			Patch::Clear => *target = None,
			Patch::Set(v) => *target = Some(v.clone()),
		}
	}
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		Ok(match Option::<T>::deserialize(deserializer)? {
			Some(v) => Patch::Set(v),
			None => Patch::Clear,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thing {
	pub id: ThingId,
	pub user_id: String,
	pub title: String,
	pub description: Option<String>,
	pub image_id: Option<StorageId>,
	pub creation_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewThing {
	pub user_id: UserId,
	pub title: String,
	pub description: Option<String>,
	pub image_id: Option<StorageId>,
}

/// Partial update of a [`Thing`]. `user_id` is deliberately not patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThingPatch {
	pub title: Option<String>,
	pub description: Patch<String>,
	pub image_id: Patch<StorageId>,
}

impl ThingPatch {
	pub fn apply(&self, thing: &mut Thing) {
		if let Some(title) = &self.title {
			thing.title.clone_from(title);
		}
		self.description.apply(&mut thing.description);
		self.image_id.apply(&mut thing.image_id);
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebThing {
	pub id: ThingId,
	pub user_id: String,
	pub title: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub image_id: Option<StorageId>,
	pub image_url: Option<url::Url>,
	#[serde(with = "chrono::serde::ts_milliseconds")]
	pub creation_time: DateTime<Utc>,
}

pub fn convert_thing(t: Thing, image_url: Option<url::Url>) -> WebThing {
	WebThing {
		id: t.id,
		user_id: t.user_id,
		title: t.title,
		description: t.description,
		image_id: t.image_id,
		image_url,
		creation_time: t.creation_time,
	}
}

#[derive(Debug, Clone)]
pub struct Blob {
	pub content_type: Option<String>,
	pub data: Vec<u8>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrl {
	pub url: url::Url,
	#[serde(with = "chrono::serde::ts_milliseconds")]
	pub expires_at: DateTime<Utc>,
}

pub trait HasUserId {
	fn user_id(&self) -> &str;
	fn identifier(&self) -> String;
}

impl HasUserId for Thing {
	fn user_id(&self) -> &str {
		&self.user_id
	}

	fn identifier(&self) -> String {
		format!("thing: {}", self.id)
	}
}
