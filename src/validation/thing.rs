use garde::Validate;
use serde::Deserialize;

use crate::db::model::{Patch, StorageId, ThingPatch};

use super::{check_length, length_message, range_message, IntoValid, ValidationErrors};

// keep in line with the garde attributes below
const TITLE_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 2000;

const INVALID_IMAGE_ID: &str = "Invalid image id";

fn parse_image_id(raw: &str) -> garde::Result {
	match raw.parse::<StorageId>() {
		Ok(_) => Ok(()),
		Err(_) => Err(garde::Error::new(INVALID_IMAGE_ID)),
	}
}

fn image_id(value: &Option<String>, _: &()) -> garde::Result {
	value.as_deref().map_or(Ok(()), parse_image_id)
}

fn image_id_patch(value: &Patch<String>, _: &()) -> garde::Result {
	value.as_set().map_or(Ok(()), |raw| parse_image_id(raw))
}

fn title_patch(value: &Patch<String>, _: &()) -> garde::Result {
	match value {
		Patch::Unset => Ok(()),
		// a thing always has a title
		Patch::Clear => Err(garde::Error::new("Title is required")),
		Patch::Set(t) => check_length("Title", t, 1, TITLE_MAX),
	}
}

fn description_patch(value: &Patch<String>, _: &()) -> garde::Result {
	value
		.as_set()
		.map_or(Ok(()), |d| check_length("Description", d, 0, DESCRIPTION_MAX))
}

fn passthrough(_: &'static str, error: &garde::Error) -> String {
	error.message().to_string()
}

#[derive(Deserialize, Validate, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateThingArgs {
	#[serde(default)]
	#[garde(length(chars, min = 1, max = 200))]
	pub title: String,
	#[serde(default)]
	#[garde(length(chars, max = 2000))]
	pub description: Option<String>,
	#[serde(default)]
	#[garde(custom(self::image_id))]
	pub image_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCreateThing {
	pub title: String,
	pub description: Option<String>,
	pub image_id: Option<StorageId>,
}

impl IntoValid for CreateThingArgs {
	type Valid = ValidCreateThing;

	fn into_valid(self) -> Result<ValidCreateThing, ValidationErrors> {
		if let Err(report) = self.validate() {
			return Err(ValidationErrors::from_report(
				&report,
				&["title", "description", "imageId"],
				|field, error| match field {
					"title" => length_message("Title", &self.title, 1, TITLE_MAX),
					"description" => length_message(
						"Description",
						self.description.as_deref().unwrap_or_default(),
						0,
						DESCRIPTION_MAX,
					),
					_ => passthrough(field, error),
				},
			));
		}

		Ok(ValidCreateThing {
			title: self.title,
			description: self.description,
			image_id: self.image_id.and_then(|raw| raw.parse().ok()),
		})
	}
}

/// Omitted fields stay untouched, `null` clears `description` and `imageId`.
/// The title can be replaced but not cleared.
#[derive(Deserialize, Validate, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateThingArgs {
	#[serde(default)]
	#[garde(custom(title_patch))]
	pub title: Patch<String>,
	#[serde(default)]
	#[garde(custom(description_patch))]
	pub description: Patch<String>,
	#[serde(default)]
	#[garde(custom(image_id_patch))]
	pub image_id: Patch<String>,
}

impl IntoValid for UpdateThingArgs {
	type Valid = ThingPatch;

	fn into_valid(self) -> Result<ThingPatch, ValidationErrors> {
		if let Err(report) = self.validate() {
			return Err(ValidationErrors::from_report(
				&report,
				&["title", "description", "imageId"],
				passthrough,
			));
		}

		let image_id = match self.image_id {
			Patch::Unset => Patch::Unset,
			Patch::Clear => Patch::Clear,
			Patch::Set(raw) => raw.parse().map_or(Patch::Unset, Patch::Set),
		};

		Ok(ThingPatch {
			title: self.title.as_set().cloned(),
			description: self.description,
			image_id,
		})
	}
}

#[derive(Deserialize, Validate, Debug, Clone, Copy, Default)]
pub struct ListArgs {
	#[garde(range(min = 1, max = 100))]
	pub limit: Option<i64>,
}

impl IntoValid for ListArgs {
	type Valid = Option<u32>;

	fn into_valid(self) -> Result<Option<u32>, ValidationErrors> {
		if let Err(report) = self.validate() {
			return Err(ValidationErrors::from_report(&report, &["limit"], |_, _| {
				range_message("Limit", 1, 100)
			}));
		}

		Ok(self.limit.and_then(|l| u32::try_from(l).ok()))
	}
}
