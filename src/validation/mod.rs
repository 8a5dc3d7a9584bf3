//! Input validation.
//!
//! Rules are declared with `garde` on the argument structs. A failed
//! [`garde::Report`] is turned into [`ValidationErrors`], which list every
//! violation in the order the fields are declared.

use std::fmt;

use serde::Serialize;

pub mod thing;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
	pub field: &'static str,
	pub message: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
	pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
		self.0.push(FieldError {
			field,
			message: message.into(),
		});
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// The message shown to users, when only one can be shown.
	pub fn first_message(&self) -> Option<&str> {
		self.0.first().map(|e| e.message.as_str())
	}

	#[cfg(test)]
	pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
		self.0.iter().filter(move |e| e.field == field)
	}

	/// Converts a garde report.
	///
	/// `fields` lists the wire names in declaration order, errors are sorted
	/// by it. `describe` phrases the error reported for a field.
	pub fn from_report(
		report: &garde::Report,
		fields: &[&'static str],
		describe: impl Fn(&'static str, &garde::Error) -> String,
	) -> Self {
		let mut errors: Vec<(usize, FieldError)> = report
			.iter()
			.map(|(path, error)| {
				let path = wire_name(&path.to_string());
				let (pos, field) = fields
					.iter()
					.enumerate()
					.find(|(_, f)| **f == path)
					.map_or((fields.len(), "value"), |(i, f)| (i, *f));

				(
					pos,
					FieldError {
						field,
						message: describe(field, error),
					},
				)
			})
			.collect();

		errors.sort_by_key(|(pos, _)| *pos);

		Self(errors.into_iter().map(|(_, e)| e).collect())
	}
}

/// `image_id` -> `imageId`
fn wire_name(path: &str) -> String {
	let mut out = String::with_capacity(path.len());
	let mut upper = false;

	for c in path.chars() {
		if c == '_' {
			upper = true;
		} else if upper {
			out.extend(c.to_uppercase());
			upper = false;
		} else {
			out.push(c);
		}
	}

	out
}

impl fmt::Display for ValidationErrors {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.first_message().unwrap_or("invalid input"))
	}
}

impl std::error::Error for ValidationErrors {}

/// Turns raw arguments into their validated form.
pub trait IntoValid {
	type Valid;

	fn into_valid(self) -> Result<Self::Valid, ValidationErrors>;
}

/// How a violated length rule is shown to users. Lengths are in characters.
pub fn length_message(label: &str, value: &str, min: usize, max: usize) -> String {
	let len = value.chars().count();

	if min == 1 && len == 0 {
		format!("{label} is required")
	} else if len < min {
		format!("{label} must be at least {min} characters")
	} else {
		format!("{label} must be at most {max} characters")
	}
}

/// Length check for values garde's `length` rule can't see, e.g. inside a patch.
pub fn check_length(label: &str, value: &str, min: usize, max: usize) -> garde::Result {
	let len = value.chars().count();

	if len < min || len > max {
		return Err(garde::Error::new(length_message(label, value, min, max)));
	}

	Ok(())
}

pub fn range_message(label: &str, min: i64, max: i64) -> String {
	format!("{label} must be between {min} and {max}")
}
