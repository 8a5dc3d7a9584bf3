use std::env::VarError;

use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::fmt::format::{json, FmtSpan, JsonFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "things-backend";
const DEFAULT_FILTER: &str = "info,tower_http=debug";

/// Output format, selected with the `LOGGING` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
	Basic,
	Json,
	Bunyan,
}

impl LogFormat {
	/// Unknown or missing values fall back to [`LogFormat::Basic`], the
	/// rejected value is returned so it can be reported once logging is up.
	pub fn from_env_value(value: Result<String, VarError>) -> (Self, Option<String>) {
		match value.as_deref() {
			Ok("basic") | Err(VarError::NotPresent) => (Self::Basic, None),
			Ok("json") => (Self::Json, None),
			Ok("bunyan") => (Self::Bunyan, None),
			Ok(v) => (Self::Basic, Some(v.to_owned())),
			Err(VarError::NotUnicode(v)) => (Self::Basic, Some(v.to_string_lossy().into_owned())),
		}
	}
}

fn env_filter() -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Installs the global subscriber. Reports, but survives, a second install.
pub fn init(format: LogFormat) {
	let installed = match format {
		LogFormat::Basic => tracing_subscriber::fmt()
			.with_env_filter(env_filter())
			.with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
			.try_init(),
		LogFormat::Json => tracing_subscriber::fmt()
			.with_env_filter(env_filter())
			.with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
			.event_format(
				json()
					.flatten_event(true)
					.with_current_span(true)
					.with_span_list(true),
			)
			.fmt_fields(JsonFields::new())
			.try_init(),
		LogFormat::Bunyan => tracing_subscriber::registry()
			.with(env_filter())
			.with(JsonStorageLayer)
			.with(BunyanFormattingLayer::new(
				SERVICE_NAME.into(),
				std::io::stdout,
			))
			.try_init()
			.map_err(Into::into),
	};

	if let Err(e) = installed {
		println!("WARN: unable to install {format:?} log subscriber: {e}");
	}
}

/// Reads `LOGGING` and installs the matching subscriber.
pub fn init_from_env() {
	let (format, rejected) = LogFormat::from_env_value(std::env::var("LOGGING"));

	init(format);

	if let Some(v) = rejected {
		tracing::warn!(v, "unknown value for LOGGING env var, using basic formatter");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn known_formats() {
		for (raw, format) in [
			("basic", LogFormat::Basic),
			("json", LogFormat::Json),
			("bunyan", LogFormat::Bunyan),
		] {
			assert_eq!(LogFormat::from_env_value(Ok(raw.into())), (format, None));
		}
	}

	#[test]
	fn missing_means_basic() {
		assert_eq!(
			LogFormat::from_env_value(Err(VarError::NotPresent)),
			(LogFormat::Basic, None)
		);
	}

	#[test]
	fn unknown_falls_back_and_is_reported() {
		assert_eq!(
			LogFormat::from_env_value(Ok("pretty".into())),
			(LogFormat::Basic, Some("pretty".into()))
		);
	}
}
