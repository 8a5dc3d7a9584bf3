use std::net::SocketAddr;
use std::time::Duration;

use garde::Validate;
use secrecy::SecretString;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
	pub database: Option<DatabaseConfig>,
	pub auth: Authorization,
	pub hosturl: SocketAddr,
	/// Externally reachable base url, used to build upload and image urls.
	pub public_url: url::Url,
	#[serde(default)]
	pub storage: StorageConfig,
	pub tls: Option<Tls>,
}

#[derive(Deserialize)]
pub struct DatabaseConfig {
	pub uri: SecretString,
}

#[derive(Deserialize)]
pub struct Authorization {
	/// Shared HS256 secret. Takes precedence over `jwks_domain`.
	pub secret: Option<SecretString>,
	pub jwks_domain: Option<url::Url>,
	pub audience: Option<String>,
	pub issuer: Option<String>,
	#[serde(default = "default_jwks_max_age")]
	pub jwks_max_age_secs: u64,
}

impl Authorization {
	pub fn jwks_max_age(&self) -> Duration {
		Duration::from_secs(self.jwks_max_age_secs)
	}
}

fn default_jwks_max_age() -> u64 {
	3600
}

/// Upload urls live at most a week.
#[derive(Deserialize, Validate)]
pub struct StorageConfig {
	#[serde(default = "default_upload_url_ttl")]
	#[garde(range(min = 1, max = 604_800))]
	pub upload_url_ttl_secs: u64,
	#[serde(default = "default_max_upload_bytes")]
	#[garde(range(min = 1))]
	pub max_upload_bytes: usize,
}

impl StorageConfig {
	pub fn upload_url_ttl(&self) -> chrono::Duration {
		chrono::Duration::seconds(i64::try_from(self.upload_url_ttl_secs).unwrap_or(i64::MAX))
	}
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			upload_url_ttl_secs: default_upload_url_ttl(),
			max_upload_bytes: default_max_upload_bytes(),
		}
	}
}

fn default_upload_url_ttl() -> u64 {
	3600
}

fn default_max_upload_bytes() -> usize {
	10 * 1024 * 1024
}

#[derive(Deserialize)]
pub struct Tls {
	pub certpath: String,
	pub keypath: String,
}

pub fn load() -> Result<Config, config::ConfigError> {
	let raw = config::Config::builder()
		.add_source(
			config::Environment::with_prefix("THINGS")
				.prefix_separator("_")
				.separator("__")
				.try_parsing(true),
		)
		.build()?;

	from_source(raw)
}

fn from_source(raw: config::Config) -> Result<Config, config::ConfigError> {
	let cfg: Config = raw.try_deserialize()?;

	cfg.storage
		.validate()
		.map_err(|report| config::ConfigError::Message(format!("invalid storage config: {report}")))?;

	Ok(cfg)
}
