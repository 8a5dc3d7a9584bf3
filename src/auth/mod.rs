use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::configuration::Authorization;

#[derive(thiserror::Error, Debug)]
pub enum AuthenticatorError {
	#[error("JWT is expired")]
	Expired,
	#[error("Invalid JWT")]
	Invalid(#[from] jsonwebtoken::errors::Error),
	#[error("Invalid claims")]
	Claims(&'static str),
	#[error("unable to fetch signing keys")]
	KeyFetch(#[source] anyhow::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// The authenticated caller, as asserted by the token issuer.
#[derive(Clone, Debug, Serialize)]
pub struct Identity {
	pub subject: String,
	pub issuer: Option<String>,
	pub name: Option<String>,
	pub email: Option<String>,
}

impl Identity {
	pub fn user_id(&self) -> UserId {
		match &self.issuer {
			Some(iss) => UserId(format!("{iss}:{}", self.subject)),
			None => UserId(self.subject.clone()),
		}
	}
}

/// Resolves the caller behind a bearer token.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
	async fn resolve(&self, token: &str) -> Result<Identity, AuthenticatorError>;
}

#[derive(Deserialize)]
struct Claims {
	sub: String,
	iss: Option<String>,
	name: Option<String>,
	email: Option<String>,
}

enum KeySource {
	Secret(DecodingKey),
	Jwks {
		url: Url,
		cached: RwLock<(JwkSet, Instant)>,
		max_age: Duration,
	},
}

pub struct Authenticator {
	keys: KeySource,
	audience: Option<String>,
	issuer: Option<String>,
}

impl Authenticator {
	pub async fn from_config(cfg: &Authorization) -> anyhow::Result<Self> {
		let keys = if let Some(secret) = &cfg.secret {
			KeySource::Secret(DecodingKey::from_secret(
				secret.expose_secret().as_bytes(),
			))
		} else if let Some(domain) = &cfg.jwks_domain {
			let url = get_jwks_url(domain)?;
			let jwks = fetch_keys(&url).await?;

			KeySource::Jwks {
				url,
				cached: RwLock::new((jwks, Instant::now())),
				max_age: cfg.jwks_max_age(),
			}
		} else {
			anyhow::bail!("either auth.secret or auth.jwks_domain has to be configured");
		};

		Ok(Self {
			keys,
			audience: cfg.audience.clone(),
			issuer: cfg.issuer.clone(),
		})
	}

	#[cfg(test)]
	pub fn with_secret(secret: &[u8], audience: Option<String>, issuer: Option<String>) -> Self {
		Self {
			keys: KeySource::Secret(DecodingKey::from_secret(secret)),
			audience,
			issuer,
		}
	}

	pub async fn force_refetch(&self) -> Result<(), AuthenticatorError> {
		let KeySource::Jwks { url, cached, .. } = &self.keys else {
			return Ok(());
		};

		let jwks = fetch_keys(url).await.map_err(AuthenticatorError::KeyFetch)?;
		*cached.write().await = (jwks, Instant::now());

		Ok(())
	}

	/// Refetches the key set if the cached one is older than the configured max age.
	/// Returns whether a refetch happened.
	pub async fn refetch(&self) -> Result<bool, AuthenticatorError> {
		let KeySource::Jwks { cached, max_age, .. } = &self.keys else {
			return Ok(false);
		};

		if cached.read().await.1.elapsed() < *max_age {
			return Ok(false);
		}

		self.force_refetch().await?;
		Ok(true)
	}

	pub async fn verify(&self, token: &str) -> Result<Identity, AuthenticatorError> {
		match self.inner_verify(token).await {
			Ok(t) => Ok(t),
			Err(err) if is_key_mismatch(&err) => {
				if self.refetch().await? {
					self.inner_verify(token).await
				} else {
					Err(err)
				}
			}
			Err(e) => Err(e),
		}
	}

	fn validation(&self, alg: Algorithm) -> Validation {
		let mut validation = Validation::new(alg);
		validation.set_required_spec_claims(&["exp", "sub"]);

		match &self.audience {
			Some(aud) => validation.set_audience(&[aud]),
			None => validation.validate_aud = false,
		}

		if let Some(iss) = &self.issuer {
			validation.set_issuer(&[iss]);
		}

		validation
	}

	async fn inner_verify(&self, token: &str) -> Result<Identity, AuthenticatorError> {
		let header = decode_header(token)?;

		let data = match &self.keys {
			KeySource::Secret(key) => {
				if !matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
					return Err(AuthenticatorError::Claims("unexpected algorithm"));
				}

				decode::<Claims>(token, key, &self.validation(header.alg))
			}
			KeySource::Jwks { cached, .. } => {
				if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
					return Err(AuthenticatorError::Claims("unexpected algorithm"));
				}

				let kid = header.kid.ok_or(AuthenticatorError::Claims("missing kid"))?;

				let key = {
					let cached_jwks_r = &cached.read().await.0;

					let jwk = cached_jwks_r
						.find(&kid)
						.ok_or(AuthenticatorError::Claims("kid doesn't exist"))?;

					DecodingKey::from_jwk(jwk)?
				};

				decode::<Claims>(token, &key, &self.validation(header.alg))
			}
		};

		let claims = match data {
			Ok(d) => d.claims,
			Err(e) => match e.kind() {
				ErrorKind::ExpiredSignature => return Err(AuthenticatorError::Expired),
				_ => return Err(AuthenticatorError::Invalid(e)),
			},
		};

		if claims.sub.is_empty() {
			return Err(AuthenticatorError::Claims("invalid sub"));
		}

		Ok(Identity {
			subject: claims.sub,
			issuer: claims.iss,
			name: claims.name,
			email: claims.email,
		})
	}
}

#[async_trait]
impl IdentityProvider for Authenticator {
	async fn resolve(&self, token: &str) -> Result<Identity, AuthenticatorError> {
		self.verify(token).await
	}
}

fn is_key_mismatch(err: &AuthenticatorError) -> bool {
	match err {
		AuthenticatorError::Invalid(e) => matches!(e.kind(), ErrorKind::InvalidSignature),
		AuthenticatorError::Claims(c) => *c == "kid doesn't exist",
		_ => false,
	}
}

async fn fetch_keys(jwks_url: &Url) -> anyhow::Result<JwkSet> {
	debug!(%jwks_url, "fetching jwt keys");

	let jwks = reqwest::get(jwks_url.as_str())
		.await?
		.error_for_status()?
		.json()
		.await
		.context("invalid jwks document")?;

	Ok(jwks)
}

fn get_jwks_url(base: &Url) -> anyhow::Result<Url> {
	base.join("/.well-known/jwks.json")
		.context("Invalid JWKS url")
}

#[cfg(test)]
pub mod test_util {
	use jsonwebtoken::{encode, EncodingKey, Header};
	use serde_json::json;

	use super::Authenticator;

	pub const SECRET: &[u8] = b"test-secret";
	pub const ISSUER: &str = "https://auth.test";

	pub fn authenticator() -> Authenticator {
		Authenticator::with_secret(SECRET, None, None)
	}

	pub fn token_with(claims: &serde_json::Value, secret: &[u8]) -> String {
		encode(&Header::default(), claims, &EncodingKey::from_secret(secret)).unwrap()
	}

	/// Valid HS256 token for `sub`, issued by [`ISSUER`].
	pub fn token(sub: &str) -> String {
		let exp = chrono::Utc::now().timestamp() + 3600;
		token_with(&json!({ "sub": sub, "iss": ISSUER, "exp": exp }), SECRET)
	}

	/// The user id [`token`] resolves to.
	pub fn user_id(sub: &str) -> super::UserId {
		super::UserId(format!("{ISSUER}:{sub}"))
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::test_util::*;
	use super::*;

	fn exp_in(secs: i64) -> i64 {
		chrono::Utc::now().timestamp() + secs
	}

	#[tokio::test]
	async fn valid_token_resolves_identity() {
		let auth = authenticator();
		let token = token_with(
			&json!({
				"sub": "u1",
				"iss": ISSUER,
				"exp": exp_in(600),
				"name": "Una",
				"email": "una@example.com",
			}),
			SECRET,
		);

		let identity = auth.resolve(&token).await.unwrap();

		assert_eq!(identity.subject, "u1");
		assert_eq!(identity.name.as_deref(), Some("Una"));
		assert_eq!(identity.user_id(), user_id("u1"));
	}

	#[tokio::test]
	async fn user_id_without_issuer_is_subject() {
		let auth = authenticator();
		let token = token_with(&json!({ "sub": "u1", "exp": exp_in(600) }), SECRET);

		let identity = auth.verify(&token).await.unwrap();

		assert_eq!(identity.user_id(), UserId("u1".into()));
	}

	#[tokio::test]
	async fn expired_token_is_rejected() {
		let auth = authenticator();
		let token = token_with(&json!({ "sub": "u1", "exp": exp_in(-3600) }), SECRET);

		assert!(matches!(
			auth.verify(&token).await,
			Err(AuthenticatorError::Expired)
		));
	}

	#[tokio::test]
	async fn wrong_secret_is_rejected() {
		let auth = authenticator();
		let token = token_with(&json!({ "sub": "u1", "exp": exp_in(600) }), b"other");

		assert!(matches!(
			auth.verify(&token).await,
			Err(AuthenticatorError::Invalid(_))
		));
	}

	#[tokio::test]
	async fn missing_subject_is_rejected() {
		let auth = authenticator();
		let token = token_with(&json!({ "exp": exp_in(600) }), SECRET);

		assert!(auth.verify(&token).await.is_err());
	}

	#[tokio::test]
	async fn audience_and_issuer_are_checked() {
		let auth = Authenticator::with_secret(SECRET, Some("things".into()), Some(ISSUER.into()));

		let good = token_with(
			&json!({ "sub": "u1", "iss": ISSUER, "aud": "things", "exp": exp_in(600) }),
			SECRET,
		);
		let wrong_aud = token_with(
			&json!({ "sub": "u1", "iss": ISSUER, "aud": "other", "exp": exp_in(600) }),
			SECRET,
		);
		let wrong_iss = token_with(
			&json!({ "sub": "u1", "iss": "https://evil.test", "aud": "things", "exp": exp_in(600) }),
			SECRET,
		);

		assert!(auth.verify(&good).await.is_ok());
		assert!(auth.verify(&wrong_aud).await.is_err());
		assert!(auth.verify(&wrong_iss).await.is_err());
	}

	#[tokio::test]
	async fn garbage_is_rejected() {
		let auth = authenticator();

		assert!(auth.verify("not-a-jwt").await.is_err());
	}

	mod jwks {
		use std::sync::atomic::{AtomicUsize, Ordering};
		use std::sync::Arc;

		use jsonwebtoken::{encode, EncodingKey, Header};

		use super::*;

		const RSA_PRIVATE: &[u8] = include_bytes!("testdata/rsa_private.pem");
		const JWKS: &str = include_str!("testdata/jwks.json");

		fn key_set() -> JwkSet {
			serde_json::from_str(JWKS).unwrap()
		}

		fn empty_set() -> JwkSet {
			JwkSet { keys: vec![] }
		}

		fn rsa_token(kid: &str, sub: &str) -> String {
			let mut header = Header::new(Algorithm::RS256);
			header.kid = Some(kid.into());

			encode(
				&header,
				&json!({ "sub": sub, "exp": exp_in(600) }),
				&EncodingKey::from_rsa_pem(RSA_PRIVATE).unwrap(),
			)
			.unwrap()
		}

		/// Serves `set` as a JWKS document and counts how often it was fetched.
		async fn serve(set: JwkSet) -> (Url, Arc<AtomicUsize>) {
			let hits = Arc::new(AtomicUsize::new(0));
			let counter = hits.clone();
			let body = serde_json::to_value(set).unwrap();

			let app = axum::Router::new().route(
				"/.well-known/jwks.json",
				axum::routing::get(move || {
					let counter = counter.clone();
					let body = body.clone();
					async move {
						counter.fetch_add(1, Ordering::SeqCst);
						axum::Json(body)
					}
				}),
			);

			let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
			let addr = listener.local_addr().unwrap();
			tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

			let base = Url::parse(&format!("http://{addr}/")).unwrap();
			(get_jwks_url(&base).unwrap(), hits)
		}

		fn authenticator(url: Url, cached: JwkSet, max_age: Duration) -> Authenticator {
			Authenticator {
				keys: KeySource::Jwks {
					url,
					cached: RwLock::new((cached, Instant::now())),
					max_age,
				},
				audience: None,
				issuer: None,
			}
		}

		const FRESH: Duration = Duration::from_secs(3600);

		#[tokio::test]
		async fn cached_key_verifies_without_fetching() {
			let (url, hits) = serve(key_set()).await;
			let auth = authenticator(url, key_set(), FRESH);

			let identity = auth.verify(&rsa_token("k1", "u1")).await.unwrap();

			assert_eq!(identity.subject, "u1");
			assert_eq!(hits.load(Ordering::SeqCst), 0);
		}

		#[tokio::test]
		async fn unknown_kid_with_fresh_cache_is_rejected() {
			let (url, hits) = serve(key_set()).await;
			let auth = authenticator(url, key_set(), FRESH);

			assert!(matches!(
				auth.verify(&rsa_token("k2", "u1")).await,
				Err(AuthenticatorError::Claims("kid doesn't exist"))
			));
			assert_eq!(hits.load(Ordering::SeqCst), 0);
		}

		#[tokio::test]
		async fn hmac_tokens_are_refused() {
			let (url, hits) = serve(key_set()).await;
			let auth = authenticator(url, key_set(), FRESH);

			assert!(matches!(
				auth.verify(&token("u1")).await,
				Err(AuthenticatorError::Claims("unexpected algorithm"))
			));
			assert_eq!(hits.load(Ordering::SeqCst), 0);
		}

		#[tokio::test]
		async fn stale_cache_is_refetched_on_unknown_kid() {
			let (url, hits) = serve(key_set()).await;
			let auth = authenticator(url, empty_set(), Duration::ZERO);

			let identity = auth.verify(&rsa_token("k1", "u1")).await.unwrap();

			assert_eq!(identity.subject, "u1");
			assert_eq!(hits.load(Ordering::SeqCst), 1);
		}

		#[tokio::test]
		async fn verification_is_retried_only_once() {
			let (url, hits) = serve(empty_set()).await;
			let auth = authenticator(url, empty_set(), Duration::ZERO);

			assert!(auth.verify(&rsa_token("k1", "u1")).await.is_err());
			assert_eq!(hits.load(Ordering::SeqCst), 1);
		}
	}

	#[test]
	fn jwks_url_is_well_known() {
		let url = get_jwks_url(&Url::parse("https://auth.example.com/tenant/").unwrap()).unwrap();

		assert_eq!(url.as_str(), "https://auth.example.com/.well-known/jwks.json");
	}
}
