use tracing::debug;

use crate::api::auth::AuthContext;
use crate::db::model::UploadUrl;

use super::HandlerError;

/// No thing is referenced yet, so there is nothing to check ownership of.
pub async fn generate_upload_url(ctx: &AuthContext) -> Result<UploadUrl, HandlerError> {
	let upload = ctx.blobs.generate_upload_url(&ctx.user_id).await?;

	debug!(user=%ctx.user_id, expires=%upload.expires_at, "issued upload url");

	Ok(upload)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::api::auth::RequestContext;
	use crate::api::tests::state;
	use crate::auth::test_util;

	#[tokio::test]
	async fn upload_urls_are_unique_and_point_at_upload_route() {
		let ctx = AuthContext::resolve(RequestContext {
			token: Some(test_util::token("u1")),
			state: state().0,
		})
		.await
		.unwrap();

		let a = generate_upload_url(&ctx).await.unwrap();
		let b = generate_upload_url(&ctx).await.unwrap();

		assert_ne!(a.url, b.url);
		assert!(a.url.path().starts_with("/storage/upload/"));
		assert!(a.expires_at > chrono::Utc::now());
	}
}
