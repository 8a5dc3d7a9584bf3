use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

pub mod logging;

/// Url safe random token, used for single use upload urls.
pub fn random_token() -> String {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);

	URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokens_are_unique_and_url_safe() {
		let a = random_token();
		let b = random_token();

		assert_ne!(a, b);
		// 32 bytes without padding
		assert_eq!(a.len(), 43);
		assert!(a
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
	}
}
