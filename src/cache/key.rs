//! Cache key derivation.

// crates.io
use base64::prelude::*;
use sha2::{Digest, Sha256};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "user:auth_token_user";

/// Build `{namespace}:{provider}:{digest}` where `digest` is the base64url SHA-256 of the token.
///
/// The bearer token itself never reaches the cache backend.
pub fn cache_key(namespace: &str, provider: &str, token: &str) -> String {
	let digest = BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()));

	format!("{namespace}:{provider}:{digest}")
}
