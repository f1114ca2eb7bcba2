//! Structural inspection of bearer tokens ahead of any provider round-trip.
//!
//! Nothing here verifies a signature. The output only lets the provider reject garbage
//! cheaply and lets the resolver bound cache lifetimes by the token's own expiry.

// crates.io
use base64::prelude::*;
use serde::Deserialize;
use serde_json::Value;
// self
use crate::{_prelude::*, provider::ProviderError};

/// Unverified hints read from a JWT-shaped bearer token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenHints {
	/// Expiry from the `exp` claim, if present and numeric.
	pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct Header {
	alg: String,
}

/// Inspect a JWT-shaped token: three dot-separated segments with a decodable JSON header.
///
/// Unsigned emulator tokens (`alg: none`, empty signature) pass this check.
pub fn inspect(token: &str) -> Result<TokenHints, ProviderError> {
	let segments = token.split('.').collect::<Vec<_>>();

	if segments.len() != 3 {
		return Err(ProviderError::Invalid("Token must contain exactly three segments.".into()));
	}

	let header = decode_segment(segments[0])
		.and_then(|bytes| serde_json::from_slice::<Header>(&bytes).ok())
		.ok_or_else(|| ProviderError::Invalid("Token header is not decodable JSON.".into()))?;

	if header.alg.is_empty() {
		return Err(ProviderError::Invalid("Token header names no algorithm.".into()));
	}

	let expires_at = decode_segment(segments[1])
		.and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
		.and_then(|claims| claims.get("exp").and_then(Value::as_i64))
		.and_then(|exp| DateTime::from_timestamp(exp, 0));

	Ok(TokenHints { expires_at })
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
	BASE64_URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()
}
