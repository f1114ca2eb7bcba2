//! Cached resolution outcomes and their wire encoding.
//!
//! Encoded as JSON internally tagged by `outcome`:
//!
//! ```json
//! {"outcome":"ok","identity":{"internal_id":"u1","provider":"firebase",...}}
//! {"outcome":"failure","class":"invalid_token","message":"TOKEN_EXPIRED"}
//! ```

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{cache::CacheError, identity::Identity};

/// Stable failure causes that may be cached for a token's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
	/// Token malformed, expired, or revoked.
	InvalidToken,
	/// Provider does not know the token's subject.
	UnknownSubject,
}
impl FailureClass {
	/// Label value used in logs and metrics.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::InvalidToken => "invalid_token",
			Self::UnknownSubject => "unknown_subject",
		}
	}
}

/// Definitive result of resolving one `(provider, token)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolutionOutcome {
	/// Token resolved to a persisted identity.
	Ok {
		/// The resolved identity.
		identity: Identity,
	},
	/// Token was rejected for a stable reason.
	Failure {
		/// Cause of the rejection.
		class: FailureClass,
		/// Diagnostic detail; never shown to clients.
		message: String,
	},
}
impl ResolutionOutcome {
	/// Positive outcome.
	pub fn ok(identity: Identity) -> Self {
		Self::Ok { identity }
	}

	/// Negative outcome.
	pub fn failure(class: FailureClass, message: impl Into<String>) -> Self {
		Self::Failure { class, message: message.into() }
	}

	/// Serialize for storage.
	pub fn encode(&self) -> Result<String, CacheError> {
		serde_json::to_string(self).map_err(|err| CacheError::Encode(err.to_string()))
	}

	/// Deserialize a stored value.
	pub fn decode(raw: &str) -> Result<Self, CacheError> {
		serde_json::from_str(raw).map_err(|err| CacheError::Decode(err.to_string()))
	}
}
