//! Identity provider contract consumed by the resolver.

pub mod firebase;
pub mod retry;
pub mod token;

// crates.io
use async_trait::async_trait;
// self
use crate::{_prelude::*, identity::Profile};

/// Outcome of a successful token verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedToken {
	/// Provider-issued subject identifier.
	pub subject: String,
	/// Expiry advertised by the token itself, when known.
	pub expires_at: Option<DateTime<Utc>>,
}
impl VerifiedToken {
	/// Create a verified token without expiry information.
	pub fn new(subject: impl Into<String>) -> Self {
		Self { subject: subject.into(), expires_at: None }
	}

	/// Attach the token's expiry.
	pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
		self.expires_at = expires_at;

		self
	}
}

/// Failures reported by an identity provider.
///
/// `Invalid` and `SubjectNotFound` are stable for the token's lifetime; `Server` is
/// transient and must never be cached.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
	/// Token is malformed, expired, or revoked.
	#[error("Token rejected by identity provider: {0}")]
	Invalid(String),
	/// Subject is unknown to the provider.
	#[error("Subject unknown to identity provider: {0}")]
	SubjectNotFound(String),
	/// Provider unavailable or answered unexpectedly.
	#[error("Identity provider failure: {0}")]
	Server(String),
}

/// Capability set required from an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
	/// Stable provider name used in cache keys and store lookups.
	fn name(&self) -> &str;

	/// Verify a bearer token and return the subject it was issued to.
	async fn verify_token(&self, token: &str) -> Result<VerifiedToken, ProviderError>;

	/// Fetch the provider's profile for a verified subject.
	async fn get_profile(&self, subject: &str) -> Result<Profile, ProviderError>;
}
