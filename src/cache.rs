//! Resolution cache: an opaque key/value backend plus the outcome-aware wrapper the resolver
//! talks to.

pub mod key;
pub mod memory;
pub mod outcome;
#[cfg(feature = "redis")] pub mod redis;
pub mod ttl;

// crates.io
use async_trait::async_trait;
// self
use crate::{_prelude::*, cache::outcome::ResolutionOutcome};

/// Failures reported by a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
	/// No live entry exists for the key.
	#[error("Cache entry not found.")]
	NotFound,
	/// The stored value could not be decoded into an outcome.
	#[error("Cached value is undecodable: {0}")]
	Decode(String),
	/// The outcome could not be serialized for storage.
	#[error("Outcome is unencodable: {0}")]
	Encode(String),
	/// The backend failed or is unreachable.
	#[error("Cache backend failure: {0}")]
	Backend(String),
}

/// Opaque string key/value store with per-entry expiry.
#[async_trait]
pub trait ResolutionCache: Send + Sync {
	/// Fetch the live value stored under `key`.
	async fn get(&self, key: &str) -> Result<String, CacheError>;

	/// Store `value` under `key` for `ttl`, overwriting any prior value.
	async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

/// Outcome-level view over a [`ResolutionCache`], addressed by `(provider, token)`.
#[derive(Clone)]
pub struct OutcomeCache {
	backend: Arc<dyn ResolutionCache>,
	namespace: Arc<str>,
}
impl OutcomeCache {
	/// Wrap a backend, prefixing every key with `namespace`.
	pub fn new(backend: Arc<dyn ResolutionCache>, namespace: impl Into<Arc<str>>) -> Self {
		Self { backend, namespace: namespace.into() }
	}

	/// Key under which the outcome for `(provider, token)` is stored.
	pub fn key(&self, provider: &str, token: &str) -> String {
		key::cache_key(&self.namespace, provider, token)
	}

	/// Read and decode the cached outcome for `(provider, token)`.
	pub async fn get(&self, provider: &str, token: &str) -> Result<ResolutionOutcome, CacheError> {
		let raw = self.backend.get(&self.key(provider, token)).await?;

		ResolutionOutcome::decode(&raw)
	}

	/// Encode and store an outcome for `(provider, token)`.
	pub async fn set(
		&self,
		provider: &str,
		token: &str,
		outcome: &ResolutionOutcome,
		ttl: Duration,
	) -> Result<(), CacheError> {
		let encoded = outcome.encode()?;

		self.backend.set(&self.key(provider, token), encoded, ttl).await
	}
}
impl std::fmt::Debug for OutcomeCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OutcomeCache").field("namespace", &self.namespace).finish_non_exhaustive()
	}
}
