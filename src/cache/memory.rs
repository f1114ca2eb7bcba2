//! In-process resolution cache.

// std
use std::collections::HashMap;
// crates.io
use async_trait::async_trait;
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	cache::{CacheError, ResolutionCache},
};

// Entries never outlive this, whatever TTL the caller passes.
const MAX_ENTRY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// `HashMap`-backed cache whose entries expire after their TTL.
///
/// Expired entries read as [`CacheError::NotFound`] and are dropped on that read;
/// [`MemoryResolutionCache::purge_expired`] sweeps the rest.
#[derive(Debug, Default)]
pub struct MemoryResolutionCache {
	entries: RwLock<HashMap<String, (String, Instant)>>,
}
impl MemoryResolutionCache {
	/// Create an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored entries, including expired ones not yet purged.
	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	/// Whether no entries are stored.
	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}

	/// Drop every expired entry; returns how many were removed.
	pub async fn purge_expired(&self) -> usize {
		let now = Instant::now();
		let mut entries = self.entries.write().await;
		let before = entries.len();

		entries.retain(|_, (_, expires_at)| *expires_at > now);

		before - entries.len()
	}
}
#[async_trait]
impl ResolutionCache for MemoryResolutionCache {
	async fn get(&self, key: &str) -> Result<String, CacheError> {
		let now = Instant::now();

		{
			let entries = self.entries.read().await;

			match entries.get(key) {
				Some((value, expires_at)) if *expires_at > now => return Ok(value.clone()),
				Some(_) => {},
				None => return Err(CacheError::NotFound),
			}
		}

		let mut entries = self.entries.write().await;

		if entries.get(key).is_some_and(|(_, expires_at)| *expires_at <= now) {
			entries.remove(key);
		}

		Err(CacheError::NotFound)
	}

	async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
		let expires_at = Instant::now() + ttl.min(MAX_ENTRY_TTL);

		self.entries.write().await.insert(key.to_owned(), (value, expires_at));

		Ok(())
	}
}
