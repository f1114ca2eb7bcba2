//! Redis-backed resolution cache.

// crates.io
use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tokio::sync::OnceCell;
// self
use crate::{
	_prelude::*,
	cache::{CacheError, ResolutionCache},
};

/// Resolution cache over `GET` / `PSETEX` on a shared multiplexed connection.
pub struct RedisResolutionCache {
	client: redis::Client,
	connection: OnceCell<MultiplexedConnection>,
}
impl RedisResolutionCache {
	/// Open a client for `url` without connecting yet.
	pub fn open(url: &str) -> Result<Self> {
		Ok(Self::new(redis::Client::open(url)?))
	}

	/// Wrap an existing client; the connection is established on first use.
	pub fn new(client: redis::Client) -> Self {
		Self { client, connection: OnceCell::new() }
	}

	async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
		self.connection
			.get_or_try_init(|| self.client.get_multiplexed_async_connection())
			.await
			.cloned()
			.map_err(backend_error)
	}
}
impl std::fmt::Debug for RedisResolutionCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RedisResolutionCache")
			.field("client", &self.client)
			.field("connected", &self.connection.initialized())
			.finish()
	}
}
#[async_trait]
impl ResolutionCache for RedisResolutionCache {
	async fn get(&self, key: &str) -> Result<String, CacheError> {
		let mut conn = self.connection().await?;
		let value: Option<String> = conn.get(key).await.map_err(backend_error)?;

		value.ok_or(CacheError::NotFound)
	}

	async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
		let mut conn = self.connection().await?;

		conn.pset_ex::<_, _, ()>(key, value, expiry_millis(ttl)).await.map_err(backend_error)
	}
}

// `PSETEX` rejects a zero expiry, so sub-millisecond TTLs round up to one.
fn expiry_millis(ttl: Duration) -> u64 {
	u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn backend_error(err: redis::RedisError) -> CacheError {
	CacheError::Backend(err.to_string())
}
