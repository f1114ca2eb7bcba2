//! Crate-wide error types and `Result` alias.
//!
//! These cover construction, configuration, and backend wiring. Request-time failures are
//! reported through [`crate::AuthFailure`] and the per-collaborator error enums instead.

/// Library-wide result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for building and configuring the resolution pipeline.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[cfg(feature = "redis")]
	#[error(transparent)]
	Redis(#[from] redis::RedisError),
	#[cfg(feature = "sqlite")]
	#[error(transparent)]
	Sqlite(#[from] tokio_rusqlite::Error),

	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Security violation: {0}")]
	Security(String),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
