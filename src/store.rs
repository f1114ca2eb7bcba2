//! Durable user records keyed by internal id and by `(provider, external_subject)`.

pub mod memory;
#[cfg(feature = "sqlite")] pub mod sqlite;

// crates.io
use async_trait::async_trait;
// self
use crate::{_prelude::*, identity::Identity};

/// Failures reported by a user store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	/// No record matches the lookup.
	#[error("User record not found.")]
	NotFound,
	/// The request itself is malformed.
	#[error("Invalid store input: {0}")]
	InvalidInput(String),
	/// A record already exists for the `(provider, external_subject)` pair.
	#[error("User record already exists for this provider subject.")]
	Conflict,
	/// Backend failure or connectivity loss.
	#[error("User store failure: {0}")]
	Server(String),
}

/// Capability set required from a user store.
///
/// Implementations must reject a second record for the same `(provider, external_subject)`
/// pair with [`StoreError::Conflict`].
#[async_trait]
pub trait UserStore: Send + Sync {
	/// Look up the record owned by `subject` at `provider`.
	async fn find_by_external_subject(
		&self,
		provider: &str,
		subject: &str,
	) -> Result<Identity, StoreError>;

	/// Persist an unpersisted identity and return its new internal id.
	async fn create(&self, identity: &Identity) -> Result<String, StoreError>;

	/// Look up a record by internal id.
	async fn find_by_internal_id(&self, internal_id: &str) -> Result<Identity, StoreError>;

	/// Stamp `updated_at` and `last_login_at` with `at`.
	async fn touch_login(&self, internal_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Shared input checks for [`UserStore::create`].
pub(crate) fn validate_new_identity(identity: &Identity) -> Result<(), StoreError> {
	if identity.is_persisted() {
		return Err(StoreError::InvalidInput("Identity already carries an internal id.".into()));
	}
	if identity.provider.is_empty() {
		return Err(StoreError::InvalidInput("Provider name must not be empty.".into()));
	}
	if identity.external_subject.is_empty() {
		return Err(StoreError::InvalidInput("External subject must not be empty.".into()));
	}

	Ok(())
}
