//! In-process user store.

// std
use std::collections::HashMap;
// crates.io
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	identity::Identity,
	store::{StoreError, UserStore, validate_new_identity},
};

#[derive(Debug, Default)]
struct Tables {
	by_id: HashMap<String, Identity>,
	by_subject: HashMap<(String, String), String>,
}

/// `HashMap`-backed [`UserStore`] enforcing one record per provider subject.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
	tables: RwLock<Tables>,
}
impl MemoryUserStore {
	/// Create an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of persisted records.
	pub async fn len(&self) -> usize {
		self.tables.read().await.by_id.len()
	}

	/// Whether the store holds no records.
	pub async fn is_empty(&self) -> bool {
		self.tables.read().await.by_id.is_empty()
	}
}
#[async_trait]
impl UserStore for MemoryUserStore {
	async fn find_by_external_subject(
		&self,
		provider: &str,
		subject: &str,
	) -> Result<Identity, StoreError> {
		let tables = self.tables.read().await;

		tables
			.by_subject
			.get(&(provider.to_owned(), subject.to_owned()))
			.and_then(|id| tables.by_id.get(id))
			.cloned()
			.ok_or(StoreError::NotFound)
	}

	async fn create(&self, identity: &Identity) -> Result<String, StoreError> {
		validate_new_identity(identity)?;

		let subject_key = (identity.provider.clone(), identity.external_subject.clone());
		let mut tables = self.tables.write().await;

		if tables.by_subject.contains_key(&subject_key) {
			return Err(StoreError::Conflict);
		}

		let internal_id = Uuid::new_v4().to_string();
		let record = Identity { internal_id: internal_id.clone(), ..identity.clone() };

		tables.by_subject.insert(subject_key, internal_id.clone());
		tables.by_id.insert(internal_id.clone(), record);

		Ok(internal_id)
	}

	async fn find_by_internal_id(&self, internal_id: &str) -> Result<Identity, StoreError> {
		parse_id(internal_id)?;

		self.tables.read().await.by_id.get(internal_id).cloned().ok_or(StoreError::NotFound)
	}

	async fn touch_login(&self, internal_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
		parse_id(internal_id)?;

		let mut tables = self.tables.write().await;
		let record = tables.by_id.get_mut(internal_id).ok_or(StoreError::NotFound)?;

		record.updated_at = at;
		record.last_login_at = at;

		Ok(())
	}
}

fn parse_id(internal_id: &str) -> Result<Uuid, StoreError> {
	Uuid::parse_str(internal_id)
		.map_err(|err| StoreError::InvalidInput(format!("Malformed internal id: {err}.")))
}
