//! SQLite-backed user store.

// std
use std::path::Path;
// crates.io
use async_trait::async_trait;
use rusqlite::{ErrorCode, OptionalExtension, Row, params};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	identity::Identity,
	store::{StoreError, UserStore, validate_new_identity},
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    internal_id       TEXT PRIMARY KEY,
    provider          TEXT NOT NULL,
    external_subject  TEXT NOT NULL,
    display_name      TEXT NOT NULL DEFAULT '',
    email             TEXT NOT NULL DEFAULT '',
    phone_number      TEXT NOT NULL DEFAULT '',
    photo_url         TEXT NOT NULL DEFAULT '',
    disabled          INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL,   -- RFC 3339 UTC
    updated_at        TEXT NOT NULL,
    last_login_at     TEXT NOT NULL,
    UNIQUE (provider, external_subject)
);
";

const SELECT_COLUMNS: &str = "internal_id, provider, external_subject, display_name, email, \
	phone_number, photo_url, disabled, created_at, updated_at, last_login_at";

/// [`UserStore`] persisted in a single SQLite file.
///
/// Cloning is cheap; clones share one background connection.
#[derive(Clone)]
pub struct SqliteUserStore {
	conn: tokio_rusqlite::Connection,
}
impl SqliteUserStore {
	/// Open (or create) the database at `path` and ensure the schema exists.
	pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
		let conn = tokio_rusqlite::Connection::open(path).await?;

		Self::init(conn).await
	}

	/// Open a private in-memory database.
	pub async fn open_in_memory() -> Result<Self> {
		let conn = tokio_rusqlite::Connection::open_in_memory().await?;

		Self::init(conn).await
	}

	async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
		conn.call(|conn| {
			conn.execute_batch(SCHEMA)?;

			Ok(())
		})
		.await?;

		Ok(Self { conn })
	}

	async fn find_one(
		&self,
		clause: &'static str,
		args: Vec<String>,
	) -> Result<Identity, StoreError> {
		let row = self
			.conn
			.call(move |conn| {
				let sql = format!("SELECT {SELECT_COLUMNS} FROM users WHERE {clause}");
				let mut stmt = conn.prepare_cached(&sql)?;
				let row = stmt
					.query_row(rusqlite::params_from_iter(args.iter()), RawUser::from_row)
					.optional()?;

				Ok(row)
			})
			.await
			.map_err(server_error)?;

		row.ok_or(StoreError::NotFound)?.decode()
	}
}
impl std::fmt::Debug for SqliteUserStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SqliteUserStore").finish_non_exhaustive()
	}
}
#[async_trait]
impl UserStore for SqliteUserStore {
	async fn find_by_external_subject(
		&self,
		provider: &str,
		subject: &str,
	) -> Result<Identity, StoreError> {
		self.find_one(
			"provider = ?1 AND external_subject = ?2",
			vec![provider.to_owned(), subject.to_owned()],
		)
		.await
	}

	async fn create(&self, identity: &Identity) -> Result<String, StoreError> {
		validate_new_identity(identity)?;

		let internal_id = Uuid::new_v4().to_string();
		let record = Identity { internal_id: internal_id.clone(), ..identity.clone() };

		self.conn
			.call(move |conn| {
				conn.execute(
					"INSERT INTO users (internal_id, provider, external_subject, display_name, \
					 email, phone_number, photo_url, disabled, created_at, updated_at, \
					 last_login_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
					params![
						record.internal_id,
						record.provider,
						record.external_subject,
						record.display_name,
						record.email,
						record.phone_number,
						record.photo_url,
						record.disabled,
						record.created_at.to_rfc3339(),
						record.updated_at.to_rfc3339(),
						record.last_login_at.to_rfc3339(),
					],
				)?;

				Ok(())
			})
			.await
			.map_err(|err| {
				if is_constraint_violation(&err) { StoreError::Conflict } else { server_error(err) }
			})?;

		Ok(internal_id)
	}

	async fn find_by_internal_id(&self, internal_id: &str) -> Result<Identity, StoreError> {
		let id = parse_id(internal_id)?;

		self.find_one("internal_id = ?1", vec![id.to_string()]).await
	}

	async fn touch_login(&self, internal_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
		let id = parse_id(internal_id)?.to_string();
		let at = at.to_rfc3339();
		let updated = self
			.conn
			.call(move |conn| {
				let updated = conn.execute(
					"UPDATE users SET updated_at = ?2, last_login_at = ?2 WHERE internal_id = ?1",
					params![id, at],
				)?;

				Ok(updated)
			})
			.await
			.map_err(server_error)?;

		if updated == 0 { Err(StoreError::NotFound) } else { Ok(()) }
	}
}

struct RawUser {
	internal_id: String,
	provider: String,
	external_subject: String,
	display_name: String,
	email: String,
	phone_number: String,
	photo_url: String,
	disabled: bool,
	created_at: String,
	updated_at: String,
	last_login_at: String,
}
impl RawUser {
	fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
		Ok(Self {
			internal_id: row.get(0)?,
			provider: row.get(1)?,
			external_subject: row.get(2)?,
			display_name: row.get(3)?,
			email: row.get(4)?,
			phone_number: row.get(5)?,
			photo_url: row.get(6)?,
			disabled: row.get(7)?,
			created_at: row.get(8)?,
			updated_at: row.get(9)?,
			last_login_at: row.get(10)?,
		})
	}

	fn decode(self) -> Result<Identity, StoreError> {
		Ok(Identity {
			internal_id: self.internal_id,
			provider: self.provider,
			external_subject: self.external_subject,
			display_name: self.display_name,
			email: self.email,
			phone_number: self.phone_number,
			photo_url: self.photo_url,
			disabled: self.disabled,
			created_at: decode_dt(&self.created_at)?,
			updated_at: decode_dt(&self.updated_at)?,
			last_login_at: decode_dt(&self.last_login_at)?,
		})
	}
}

fn decode_dt(value: &str) -> Result<DateTime<Utc>, StoreError> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|err| StoreError::Server(format!("Corrupt timestamp '{value}': {err}.")))
}

fn parse_id(internal_id: &str) -> Result<Uuid, StoreError> {
	Uuid::parse_str(internal_id)
		.map_err(|err| StoreError::InvalidInput(format!("Malformed internal id: {err}.")))
}

fn is_constraint_violation(err: &tokio_rusqlite::Error) -> bool {
	matches!(
		err,
		tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(failure, _))
			if failure.code == ErrorCode::ConstraintViolation
	)
}

fn server_error(err: tokio_rusqlite::Error) -> StoreError {
	StoreError::Server(err.to_string())
}
