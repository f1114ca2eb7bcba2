//! Local user identity and identity-provider profile model.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Provider name used for Firebase Authentication.
pub const FIREBASE_PROVIDER: &str = "firebase";

/// A caller resolved to a durable local user record.
///
/// An identity is addressable either by `internal_id` once persisted or by the
/// `(provider, external_subject)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	/// Store-assigned identifier; empty until the record is persisted.
	#[serde(default)]
	pub internal_id: String,
	/// Name of the identity provider that issued `external_subject`.
	pub provider: String,
	/// Provider-issued subject identifier.
	pub external_subject: String,
	/// Display name mirrored from the provider profile.
	#[serde(default)]
	pub display_name: String,
	/// Email address mirrored from the provider profile.
	#[serde(default)]
	pub email: String,
	/// Phone number mirrored from the provider profile.
	#[serde(default)]
	pub phone_number: String,
	/// Photo URL mirrored from the provider profile.
	#[serde(default)]
	pub photo_url: String,
	/// Provider-reported account state.
	#[serde(default)]
	pub disabled: bool,
	/// Set once when the record is first persisted.
	pub created_at: DateTime<Utc>,
	/// Refreshed whenever the record is written.
	pub updated_at: DateTime<Utc>,
	/// Refreshed on each resolution that reaches the user store.
	pub last_login_at: DateTime<Utc>,
}
impl Identity {
	/// Build an unpersisted identity from a provider profile, stamping every timestamp with `now`.
	pub fn from_profile(provider: impl Into<String>, profile: Profile, now: DateTime<Utc>) -> Self {
		let Profile { external_subject, display_name, email, phone_number, photo_url, disabled } =
			profile;

		Self {
			internal_id: String::new(),
			provider: provider.into(),
			external_subject,
			display_name,
			email,
			phone_number,
			photo_url,
			disabled,
			created_at: now,
			updated_at: now,
			last_login_at: now,
		}
	}

	/// Whether the identity has been assigned a store identifier.
	pub fn is_persisted(&self) -> bool {
		!self.internal_id.is_empty()
	}
}

/// Profile snapshot reported by the identity provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
	/// Provider-issued subject identifier.
	pub external_subject: String,
	/// Display name, empty when the provider has none.
	#[serde(default)]
	pub display_name: String,
	/// Email address, empty when the provider has none.
	#[serde(default)]
	pub email: String,
	/// Phone number, empty when the provider has none.
	#[serde(default)]
	pub phone_number: String,
	/// Photo URL, empty when the provider has none.
	#[serde(default)]
	pub photo_url: String,
	/// Whether the provider has disabled the account.
	#[serde(default)]
	pub disabled: bool,
}
impl Profile {
	/// Create a profile carrying only the subject identifier.
	pub fn new(external_subject: impl Into<String>) -> Self {
		Self { external_subject: external_subject.into(), ..Default::default() }
	}

	/// Set the display name.
	pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
		self.display_name = display_name.into();

		self
	}

	/// Set the email address.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = email.into();

		self
	}
}
