//! Firebase Authentication client backed by the Identity Toolkit REST API.
//!
//! Token verification posts the ID token to the public `accounts:lookup` endpoint, which
//! answers with the owning account or a rejection code. Profile lookups use the
//! project-scoped admin endpoint and therefore need an admin bearer credential; the Auth
//! emulator accepts the literal `owner`.

// crates.io
use async_trait::async_trait;
use http::StatusCode;
use reqwest::{Client, RequestBuilder, redirect::Policy};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;
// self
use crate::{
	_prelude::*,
	identity::{FIREBASE_PROVIDER, Profile},
	provider::{
		IdentityProvider, ProviderError, VerifiedToken,
		retry::{AttemptBudget, RetryExecutor, RetryPolicy},
		token,
	},
	security,
};

/// Production Identity Toolkit endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/";
/// Admin credential understood by the Firebase Auth emulator.
pub const EMULATOR_ADMIN_TOKEN: &str = "owner";

/// Connection settings for [`FirebaseProvider`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FirebaseConfig {
	/// Firebase project identifier.
	pub project_id: String,
	/// Web API key used for the public lookup endpoint.
	pub api_key: String,
	/// `host:port` of a running Auth emulator.
	#[serde(default)]
	pub emulator_host: Option<String>,
	/// Explicit endpoint override, mainly for proxies and tests.
	#[serde(default)]
	pub endpoint: Option<Url>,
	/// Bearer credential for project-scoped admin lookups.
	#[serde(default)]
	pub admin_token: Option<String>,
	/// Whether the endpoint must use HTTPS; ignored for the emulator.
	#[serde(default = "default_true")]
	pub require_https: bool,
	/// Optional suffix allowlist for the endpoint host.
	#[serde(default, deserialize_with = "crate::security::deserialize_allowed_domains")]
	pub allowed_domains: Vec<String>,
	/// Retry policy for transient failures.
	#[serde(default)]
	pub retry: RetryPolicy,
}
impl FirebaseConfig {
	/// Configuration for the production endpoint.
	pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Self {
		Self {
			project_id: project_id.into(),
			api_key: api_key.into(),
			emulator_host: None,
			endpoint: None,
			admin_token: None,
			require_https: true,
			allowed_domains: Vec::new(),
			retry: RetryPolicy::default(),
		}
	}

	/// Route every call to an Auth emulator at `host:port`.
	pub fn with_emulator_host(mut self, host: impl Into<String>) -> Self {
		self.emulator_host = Some(host.into());

		self
	}

	/// Override the endpoint base URL.
	pub fn with_endpoint(mut self, endpoint: Url) -> Self {
		self.endpoint = Some(endpoint);

		self
	}

	/// Set the admin bearer credential.
	pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
		self.admin_token = Some(token.into());

		self
	}

	/// Set the HTTPS requirement.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Replace the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Base URL all API paths are joined onto; always ends with `/`.
	pub fn base_url(&self) -> Result<Url> {
		let mut url = match (&self.endpoint, &self.emulator_host) {
			(Some(endpoint), _) => endpoint.clone(),
			(None, Some(host)) => Url::parse(&format!("http://{host}/identitytoolkit.googleapis.com/"))?,
			(None, None) => Url::parse(DEFAULT_ENDPOINT)?,
		};

		if !url.path().ends_with('/') {
			let path = format!("{}/", url.path());

			url.set_path(&path);
		}

		Ok(url)
	}

	/// Admin credential, falling back to the emulator's built-in one.
	pub fn admin_credential(&self) -> Option<&str> {
		self.admin_token
			.as_deref()
			.or_else(|| self.emulator_host.as_ref().map(|_| EMULATOR_ADMIN_TOKEN))
	}

	/// Validate the configuration; a failure here aborts startup.
	pub fn validate(&self) -> Result<()> {
		if self.project_id.trim().is_empty() {
			return Err(Error::Validation {
				field: "firebase.project_id",
				reason: "Must not be empty.".into(),
			});
		}
		if self.api_key.trim().is_empty() {
			return Err(Error::Validation {
				field: "firebase.api_key",
				reason: "Must not be empty.".into(),
			});
		}
		if self.admin_credential().is_none() {
			return Err(Error::Validation {
				field: "firebase.admin_token",
				reason: "Required unless an emulator host is configured.".into(),
			});
		}

		let base = self.base_url()?;

		if self.require_https && self.emulator_host.is_none() {
			security::enforce_https(&base)?;
		}

		match base.host_str() {
			Some(host) if security::host_is_allowed(host, &self.allowed_domains) => {},
			Some(host) =>
				return Err(Error::Security(format!(
					"Host '{host}' is not within the allowed_domains allowlist."
				))),
			None =>
				return Err(Error::Validation {
					field: "firebase.endpoint",
					reason: "Must include a host component.".into(),
				}),
		}

		self.retry.validate()
	}
}

/// [`IdentityProvider`] implementation for Firebase Authentication.
#[derive(Clone, Debug)]
pub struct FirebaseProvider {
	config: Arc<FirebaseConfig>,
	client: Client,
	lookup_url: Url,
	admin_lookup_url: Url,
}
impl FirebaseProvider {
	/// Build a provider with a default HTTP client.
	pub fn new(config: FirebaseConfig) -> Result<Self> {
		let client = Client::builder()
			.redirect(Policy::limited(3))
			.user_agent(format!("bearer-identity/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(Duration::from_secs(5))
			.build()?;

		Self::with_client(config, client)
	}

	/// Build a provider around an existing HTTP client.
	pub fn with_client(config: FirebaseConfig, client: Client) -> Result<Self> {
		config.validate()?;

		let base = config.base_url()?;
		let mut lookup_url = base.join("v1/accounts:lookup")?;

		lookup_url.query_pairs_mut().append_pair("key", &config.api_key);

		let admin_lookup_url =
			base.join(&format!("v1/projects/{}/accounts:lookup", config.project_id))?;

		Ok(Self { config: Arc::new(config), client, lookup_url, admin_lookup_url })
	}

	async fn lookup(
		&self,
		url: &Url,
		body: &Value,
		admin: bool,
	) -> Result<Vec<AccountRecord>, ProviderError> {
		let mut executor = RetryExecutor::new(&self.config.retry);
		let mut last_error = None;

		while let AttemptBudget::Granted { timeout } = executor.attempt_budget() {
			let mut request = self.client.post(url.clone()).json(body).timeout(timeout);

			if admin && let Some(credential) = self.config.admin_credential() {
				request = request.bearer_auth(credential);
			}

			match self.exchange(request).await {
				Ok(accounts) => return Ok(accounts),
				Err(Attempt::Final(err)) => return Err(err),
				Err(Attempt::Transient(err)) => {
					tracing::debug!(error = %err, "transient identity provider failure");

					last_error = Some(err);

					if !executor.backoff().await {
						break;
					}
				},
			}
		}

		Err(last_error
			.unwrap_or_else(|| ProviderError::Server("Provider retry deadline exhausted.".into())))
	}

	async fn exchange(&self, request: RequestBuilder) -> Result<Vec<AccountRecord>, Attempt> {
		let started = Instant::now();
		let response = request.send().await.map_err(|err| {
			let err = ProviderError::Server(format!("Request failed: {err}."));

			Attempt::Transient(err)
		})?;
		let status = response.status();

		tracing::debug!(status = %status, elapsed = ?started.elapsed(), "identity toolkit call complete");

		if status.is_success() {
			let reply = response.json::<LookupReply>().await.map_err(|err| {
				Attempt::Final(ProviderError::Server(format!("Undecodable lookup reply: {err}.")))
			})?;

			return Ok(reply.users);
		}

		let body = response.text().await.unwrap_or_default();

		Err(classify_rejection(status, &body))
	}
}
#[async_trait]
impl IdentityProvider for FirebaseProvider {
	fn name(&self) -> &str {
		FIREBASE_PROVIDER
	}

	async fn verify_token(&self, token: &str) -> Result<VerifiedToken, ProviderError> {
		let hints = token::inspect(token)?;
		let accounts = self.lookup(&self.lookup_url, &json!({ "idToken": token }), false).await?;
		let account = accounts.into_iter().next().ok_or_else(|| {
			ProviderError::SubjectNotFound("Token resolved to no account.".into())
		})?;

		if account.local_id.is_empty() {
			return Err(ProviderError::Server("Account record carries no localId.".into()));
		}

		Ok(VerifiedToken::new(account.local_id).with_expiry(hints.expires_at))
	}

	async fn get_profile(&self, subject: &str) -> Result<Profile, ProviderError> {
		let accounts =
			self.lookup(&self.admin_lookup_url, &json!({ "localId": [subject] }), true).await?;

		accounts
			.into_iter()
			.find(|account| account.local_id == subject)
			.map(AccountRecord::into_profile)
			.ok_or_else(|| ProviderError::SubjectNotFound(format!("No account for '{subject}'.")))
	}
}

#[derive(Debug)]
enum Attempt {
	Final(ProviderError),
	Transient(ProviderError),
}

#[derive(Debug, Default, Deserialize)]
struct LookupReply {
	#[serde(default)]
	users: Vec<AccountRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AccountRecord {
	local_id: String,
	display_name: String,
	email: String,
	phone_number: String,
	photo_url: String,
	disabled: bool,
}
impl AccountRecord {
	fn into_profile(self) -> Profile {
		Profile {
			external_subject: self.local_id,
			display_name: self.display_name,
			email: self.email,
			phone_number: self.phone_number,
			photo_url: self.photo_url,
			disabled: self.disabled,
		}
	}
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
	error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
	#[serde(default)]
	message: String,
}

fn classify_rejection(status: StatusCode, body: &str) -> Attempt {
	if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
		return Attempt::Transient(ProviderError::Server(format!("Upstream status {status}.")));
	}

	let message =
		serde_json::from_str::<ErrorReply>(body).map(|reply| reply.error.message).unwrap_or_default();
	// Codes may carry a trailing " : detail" suffix.
	let code = message.split([' ', ':']).next().unwrap_or_default();
	let err = match code {
		"INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "INVALID_ARGUMENT"
		| "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => ProviderError::Invalid(code.to_owned()),
		"USER_NOT_FOUND" => ProviderError::SubjectNotFound(code.to_owned()),
		_ => ProviderError::Server(format!("Upstream status {status}: {message}")),
	};

	Attempt::Final(err)
}

fn default_true() -> bool {
	true
}
