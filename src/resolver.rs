//! Cache-aside resolution of bearer tokens into persisted identities.
//!
//! Per request the resolver runs a strictly sequential chain: cache probe, provider
//! verification, store lookup, then profile fetch plus store create for first-time users,
//! and finally a cache write. Stable rejections are cached as negative outcomes; dependency
//! failures never are.

// std
use std::{
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
};
// crates.io
use serde::{Deserialize, Serialize};
use tokio::time;
// self
use crate::{
	_prelude::*,
	cache::{
		CacheError, OutcomeCache, ResolutionCache,
		key::DEFAULT_NAMESPACE,
		outcome::{FailureClass, ResolutionOutcome},
		ttl::TtlPolicy,
	},
	identity::{Identity, Profile},
	metrics::{self, CacheOp, ProviderMetrics, ProviderMetricsSnapshot, ResolveSource},
	provider::{IdentityProvider, ProviderError},
	store::{StoreError, UserStore},
};

/// Dependency blamed for a [`AuthFailure::SystemFailure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dependency {
	/// Identity provider client.
	Provider,
	/// User store.
	Store,
}
impl Display for Dependency {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(match self {
			Self::Provider => "identity provider",
			Self::Store => "user store",
		})
	}
}

/// Why a token could not be resolved to an identity.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
	/// The caller presented no, an invalid, or an unrecognised credential.
	#[error("Unauthenticated: {message}")]
	Unauthenticated {
		/// Stable cause; `None` when no token was presented.
		class: Option<FailureClass>,
		/// Diagnostic detail for logs.
		message: String,
	},
	/// A dependency was unavailable or answered unexpectedly.
	#[error("{dependency} failure: {message}")]
	SystemFailure {
		/// The failing dependency.
		dependency: Dependency,
		/// Diagnostic detail for logs.
		message: String,
	},
}
impl AuthFailure {
	fn system(dependency: Dependency, message: impl Into<String>) -> Self {
		Self::SystemFailure { dependency, message: message.into() }
	}

	/// Whether this is a dependency failure rather than a rejected credential.
	pub fn is_system(&self) -> bool {
		matches!(self, Self::SystemFailure { .. })
	}

	/// Metric label for the failure.
	pub fn class_label(&self) -> &'static str {
		match self {
			Self::Unauthenticated { class: Some(class), .. } => class.as_str(),
			Self::Unauthenticated { class: None, .. } => "missing_token",
			Self::SystemFailure { .. } => "system",
		}
	}
}

/// Tunables for [`TokenResolver`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
	/// TTL applied to resolved identities.
	pub positive_ttl: TtlPolicy,
	/// TTL applied to stable rejections.
	pub negative_ttl: TtlPolicy,
	/// Bound on each identity provider call.
	#[serde(with = "humantime_serde")]
	pub provider_timeout: Duration,
	/// Bound on each user store call.
	#[serde(with = "humantime_serde")]
	pub store_timeout: Duration,
	/// Bound on each cache call; expiry degrades to a miss or skipped write.
	#[serde(with = "humantime_serde")]
	pub cache_timeout: Duration,
	/// Prefix for every cache key.
	pub cache_namespace: String,
}
impl ResolverConfig {
	/// Validate timeouts, TTL bounds, and the namespace.
	pub fn validate(&self) -> Result<()> {
		for (field, value) in [
			("resolver.provider_timeout", self.provider_timeout),
			("resolver.store_timeout", self.store_timeout),
			("resolver.cache_timeout", self.cache_timeout),
		] {
			if value.is_zero() {
				return Err(Error::Validation { field, reason: "Must be greater than zero.".into() });
			}
		}
		if self.cache_namespace.trim().is_empty() {
			return Err(Error::Validation {
				field: "resolver.cache_namespace",
				reason: "Must not be empty.".into(),
			});
		}

		self.positive_ttl.validate("resolver.positive_ttl")?;
		self.negative_ttl.validate("resolver.negative_ttl")
	}
}
impl Default for ResolverConfig {
	fn default() -> Self {
		Self {
			positive_ttl: TtlPolicy::positive(),
			negative_ttl: TtlPolicy::negative(),
			provider_timeout: Duration::from_secs(5),
			store_timeout: Duration::from_secs(3),
			cache_timeout: Duration::from_millis(250),
			cache_namespace: DEFAULT_NAMESPACE.into(),
		}
	}
}

enum Fresh {
	Resolved { identity: Identity, source: ResolveSource, expires_at: Option<DateTime<Utc>> },
	Rejected { class: FailureClass, message: String },
}

/// Resolves bearer tokens issued by one identity provider.
#[derive(Clone)]
pub struct TokenResolver {
	provider: Arc<dyn IdentityProvider>,
	store: Arc<dyn UserStore>,
	cache: OutcomeCache,
	config: Arc<ResolverConfig>,
	metrics: Arc<ProviderMetrics>,
}
impl TokenResolver {
	/// Wire a resolver from its collaborators; fails on invalid configuration.
	pub fn new(
		provider: Arc<dyn IdentityProvider>,
		store: Arc<dyn UserStore>,
		cache: Arc<dyn ResolutionCache>,
		config: ResolverConfig,
	) -> Result<Self> {
		config.validate()?;

		let cache = OutcomeCache::new(cache, config.cache_namespace.as_str());

		Ok(Self {
			provider,
			store,
			cache,
			config: Arc::new(config),
			metrics: ProviderMetrics::new(),
		})
	}

	/// Name of the provider whose tokens this resolver accepts.
	pub fn provider_name(&self) -> &str {
		self.provider.name()
	}

	/// Point-in-time counters for this resolver.
	pub fn metrics(&self) -> ProviderMetricsSnapshot {
		self.metrics.snapshot()
	}

	/// Resolve `token` into a persisted identity.
	///
	/// The provider is fixed at construction, so unlike a `(provider_name, token)` lookup only
	/// the token is passed; [`TokenResolver::provider_name`] names the provider that is used.
	#[tracing::instrument(skip_all, fields(provider = %self.provider.name()))]
	pub async fn resolve(&self, token: &str) -> Result<Identity, AuthFailure> {
		let started = Instant::now();
		let provider = self.provider.name();

		if token.trim().is_empty() {
			let failure = AuthFailure::Unauthenticated {
				class: None,
				message: "Empty bearer token.".into(),
			};

			self.observe_failure(&failure);

			return Err(failure);
		}

		match self.probe(provider, token).await {
			Some(ResolutionOutcome::Ok { identity }) => {
				tracing::debug!(internal_id = %identity.internal_id, "served identity from cache");

				self.observe_resolved(ResolveSource::CacheHit, started);

				return Ok(identity);
			},
			Some(ResolutionOutcome::Failure { class, message }) => {
				tracing::debug!(class = class.as_str(), "served rejection from cache");

				self.observe_resolved(ResolveSource::NegativeHit, started);
				self.observe_failure_class(class.as_str(), false);

				return Err(AuthFailure::Unauthenticated { class: Some(class), message });
			},
			None => {},
		}

		match self.resolve_fresh(provider, token).await {
			Ok(Fresh::Resolved { identity, source, expires_at }) => {
				let ttl = self.positive_ttl(expires_at);

				self.write(provider, token, &ResolutionOutcome::ok(identity.clone()), ttl).await;
				self.observe_resolved(source, started);

				Ok(identity)
			},
			Ok(Fresh::Rejected { class, message }) => {
				let outcome = ResolutionOutcome::failure(class, message.clone());

				tracing::info!(class = class.as_str(), reason = %message, "token rejected");

				self.write(provider, token, &outcome, self.config.negative_ttl.generate()).await;
				self.observe_resolved(ResolveSource::Rejected, started);

				let failure = AuthFailure::Unauthenticated { class: Some(class), message };

				self.observe_failure(&failure);

				Err(failure)
			},
			Err(failure) => {
				tracing::error!(error = %failure, "token resolution failed");

				self.observe_failure(&failure);

				Err(failure)
			},
		}
	}

	async fn resolve_fresh(&self, provider: &str, token: &str) -> Result<Fresh, AuthFailure> {
		let verified = match self.call_provider(self.provider.verify_token(token)).await? {
			Ok(verified) => verified,
			Err(ProviderError::Invalid(message)) =>
				return Ok(Fresh::Rejected { class: FailureClass::InvalidToken, message }),
			Err(ProviderError::SubjectNotFound(message)) =>
				return Ok(Fresh::Rejected { class: FailureClass::UnknownSubject, message }),
			Err(err @ ProviderError::Server(_)) =>
				return Err(AuthFailure::system(Dependency::Provider, err.to_string())),
		};
		let subject = verified.subject;
		let expires_at = verified.expires_at;
		let now = Utc::now();

		match self.call_store(self.store.find_by_external_subject(provider, &subject)).await? {
			Ok(identity) => {
				let identity = self.touch_login(identity, now).await;

				return Ok(Fresh::Resolved { identity, source: ResolveSource::Store, expires_at });
			},
			Err(StoreError::NotFound) => {},
			Err(err) => return Err(AuthFailure::system(Dependency::Store, err.to_string())),
		}

		let profile = self
			.call_provider(self.provider.get_profile(&subject))
			.await?
			.map_err(|err| AuthFailure::system(Dependency::Provider, err.to_string()))?;
		let candidate = Identity::from_profile(
			provider,
			Profile { external_subject: subject.clone(), ..profile },
			now,
		);
		let internal_id = match self.call_store(self.store.create(&candidate)).await? {
			Ok(internal_id) => internal_id,
			Err(StoreError::Conflict) => {
				tracing::info!("user created concurrently; re-reading existing record");

				let identity = self
					.call_store(self.store.find_by_external_subject(provider, &subject))
					.await?
					.map_err(|err| {
						AuthFailure::system(
							Dependency::Store,
							format!("Record missing after create conflict: {err}"),
						)
					})?;
				let identity = self.touch_login(identity, now).await;

				return Ok(Fresh::Resolved { identity, source: ResolveSource::Store, expires_at });
			},
			Err(err) => return Err(AuthFailure::system(Dependency::Store, err.to_string())),
		};
		let identity = self
			.call_store(self.store.find_by_internal_id(&internal_id))
			.await?
			.map_err(|err| AuthFailure::system(Dependency::Store, err.to_string()))?;

		tracing::info!(internal_id = %identity.internal_id, "provisioned new user");

		Ok(Fresh::Resolved { identity, source: ResolveSource::Provisioned, expires_at })
	}

	async fn touch_login(&self, mut identity: Identity, now: DateTime<Utc>) -> Identity {
		match self.call_store(self.store.touch_login(&identity.internal_id, now)).await {
			Ok(Ok(())) => {
				identity.updated_at = now;
				identity.last_login_at = now;
			},
			Ok(Err(err)) => tracing::warn!(error = %err, "failed to record last login"),
			Err(failure) => tracing::warn!(error = %failure, "failed to record last login"),
		}

		identity
	}

	async fn probe(&self, provider: &str, token: &str) -> Option<ResolutionOutcome> {
		let err = match time::timeout(self.config.cache_timeout, self.cache.get(provider, token))
			.await
		{
			Ok(Ok(outcome)) => return Some(outcome),
			Ok(Err(CacheError::NotFound)) => return None,
			Ok(Err(err)) => err,
			Err(_) => CacheError::Backend("Cache read timed out.".into()),
		};
		let op = if matches!(err, CacheError::Decode(_)) { CacheOp::Decode } else { CacheOp::Get };

		tracing::warn!(error = %err, "cache read failed; treating as miss");

		self.observe_cache_error(op);

		None
	}

	async fn write(&self, provider: &str, token: &str, outcome: &ResolutionOutcome, ttl: Duration) {
		if ttl.is_zero() {
			return;
		}

		let err = match time::timeout(
			self.config.cache_timeout,
			self.cache.set(provider, token, outcome, ttl),
		)
		.await
		{
			Ok(Ok(())) => return,
			Ok(Err(err)) => err,
			Err(_) => CacheError::Backend("Cache write timed out.".into()),
		};

		tracing::warn!(error = %err, "cache write failed; continuing without caching");

		self.observe_cache_error(CacheOp::Set);
	}

	fn positive_ttl(&self, expires_at: Option<DateTime<Utc>>) -> Duration {
		let ttl = self.config.positive_ttl.generate();

		match expires_at {
			Some(at) => (at - Utc::now()).to_std().map_or(Duration::ZERO, |left| ttl.min(left)),
			None => ttl,
		}
	}

	async fn call_provider<T, F>(&self, call: F) -> Result<T, AuthFailure>
	where
		F: Future<Output = T>,
	{
		bounded(Dependency::Provider, self.config.provider_timeout, call).await
	}

	async fn call_store<T, F>(&self, call: F) -> Result<T, AuthFailure>
	where
		F: Future<Output = T>,
	{
		bounded(Dependency::Store, self.config.store_timeout, call).await
	}

	fn observe_resolved(&self, source: ResolveSource, started: Instant) {
		let elapsed = started.elapsed();

		self.metrics.record_resolved(source, elapsed);

		metrics::record_resolved(self.provider.name(), source, elapsed);
	}

	fn observe_failure(&self, failure: &AuthFailure) {
		self.observe_failure_class(failure.class_label(), failure.is_system());
	}

	fn observe_failure_class(&self, class: &'static str, system: bool) {
		self.metrics.record_failure(system);

		metrics::record_failure(self.provider.name(), class);
	}

	fn observe_cache_error(&self, op: CacheOp) {
		self.metrics.record_cache_error();

		metrics::record_cache_error(self.provider.name(), op);
	}
}
impl std::fmt::Debug for TokenResolver {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("TokenResolver")
			.field("provider", &self.provider.name())
			.field("cache", &self.cache)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

async fn bounded<T, F>(dependency: Dependency, limit: Duration, call: F) -> Result<T, AuthFailure>
where
	F: Future<Output = T>,
{
	time::timeout(limit, call)
		.await
		.map_err(|_| AuthFailure::system(dependency, format!("Timed out after {limit:?}.")))
}
