//! Cache-aside resolution of bearer tokens into durable local identities, with negative
//! caching of rejected tokens and an axum middleware for attaching identities to requests.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod provider;
pub mod resolver;
pub mod security;
pub mod store;

mod error;
mod jitter;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}
#[cfg(feature = "server")]
mod _bin {
	use anyhow as _;
	use clap as _;
	use config as _;
	use tracing_subscriber as _;
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::{
		CacheError, OutcomeCache, ResolutionCache,
		memory::MemoryResolutionCache,
		outcome::{FailureClass, ResolutionOutcome},
		ttl::TtlPolicy,
	},
	error::{Error, Result},
	identity::{Identity, Profile},
	middleware::{AuthMode, AuthRejection, CurrentIdentity, MaybeIdentity},
	provider::{
		IdentityProvider, ProviderError, VerifiedToken,
		firebase::{FirebaseConfig, FirebaseProvider},
		retry::RetryPolicy,
	},
	resolver::{AuthFailure, Dependency, ResolverConfig, TokenResolver},
	store::{StoreError, UserStore, memory::MemoryUserStore},
};
