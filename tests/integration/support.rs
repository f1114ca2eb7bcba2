// std
use std::time::Duration;
// crates.io
use base64::prelude::*;
use bearer_identity::{FirebaseConfig, RetryPolicy, provider::retry::JitterStrategy};
use chrono::{TimeDelta, Utc};
use url::Url;
use wiremock::MockServer;

pub const PROJECT_ID: &str = "demo-project";
pub const API_KEY: &str = "fake-api-key";

/// Unsigned emulator-style ID token for `subject`, expiring in one hour.
pub fn id_token(subject: &str) -> String {
	let header = BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
	let exp = (Utc::now() + TimeDelta::hours(1)).timestamp();
	let claims = BASE64_URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{subject}","exp":{exp}}}"#));

	format!("{header}.{claims}.")
}

/// Config pointed at `server` with a short deterministic retry schedule.
pub fn config_for(server: &MockServer) -> FirebaseConfig {
	let retry = RetryPolicy {
		max_retries: 2,
		initial_backoff: Duration::from_millis(5),
		max_backoff: Duration::from_millis(10),
		jitter: JitterStrategy::None,
		..Default::default()
	};

	FirebaseConfig::new(PROJECT_ID, API_KEY)
		.with_endpoint(Url::parse(&server.uri()).expect("mock server uri"))
		.with_require_https(false)
		.with_admin_token("owner")
		.with_retry(retry)
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}
