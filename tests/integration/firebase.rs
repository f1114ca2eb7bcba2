//! Firebase client behaviour against a mocked Identity Toolkit.

// crates.io
use bearer_identity::{FirebaseProvider, IdentityProvider, ProviderError, Result};
use serde_json::json;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_json, header, method, path, query_param},
};
// self
use crate::support::{self, API_KEY, PROJECT_ID};

const LOOKUP: &str = "/v1/accounts:lookup";

fn admin_lookup() -> String {
	format!("/v1/projects/{PROJECT_ID}/accounts:lookup")
}

fn rejection(code: &str) -> ResponseTemplate {
	ResponseTemplate::new(400)
		.set_body_json(json!({ "error": { "code": 400, "message": code, "errors": [] } }))
}

#[tokio::test]
async fn verify_returns_local_id_and_token_expiry() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;
	let token = support::id_token("sub-A");

	Mock::given(method("POST"))
		.and(path(LOOKUP))
		.and(query_param("key", API_KEY))
		.and(body_json(json!({ "idToken": token })))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "identitytoolkit#GetAccountInfoResponse",
			"users": [{ "localId": "sub-A", "email": "ann@example.com" }]
		})))
		.expect(1)
		.mount(&server)
		.await;

	let provider = FirebaseProvider::new(support::config_for(&server))?;
	let verified = provider.verify_token(&token).await.expect("verified");

	assert_eq!(verified.subject, "sub-A");
	assert!(verified.expires_at.is_some());

	Ok(())
}

#[tokio::test]
async fn rejection_codes_map_to_stable_errors() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;
	let expired = support::id_token("expired");
	let deleted = support::id_token("deleted");

	Mock::given(method("POST"))
		.and(path(LOOKUP))
		.and(body_json(json!({ "idToken": expired })))
		.respond_with(rejection("TOKEN_EXPIRED"))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path(LOOKUP))
		.and(body_json(json!({ "idToken": deleted })))
		.respond_with(rejection("USER_NOT_FOUND"))
		.expect(1)
		.mount(&server)
		.await;

	let provider = FirebaseProvider::new(support::config_for(&server))?;

	assert!(matches!(provider.verify_token(&expired).await, Err(ProviderError::Invalid(_))));
	assert!(matches!(
		provider.verify_token(&deleted).await,
		Err(ProviderError::SubjectNotFound(_))
	));

	Ok(())
}

#[tokio::test]
async fn empty_user_list_means_unknown_subject() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path(LOOKUP))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "users": [] })))
		.mount(&server)
		.await;

	let provider = FirebaseProvider::new(support::config_for(&server))?;

	assert!(matches!(
		provider.verify_token(&support::id_token("ghost")).await,
		Err(ProviderError::SubjectNotFound(_))
	));

	Ok(())
}

#[tokio::test]
async fn malformed_token_is_rejected_without_a_round_trip() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path(LOOKUP))
		.respond_with(ResponseTemplate::new(200))
		.expect(0)
		.mount(&server)
		.await;

	let provider = FirebaseProvider::new(support::config_for(&server))?;

	assert!(matches!(provider.verify_token("not-a-jwt").await, Err(ProviderError::Invalid(_))));

	Ok(())
}

#[tokio::test]
async fn transient_failures_are_retried() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path(LOOKUP))
		.respond_with(ResponseTemplate::new(503))
		.up_to_n_times(1)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path(LOOKUP))
		.respond_with(
			ResponseTemplate::new(200).set_body_json(json!({ "users": [{ "localId": "sub-R" }] })),
		)
		.expect(1)
		.mount(&server)
		.await;

	let provider = FirebaseProvider::new(support::config_for(&server))?;
	let verified = provider.verify_token(&support::id_token("sub-R")).await.expect("verified");

	assert_eq!(verified.subject, "sub-R");

	Ok(())
}

#[tokio::test]
async fn persistent_outage_surfaces_server_error_after_retries() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;

	// Initial attempt plus two retries.
	Mock::given(method("POST"))
		.and(path(LOOKUP))
		.respond_with(ResponseTemplate::new(500))
		.expect(3)
		.mount(&server)
		.await;

	let provider = FirebaseProvider::new(support::config_for(&server))?;

	assert!(matches!(
		provider.verify_token(&support::id_token("sub-A")).await,
		Err(ProviderError::Server(_))
	));

	Ok(())
}

#[tokio::test]
async fn profile_lookup_uses_admin_credential() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path(admin_lookup()))
		.and(header("authorization", "Bearer owner"))
		.and(body_json(json!({ "localId": ["sub-A"] })))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"users": [{
				"localId": "sub-A",
				"displayName": "Ann",
				"email": "ann@example.com",
				"phoneNumber": "+15550100",
				"photoUrl": "https://example.com/ann.png",
				"disabled": false
			}]
		})))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path(admin_lookup()))
		.and(body_json(json!({ "localId": ["ghost"] })))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "lookup" })))
		.mount(&server)
		.await;

	let provider = FirebaseProvider::new(support::config_for(&server))?;
	let profile = provider.get_profile("sub-A").await.expect("profile");

	assert_eq!(profile.external_subject, "sub-A");
	assert_eq!(profile.display_name, "Ann");
	assert_eq!(profile.phone_number, "+15550100");
	assert_eq!(profile.photo_url, "https://example.com/ann.png");
	assert!(matches!(provider.get_profile("ghost").await, Err(ProviderError::SubjectNotFound(_))));

	Ok(())
}
