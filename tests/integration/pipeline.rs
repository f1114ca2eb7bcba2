//! End-to-end resolution against a mocked Identity Toolkit with in-memory store and cache.

// std
use std::sync::Arc;
// crates.io
use axum::{Json, Router, body::Body, routing::get};
use bearer_identity::{
	AuthFailure, CurrentIdentity, Dependency, FailureClass, FirebaseProvider, Identity,
	MemoryResolutionCache, MemoryUserStore, ResolverConfig, Result, TokenResolver, UserStore,
	middleware::require_identity,
};
use http::{Request, StatusCode, header::AUTHORIZATION};
use serde_json::json;
use tower::ServiceExt;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_json, method, path},
};
// self
use crate::support::{self, PROJECT_ID};

struct Pipeline {
	resolver: TokenResolver,
	store: Arc<MemoryUserStore>,
}

fn pipeline(server: &MockServer) -> Result<Pipeline> {
	let provider = FirebaseProvider::new(support::config_for(server))?;
	let store = Arc::new(MemoryUserStore::new());
	let resolver = TokenResolver::new(
		Arc::new(provider),
		store.clone(),
		Arc::new(MemoryResolutionCache::new()),
		ResolverConfig::default(),
	)?;

	Ok(Pipeline { resolver, store })
}

async fn mount_account(server: &MockServer, token: &str, subject: &str, display_name: &str) {
	Mock::given(method("POST"))
		.and(path("/v1/accounts:lookup"))
		.and(body_json(json!({ "idToken": token })))
		.respond_with(
			ResponseTemplate::new(200).set_body_json(json!({ "users": [{ "localId": subject }] })),
		)
		.expect(1)
		.mount(server)
		.await;
	Mock::given(method("POST"))
		.and(path(format!("/v1/projects/{PROJECT_ID}/accounts:lookup")))
		.and(body_json(json!({ "localId": [subject] })))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"users": [{
				"localId": subject,
				"displayName": display_name,
				"email": format!("{subject}@example.com")
			}]
		})))
		.expect(1)
		.mount(server)
		.await;
}

#[tokio::test]
async fn first_login_provisions_then_serves_from_cache() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;
	let token = support::id_token("sub-A");

	mount_account(&server, &token, "sub-A", "Ann").await;

	let Pipeline { resolver, store } = pipeline(&server)?;
	let first = resolver.resolve(&token).await.expect("provisioned");
	let second = resolver.resolve(&token).await.expect("cached");

	assert!(first.is_persisted());
	assert_eq!(first.external_subject, "sub-A");
	assert_eq!(first.display_name, "Ann");
	assert_eq!(first.email, "sub-A@example.com");
	assert_eq!(second, first);
	assert_eq!(store.len().await, 1);
	assert_eq!(
		store.find_by_internal_id(&first.internal_id).await.expect("stored").external_subject,
		"sub-A"
	);

	let metrics = resolver.metrics();

	assert_eq!(metrics.provisioned, 1);
	assert_eq!(metrics.cache_hits, 1);

	Ok(())
}

#[tokio::test]
async fn rejected_token_is_negatively_cached() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;
	let token = support::id_token("forged");

	Mock::given(method("POST"))
		.and(path("/v1/accounts:lookup"))
		.respond_with(ResponseTemplate::new(400).set_body_json(json!({
			"error": { "code": 400, "message": "INVALID_ID_TOKEN" }
		})))
		.expect(1)
		.mount(&server)
		.await;

	let Pipeline { resolver, store } = pipeline(&server)?;

	for _ in 0..2 {
		assert!(matches!(
			resolver.resolve(&token).await,
			Err(AuthFailure::Unauthenticated { class: Some(FailureClass::InvalidToken), .. })
		));
	}

	assert!(store.is_empty().await);

	let metrics = resolver.metrics();

	assert_eq!(metrics.resolutions, 2);
	assert_eq!(metrics.negative_hits, 1);

	Ok(())
}

#[tokio::test]
async fn provider_outage_is_never_cached() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;
	let token = support::id_token("sub-A");

	// Two resolutions, each an initial attempt plus two retries.
	Mock::given(method("POST"))
		.and(path("/v1/accounts:lookup"))
		.respond_with(ResponseTemplate::new(503))
		.expect(6)
		.mount(&server)
		.await;

	let Pipeline { resolver, .. } = pipeline(&server)?;

	for _ in 0..2 {
		assert!(matches!(
			resolver.resolve(&token).await,
			Err(AuthFailure::SystemFailure { dependency: Dependency::Provider, .. })
		));
	}

	assert_eq!(resolver.metrics().system_failures, 2);

	Ok(())
}

#[tokio::test]
async fn middleware_serves_resolved_identity() -> Result<()> {
	support::init_tracing();

	let server = MockServer::start().await;
	let token = support::id_token("sub-B");

	mount_account(&server, &token, "sub-B", "Bea").await;

	let Pipeline { resolver, .. } = pipeline(&server)?;
	let app = Router::new()
		.route(
			"/api/v1/me",
			get(|CurrentIdentity(identity): CurrentIdentity| async move { Json(identity) }),
		)
		.route_layer(axum::middleware::from_fn_with_state(resolver, require_identity));

	for _ in 0..2 {
		let response = app
			.clone()
			.oneshot(
				Request::builder()
					.uri("/api/v1/me")
					.header(AUTHORIZATION, format!("Bearer {token}"))
					.body(Body::empty())
					.expect("request"),
			)
			.await
			.expect("response");

		assert_eq!(response.status(), StatusCode::OK);

		let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
		let identity = serde_json::from_slice::<Identity>(&body).expect("identity json");

		assert_eq!(identity.external_subject, "sub-B");
		assert_eq!(identity.display_name, "Bea");
	}

	let response = app
		.oneshot(Request::builder().uri("/api/v1/me").body(Body::empty()).expect("request"))
		.await
		.expect("response");

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	Ok(())
}
