//! bearer-identity HTTP server.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `BEARER_IDENTITY__*` environment variables, wires the Firebase provider, a user store,
//! and a resolution cache into a [`TokenResolver`], and serves:
//!
//! - `GET /api/health/liveness`, `GET /api/health/readiness`
//! - `GET /api/v1/me` (authenticated)
//! - `GET /api/v1/user/{user_id}` (authenticated, owner only)
//! - `GET /metrics` (with the `prometheus` feature)

// std
use std::{path::PathBuf, sync::Arc, time::Duration};
// crates.io
use anyhow::Context as _;
use axum::{
	Json, Router,
	extract::{Path, Request},
	http::{HeaderValue, Method, StatusCode, header},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::get,
};
use bearer_identity::{
	CurrentIdentity, FirebaseConfig, FirebaseProvider, MemoryResolutionCache, MemoryUserStore,
	ResolutionCache, ResolverConfig, TokenResolver, UserStore, middleware::require_identity,
	store::sqlite::SqliteUserStore,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Bearer token identity resolution server")]
struct Cli {
	/// Path to the TOML configuration file.
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Settings {
	#[serde(default)]
	server: ServerSettings,
	firebase: FirebaseConfig,
	#[serde(default)]
	resolver: ResolverConfig,
	#[serde(default)]
	sqlite: Option<SqliteSettings>,
	#[serde(default)]
	redis: Option<RedisSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ServerSettings {
	host: String,
	port: u16,
}
impl Default for ServerSettings {
	fn default() -> Self {
		Self { host: "0.0.0.0".into(), port: 8080 }
	}
}

#[derive(Debug, Deserialize)]
struct SqliteSettings {
	path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RedisSettings {
	url: String,
}

#[derive(Debug, Serialize)]
struct UserResponse {
	user_id: String,
	display_name: String,
	email: String,
	phone_number: String,
	photo_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy(),
		)
		.init();

	let cli = Cli::parse();
	let settings = config::Config::builder()
		.add_source(config::File::from(cli.config).required(false))
		.add_source(
			config::Environment::with_prefix("BEARER_IDENTITY")
				.prefix_separator("__")
				.separator("__"),
		)
		.build()
		.context("failed to read configuration")?
		.try_deserialize::<Settings>()
		.context("failed to deserialise configuration")?;

	#[cfg(feature = "prometheus")]
	bearer_identity::install_default_exporter().context("failed to install metrics exporter")?;

	let provider = FirebaseProvider::new(settings.firebase).context("invalid firebase config")?;
	let store: Arc<dyn UserStore> = match &settings.sqlite {
		Some(sqlite) => Arc::new(
			SqliteUserStore::open(&sqlite.path)
				.await
				.with_context(|| format!("failed to open user store at {:?}", sqlite.path))?,
		),
		None => {
			tracing::warn!("no sqlite store configured; users are kept in memory only");

			Arc::new(MemoryUserStore::new())
		},
	};
	let cache = build_cache(settings.redis.as_ref())?;
	let resolver = TokenResolver::new(Arc::new(provider), store, cache, settings.resolver)
		.context("invalid resolver config")?;
	let resolver_provider = resolver.provider_name().to_owned();
	let app = router(resolver);
	let address = format!("{}:{}", settings.server.host, settings.server.port);
	let listener =
		TcpListener::bind(&address).await.with_context(|| format!("failed to bind {address}"))?;

	tracing::info!(provider = resolver_provider, "listening on http://{address}");

	axum::serve(listener, app).await.context("server error")?;

	Ok(())
}

fn build_cache(redis: Option<&RedisSettings>) -> anyhow::Result<Arc<dyn ResolutionCache>> {
	match redis {
		#[cfg(feature = "redis")]
		Some(redis) => Ok(Arc::new(
			bearer_identity::cache::redis::RedisResolutionCache::open(&redis.url)
				.context("invalid redis url")?,
		)),
		#[cfg(not(feature = "redis"))]
		Some(redis) => anyhow::bail!(
			"redis cache at {} requested but the `redis` feature is disabled",
			redis.url
		),
		None => {
			let cache = Arc::new(MemoryResolutionCache::new());
			let sweeper = cache.clone();

			tokio::spawn(async move {
				let mut interval = tokio::time::interval(Duration::from_secs(60));

				loop {
					interval.tick().await;

					let purged = sweeper.purge_expired().await;

					if purged > 0 {
						tracing::debug!(purged, "purged expired cache entries");
					}
				}
			});

			Ok(cache)
		},
	}
}

fn router(resolver: TokenResolver) -> Router {
	let health = Router::new().route("/liveness", get(ok)).route("/readiness", get(ok));
	let v1 = Router::new()
		.route("/me", get(me))
		.route("/user/{user_id}", get(user))
		.route_layer(middleware::from_fn_with_state(resolver, require_identity));

	let router = Router::new().nest("/api/health", health).nest("/api/v1", v1);
	#[cfg(feature = "prometheus")]
	let router = router.route("/metrics", get(scrape));

	router.fallback(not_found).layer(middleware::from_fn(cors))
}

#[cfg(feature = "prometheus")]
async fn scrape() -> Response {
	match bearer_identity::metrics::prometheus_handle() {
		Some(handle) => handle.render().into_response(),
		None => not_found().await,
	}
}

async fn ok() -> Json<serde_json::Value> {
	Json(json!({ "message": "OK" }))
}

async fn not_found() -> Response {
	(StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response()
}

async fn me(CurrentIdentity(identity): CurrentIdentity) -> Json<bearer_identity::Identity> {
	Json(identity)
}

async fn user(
	CurrentIdentity(identity): CurrentIdentity,
	Path(user_id): Path<String>,
) -> Response {
	if identity.internal_id != user_id {
		return (StatusCode::FORBIDDEN, Json(json!({ "message": "Forbidden" }))).into_response();
	}

	Json(UserResponse {
		user_id: identity.internal_id,
		display_name: identity.display_name,
		email: identity.email,
		phone_number: identity.phone_number,
		photo_url: identity.photo_url,
	})
	.into_response()
}

async fn cors(req: Request, next: Next) -> Response {
	let mut response = if req.method() == Method::OPTIONS {
		StatusCode::NO_CONTENT.into_response()
	} else {
		next.run(req).await
	};
	let headers = response.headers_mut();

	headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
	headers.insert(
		header::ACCESS_CONTROL_ALLOW_METHODS,
		HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
	);
	headers.insert(
		header::ACCESS_CONTROL_ALLOW_HEADERS,
		HeaderValue::from_static("Content-Type, Authorization"),
	);
	headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("Authorization"));

	response
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashMap;
	// crates.io
	use async_trait::async_trait;
	use axum::body::Body;
	use bearer_identity::{IdentityProvider, Profile, ProviderError, VerifiedToken};
	use serde_json::Value;
	use tower::ServiceExt;
	// self
	use super::*;

	struct StaticProvider {
		subjects: HashMap<&'static str, &'static str>,
	}
	#[async_trait]
	impl IdentityProvider for StaticProvider {
		fn name(&self) -> &str {
			"static"
		}

		async fn verify_token(&self, token: &str) -> Result<VerifiedToken, ProviderError> {
			self.subjects
				.get(token)
				.map(|subject| VerifiedToken::new(*subject))
				.ok_or_else(|| ProviderError::Invalid("unknown token".into()))
		}

		async fn get_profile(&self, subject: &str) -> Result<Profile, ProviderError> {
			Ok(Profile::new(subject)
				.with_display_name(format!("{subject} name"))
				.with_email(format!("{subject}@example.com")))
		}
	}

	fn app() -> Router {
		let provider =
			StaticProvider { subjects: HashMap::from([("tok-A", "sub-A"), ("tok-B", "sub-B")]) };
		let resolver = TokenResolver::new(
			Arc::new(provider),
			Arc::new(MemoryUserStore::new()),
			Arc::new(MemoryResolutionCache::new()),
			ResolverConfig::default(),
		)
		.expect("resolver");

		router(resolver)
	}

	async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>) -> Response {
		let mut request = axum::http::Request::builder().method(method).uri(uri);

		if let Some(token) = token {
			request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
		}

		app.clone().oneshot(request.body(Body::empty()).expect("request")).await.expect("response")
	}

	async fn json_body(response: Response) -> Value {
		let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");

		serde_json::from_slice(&body).expect("json body")
	}

	async fn internal_id(app: &Router, token: &str) -> String {
		let response = send(app, Method::GET, "/api/v1/me", Some(token)).await;

		assert_eq!(response.status(), StatusCode::OK);

		json_body(response).await["internal_id"].as_str().expect("internal id").to_owned()
	}

	#[tokio::test]
	async fn owner_reads_own_user_record() {
		let app = app();
		let id = internal_id(&app, "tok-A").await;
		let response = send(&app, Method::GET, &format!("/api/v1/user/{id}"), Some("tok-A")).await;

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(
			json_body(response).await,
			json!({
				"user_id": id,
				"display_name": "sub-A name",
				"email": "sub-A@example.com",
				"phone_number": "",
				"photo_url": "",
			})
		);
	}

	#[tokio::test]
	async fn other_users_record_is_forbidden() {
		let app = app();
		let other = internal_id(&app, "tok-B").await;
		let response =
			send(&app, Method::GET, &format!("/api/v1/user/{other}"), Some("tok-A")).await;

		assert_eq!(response.status(), StatusCode::FORBIDDEN);
		assert_eq!(json_body(response).await, json!({ "message": "Forbidden" }));
	}

	#[tokio::test]
	async fn user_route_requires_a_token() {
		let response = send(&app(), Method::GET, "/api/v1/user/anything", None).await;

		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}

	#[tokio::test]
	async fn unknown_path_is_json_not_found() {
		let response = send(&app(), Method::GET, "/nope", None).await;

		assert_eq!(response.status(), StatusCode::NOT_FOUND);
		assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
		assert_eq!(json_body(response).await, json!({ "message": "Not Found" }));
	}

	#[tokio::test]
	async fn preflight_short_circuits_with_cors_headers() {
		let response = send(&app(), Method::OPTIONS, "/api/v1/me", None).await;
		let headers = response.headers();

		assert_eq!(response.status(), StatusCode::NO_CONTENT);
		assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
		assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, PUT, DELETE, OPTIONS");
		assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type, Authorization");
		assert_eq!(headers[header::ACCESS_CONTROL_EXPOSE_HEADERS], "Authorization");
	}

	#[tokio::test]
	async fn health_probes_answer_ok() {
		let app = app();

		for uri in ["/api/health/liveness", "/api/health/readiness"] {
			let response = send(&app, Method::GET, uri, None).await;

			assert_eq!(response.status(), StatusCode::OK);
			assert_eq!(json_body(response).await, json!({ "message": "OK" }));
		}
	}

	#[cfg(feature = "prometheus")]
	#[tokio::test]
	async fn metrics_route_renders_exporter_output() {
		bearer_identity::install_default_exporter().expect("exporter");

		let app = app();

		internal_id(&app, "tok-A").await;

		let response = send(&app, Method::GET, "/metrics", None).await;

		assert_eq!(response.status(), StatusCode::OK);

		let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");

		assert!(String::from_utf8_lossy(&body).contains("bearer_identity"));
	}
}
