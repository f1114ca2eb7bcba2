//! axum adapter attaching resolved identities to requests.
//!
//! ```ignore
//! let app = Router::new()
//! 	.route("/api/v1/me", get(me))
//! 	.route_layer(axum::middleware::from_fn_with_state(resolver, require_identity));
//! ```

// std
use std::convert::Infallible;
// crates.io
use axum::{
	Json,
	extract::{FromRequestParts, Request, State},
	middleware::Next,
	response::{IntoResponse, Response},
};
use http::{
	HeaderMap, HeaderValue, Method, StatusCode,
	header::{ACCESS_CONTROL_REQUEST_METHOD, AUTHORIZATION, WWW_AUTHENTICATE},
	request::Parts,
};
use serde_json::json;
// self
use crate::{
	identity::Identity,
	resolver::{AuthFailure, TokenResolver},
};

/// How a route treats requests without a usable `Authorization` header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthMode {
	/// Reject with 401.
	#[default]
	Required,
	/// Let the request through anonymously.
	Optional,
}

/// Identity attached by the middleware; extracting it on an unprotected route is a 500.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentIdentity(pub Identity);
impl<S> FromRequestParts<S> for CurrentIdentity
where
	S: Send + Sync,
{
	type Rejection = AuthRejection;

	async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
		parts.extensions.get::<Self>().cloned().ok_or_else(|| {
			tracing::error!("identity extractor used on a route without identity middleware");

			AuthRejection::Internal
		})
	}
}

/// Identity attached by the middleware, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaybeIdentity(pub Option<Identity>);
impl<S> FromRequestParts<S> for MaybeIdentity
where
	S: Send + Sync,
{
	type Rejection = Infallible;

	async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
		Ok(Self(parts.extensions.get::<CurrentIdentity>().map(|current| current.0.clone())))
	}
}

/// Transport rendering of an authentication failure; never carries internal detail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthRejection {
	/// 401 with `WWW-Authenticate: Bearer`.
	Unauthorized,
	/// 500.
	Internal,
}
impl From<&AuthFailure> for AuthRejection {
	fn from(failure: &AuthFailure) -> Self {
		match failure {
			AuthFailure::Unauthenticated { .. } => Self::Unauthorized,
			AuthFailure::SystemFailure { .. } => Self::Internal,
		}
	}
}
impl IntoResponse for AuthRejection {
	fn into_response(self) -> Response {
		match self {
			Self::Unauthorized => {
				let mut response =
					(StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unauthorized" })))
						.into_response();

				response.headers_mut().insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));

				response
			},
			Self::Internal => (
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(json!({ "message": "Internal Server Error" })),
			)
				.into_response(),
		}
	}
}

/// Middleware rejecting requests that carry no resolvable bearer token.
pub async fn require_identity(
	State(resolver): State<TokenResolver>,
	req: Request,
	next: Next,
) -> Response {
	authenticate(&resolver, AuthMode::Required, req, next).await
}

/// Middleware resolving a bearer token when present and passing anonymous requests through.
pub async fn optional_identity(
	State(resolver): State<TokenResolver>,
	req: Request,
	next: Next,
) -> Response {
	authenticate(&resolver, AuthMode::Optional, req, next).await
}

/// Resolve the request's bearer token per `mode` and attach a [`CurrentIdentity`].
///
/// A token that is present but rejected fails the request in either mode.
pub async fn authenticate(
	resolver: &TokenResolver,
	mode: AuthMode,
	mut req: Request,
	next: Next,
) -> Response {
	if is_preflight_request(req.method(), req.headers()) {
		return next.run(req).await;
	}

	let Some(token) = extract_bearer_token(req.headers()) else {
		return match mode {
			AuthMode::Required => {
				tracing::debug!("missing or malformed authorization header");

				AuthRejection::Unauthorized.into_response()
			},
			AuthMode::Optional => next.run(req).await,
		};
	};

	match resolver.resolve(token).await {
		Ok(identity) => {
			req.extensions_mut().insert(CurrentIdentity(identity));

			next.run(req).await
		},
		Err(failure) => {
			tracing::debug!(error = %failure, "request rejected");

			AuthRejection::from(&failure).into_response()
		},
	}
}

/// Token following a case-insensitive `Bearer` scheme; `None` when absent, malformed, or empty.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
	let (scheme, token) = value.split_once(' ')?;
	let token = token.trim();

	(scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn is_preflight_request(method: &Method, headers: &HeaderMap) -> bool {
	method == Method::OPTIONS && headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}
