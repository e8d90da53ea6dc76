/*
 * src/middleware.rs
 *
 * Bearer-token auth and the global rate limiter, applied ahead of the
 * planning routes. The client identity for rate limiting is the bearer token
 * when present, else the forwarded address, else a shared anonymous bucket.
 */

use std::sync::Arc;

use axum::{
	extract::Request,
	http::header,
	middleware::Next,
	response::{IntoResponse, Response},
};

use crate::error::{AppError, PlanError};
use crate::pipeline::Engine;

fn bearer_token(req: &Request) -> Option<String> {
	req.headers()
		.get(header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "))
		.map(str::to_string)
}

fn client_key(req: &Request) -> String {
	if let Some(token) = bearer_token(req) {
		return format!("tok:{token}");
	}
	req.headers()
		.get("x-forwarded-for")
		.and_then(|v| v.to_str().ok())
		.map(|v| format!("ip:{}", v.split(',').next().unwrap_or(v).trim()))
		.unwrap_or_else(|| "anonymous".to_string())
}

/// Auth for the planning API. Open when `ALLOW_UNAUTHENTICATED_API` is set or
/// when no token is configured (there is nothing to check against); otherwise
/// the bearer token must match.
pub async fn auth_middleware(req: Request, next: Next) -> Response {
	let Some(engine) = req.extensions().get::<Arc<Engine>>() else {
		return AppError::Internal("engine missing from extensions".into()).into_response();
	};
	let config = &engine.config;

	if !config.allow_unauthenticated_api {
		if let Some(expected) = &config.api_bearer_token {
			match bearer_token(&req) {
				Some(got) if got == *expected => {}
				Some(_) => return AppError::Forbidden.into_response(),
				None => return AppError::Unauthorized.into_response(),
			}
		}
	}

	next.run(req).await
}

/// Strict auth for diagnostics: always requires the configured token, even
/// when the rest of the API runs open.
pub async fn diagnostics_auth_middleware(req: Request, next: Next) -> Response {
	let Some(engine) = req.extensions().get::<Arc<Engine>>() else {
		return AppError::Internal("engine missing from extensions".into()).into_response();
	};
	match (&engine.config.api_bearer_token, bearer_token(&req)) {
		(Some(expected), Some(got)) if *expected == got => next.run(req).await,
		(Some(_), Some(_)) => AppError::Forbidden.into_response(),
		_ => AppError::Unauthorized.into_response(),
	}
}

/// Token-bucket rate limiting per client.
pub async fn rate_limit_middleware(req: Request, next: Next) -> Response {
	let Some(engine) = req.extensions().get::<Arc<Engine>>() else {
		return AppError::Internal("engine missing from extensions".into()).into_response();
	};
	let key = client_key(&req);
	if !engine.limiter.try_acquire(&key) {
		engine
			.metrics
			.requests_rate_limited
			.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
		return AppError::from(PlanError::RateLimited).into_response();
	}
	next.run(req).await
}
