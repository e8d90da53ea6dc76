/*
 * src/controllers/diagnostics.rs
 *
 * Operational surface: metrics as JSON, metrics as Prometheus text, and a
 * token-protected diagnostics snapshot (config with secrets redacted,
 * provider wiring, cache stats).
 */

use std::sync::Arc;

use axum::{
	Extension, Json,
	response::{IntoResponse, Response},
	routing::get,
};
use serde_json::{Value, json};
use utoipa::OpenApi;

use crate::controllers::AxumRouter;
use crate::error::ApiResult;
use crate::middleware::diagnostics_auth_middleware;
use crate::pipeline::Engine;

#[derive(OpenApi)]
#[openapi(
	paths(api_metrics, api_metrics_prometheus, api_diagnostics),
	info(title = "Diagnostics Routes", description = "Operational metrics and diagnostics."),
	tags((name = "Diagnostics"))
)]
pub struct DiagnosticsApiDoc;

#[utoipa::path(
	get,
	path = "/metrics",
	summary = "Process metrics as JSON",
	responses((status = 200, content_type = "application/json"))
)]
pub async fn api_metrics(Extension(engine): Extension<Arc<Engine>>) -> Json<Value> {
	Json(engine.metrics.as_json())
}

#[utoipa::path(
	get,
	path = "/metrics/prometheus",
	summary = "Process metrics in Prometheus text format",
	responses((status = 200, content_type = "text/plain"))
)]
pub async fn api_metrics_prometheus(Extension(engine): Extension<Arc<Engine>>) -> Response {
	(
		[("content-type", "text/plain; version=0.0.4")],
		engine.metrics.render_prometheus(),
	)
		.into_response()
}

fn redact(value: &Option<String>) -> Value {
	match value {
		Some(_) => json!("<set>"),
		None => json!(null),
	}
}

#[utoipa::path(
	get,
	path = "/diagnostics",
	summary = "Configuration and provider snapshot",
	description = "Requires the API bearer token even when the rest of the API is open.",
	responses((status = 200, content_type = "application/json"), (status = 401, description = "Missing token"))
)]
pub async fn api_diagnostics(Extension(engine): Extension<Arc<Engine>>) -> ApiResult<Json<Value>> {
	let config = &engine.config;
	let (poi_hits, poi_misses) = engine.poi_cache.stats();
	let (route_hits, route_misses) = engine.route_cache.stats();
	let (engine_version, strict_required_fields) = engine.flags.snapshot();

	Ok(Json(json!({
		"uptime_secs": engine.metrics.uptime_secs(),
		"config": {
			"poi_provider_key": redact(&config.poi_provider_key),
			"llm_provider_key": redact(&config.llm_provider_key),
			"llm_provider_priority": &config.llm_provider_priority,
			"routing_provider": format!("{:?}", config.routing_provider),
			"strict_external_data": config.strict_external_data,
			"max_repair_rounds": config.max_repair_rounds,
			"request_deadline_secs": config.request_deadline.as_secs(),
			"rate_limit_max": config.rate_limit_max,
			"rate_limit_window_secs": config.rate_limit_window.as_secs(),
			"poi_dataset_path": &config.poi_dataset_path,
			"env_source": &config.env_source,
		},
		"runtime_flags": {
			"engine_version": engine_version,
			"strict_required_fields": strict_required_fields,
		},
		"providers": {
			"poi": engine.providers.poi_provider_name(),
			"route": engine.providers.route_provider_name(),
			"llm": engine.providers.llm_provider_name(),
			"curated_cities": engine.providers.curated.city_count(),
		},
		"caches": {
			"poi_query": { "entries": engine.poi_cache.len(), "hits": poi_hits, "misses": poi_misses },
			"route": { "entries": engine.route_cache.len(), "hits": route_hits, "misses": route_misses },
		},
		"sessions": engine.sessions.len(),
		"plans": engine.plans.len(),
	})))
}

pub fn diagnostics_routes() -> AxumRouter {
	let protected = AxumRouter::new()
		.route("/diagnostics", get(api_diagnostics))
		.route_layer(axum::middleware::from_fn(diagnostics_auth_middleware));
	AxumRouter::new()
		.route("/metrics", get(api_metrics))
		.route("/metrics/prometheus", get(api_metrics_prometheus))
		.merge(protected)
}
