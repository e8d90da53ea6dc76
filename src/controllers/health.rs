use axum::{Json, routing::get};
use serde_json::{Value, json};
use utoipa::OpenApi;

use crate::controllers::AxumRouter;

#[derive(OpenApi)]
#[openapi(
	paths(api_health),
	info(title = "Health Routes", description = "Liveness probe."),
	tags((name = "Health"))
)]
pub struct HealthApiDoc;

#[utoipa::path(
	get,
	path = "/health",
	summary = "Liveness probe",
	responses((status = 200, description = "Service is up", content_type = "application/json"))
)]
pub async fn api_health() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}

pub fn health_routes() -> AxumRouter {
	AxumRouter::new().route("/health", get(api_health))
}
