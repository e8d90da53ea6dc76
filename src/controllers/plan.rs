/*
 * src/controllers/plan.rs
 *
 * File for Planning Controller API Endpoints
 *
 * Purpose:
 *   Serve the planning API.
 *
 * Include:
 *   api_plan - POST /plan -> plans an itinerary from a free-form message
 *   api_chat - POST /chat -> follow-up turns and edit patches on a session
 */

use std::sync::Arc;

use axum::{Extension, Json, http::StatusCode, routing::post};
use tracing::info;
use utoipa::OpenApi;

use crate::controllers::AxumRouter;
use crate::error::ApiResult;
use crate::http_models::plan::{ChatApiRequest, PlanApiRequest, seed_from};
use crate::middleware::{auth_middleware, rate_limit_middleware};
use crate::pipeline::{Engine, PlanOutput, PlanRequest, PlanStatus};

#[derive(OpenApi)]
#[openapi(
	paths(api_plan, api_chat),
	info(
		title = "Planning Routes",
		description = "Itinerary planning from natural-language requests."
	),
	tags((name = "Plan"))
)]
pub struct PlanApiDoc;

fn status_of(output: &PlanOutput) -> StatusCode {
	match output.status {
		PlanStatus::Done | PlanStatus::Clarifying => StatusCode::OK,
		PlanStatus::Error => match output.error_code.as_deref() {
			Some("input_invalid") => StatusCode::UNPROCESSABLE_ENTITY,
			Some("provider_unavailable") => StatusCode::SERVICE_UNAVAILABLE,
			Some("deadline_exceeded") => StatusCode::GATEWAY_TIMEOUT,
			Some("rate_limited") => StatusCode::TOO_MANY_REQUESTS,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		},
	}
}

/// Plan a trip from a free-form message.
///
/// # Method
/// `POST /plan`
///
/// # Request Body
/// - `message`: Natural-language trip request (required unless an edit patch is sent).
/// - `constraints`: Optional structured constraints, which outrank the parsed message.
/// - `user_profile`: Optional soft preferences.
/// - `metadata.edit_patch`: Optional local edit against the session's last plan.
#[utoipa::path(
	post,
	path = "/plan",
	summary = "Plan an itinerary",
	request_body(content = PlanApiRequest, content_type = "application/json"),
	responses(
		(status = 200, description = "Planned or clarifying", body = PlanOutput),
		(status = 422, description = "Input invalid"),
		(status = 429, description = "Rate limited"),
		(status = 503, description = "Required provider unavailable in strict mode")
	)
)]
pub async fn api_plan(
	Extension(engine): Extension<Arc<Engine>>,
	Json(payload): Json<PlanApiRequest>,
) -> ApiResult<(StatusCode, Json<PlanOutput>)> {
	info!(target: "api", "HANDLER ->> /plan 'api_plan'");

	let request = PlanRequest {
		message: payload.message,
		session_id: None,
		constraints: seed_from(payload.constraints, payload.user_profile),
		edit_patch: payload.metadata.and_then(|m| m.edit_patch),
	};
	let output = engine.plan(request).await;
	engine.store_plan(&output).await;
	Ok((status_of(&output), Json(output)))
}

/// Continue a planning conversation in an existing session.
///
/// # Method
/// `POST /chat`
///
/// `metadata.edit_patch` applies a local edit (replace/add/remove a stop,
/// adjust a time, force a lunch break) to the session's previous itinerary
/// and revalidates it; only the targeted day is re-time-boxed.
#[utoipa::path(
	post,
	path = "/chat",
	summary = "Follow-up turn on a session",
	request_body(content = ChatApiRequest, content_type = "application/json"),
	responses(
		(status = 200, description = "Planned or clarifying", body = PlanOutput),
		(status = 422, description = "Input invalid"),
		(status = 429, description = "Rate limited")
	)
)]
pub async fn api_chat(
	Extension(engine): Extension<Arc<Engine>>,
	Json(payload): Json<ChatApiRequest>,
) -> ApiResult<(StatusCode, Json<PlanOutput>)> {
	info!(target: "api", session_id = %payload.session_id, "HANDLER ->> /chat 'api_chat'");

	let request = PlanRequest {
		message: payload.message,
		session_id: Some(payload.session_id),
		constraints: None,
		edit_patch: payload.metadata.and_then(|m| m.edit_patch),
	};
	let output = engine.plan(request).await;
	engine.store_plan(&output).await;
	Ok((status_of(&output), Json(output)))
}

pub fn plan_routes() -> AxumRouter {
	AxumRouter::new()
		.route("/plan", post(api_plan))
		.route("/chat", post(api_chat))
		.route_layer(axum::middleware::from_fn(rate_limit_middleware))
		.route_layer(axum::middleware::from_fn(auth_middleware))
}
