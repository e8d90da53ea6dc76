/*
 * src/controllers/session.rs
 *
 * Read-only history endpoints: session listings, per-session transcripts and
 * plan export (JSON or markdown) by request id.
 */

use std::sync::Arc;

use axum::{
	Extension, Json,
	extract::{Path, Query},
	response::{IntoResponse, Response},
	routing::get,
};
use utoipa::OpenApi;

use crate::controllers::AxumRouter;
use crate::error::{ApiResult, AppError};
use crate::http_models::session::{ExportQuery, HistoryResponse, LimitQuery, SessionsResponse};
use crate::middleware::auth_middleware;
use crate::models::{Itinerary, PoiArena};
use crate::pipeline::Engine;

const DEFAULT_LIMIT: usize = 20;

#[derive(OpenApi)]
#[openapi(
	paths(api_sessions, api_session_history, api_export_plan),
	info(title = "Session Routes", description = "Read-only planning history."),
	tags((name = "Sessions"))
)]
pub struct SessionApiDoc;

#[utoipa::path(
	get,
	path = "/sessions",
	summary = "List sessions, most recent first",
	params(("limit" = Option<usize>, Query, description = "Max sessions returned")),
	responses((status = 200, body = SessionsResponse))
)]
pub async fn api_sessions(
	Extension(engine): Extension<Arc<Engine>>,
	Query(query): Query<LimitQuery>,
) -> ApiResult<Json<SessionsResponse>> {
	let sessions = engine
		.sessions
		.list(query.limit.unwrap_or(DEFAULT_LIMIT))
		.await;
	Ok(Json(SessionsResponse { sessions }))
}

#[utoipa::path(
	get,
	path = "/sessions/{id}/history",
	summary = "Message transcript of one session",
	params(
		("id" = String, Path, description = "Session id"),
		("limit" = Option<usize>, Query, description = "Max entries returned")
	),
	responses((status = 200, body = HistoryResponse), (status = 404, description = "Unknown session"))
)]
pub async fn api_session_history(
	Extension(engine): Extension<Arc<Engine>>,
	Path(id): Path<String>,
	Query(query): Query<LimitQuery>,
) -> ApiResult<Json<HistoryResponse>> {
	let session = engine
		.sessions
		.get(&id)
		.ok_or_else(|| AppError::NotFound(format!("session {id}")))?;
	let data = session.data.lock().await;
	let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
	let entries = data
		.history
		.iter()
		.rev()
		.take(limit)
		.rev()
		.cloned()
		.collect();
	Ok(Json(HistoryResponse {
		session_id: id,
		entries,
	}))
}

/// Renders a finished plan as markdown, day by day.
pub fn render_markdown(itinerary: &Itinerary, arena: &PoiArena) -> String {
	let mut out = String::new();
	out.push_str(&format!(
		"# {} - {} day itinerary\n\n",
		itinerary.city,
		itinerary.days.len()
	));
	for day in &itinerary.days {
		match day.date {
			Some(date) => out.push_str(&format!("## Day {} ({date})\n\n", day.day_number)),
			None => out.push_str(&format!("## Day {}\n\n", day.day_number)),
		}
		for item in &day.items {
			let name = arena
				.get(&item.poi_id)
				.map(|p| p.name.as_str())
				.unwrap_or(item.poi_id.as_str());
			out.push_str(&format!(
				"- {}–{} **{}**",
				item.start_time.format("%H:%M"),
				item.end_time.format("%H:%M"),
				name
			));
			if item.travel_minutes > 0 {
				out.push_str(&format!(" _(travel {} min)_", item.travel_minutes));
			}
			out.push('\n');
		}
		if !day.backups.is_empty() {
			let names: Vec<&str> = day
				.backups
				.iter()
				.map(|b| {
					arena
						.get(&b.poi_id)
						.map(|p| p.name.as_str())
						.unwrap_or(b.poi_id.as_str())
				})
				.collect();
			out.push_str(&format!("\nBackups: {}\n", names.join(", ")));
		}
		out.push('\n');
	}
	out.push_str(&format!(
		"Estimated cost: {:.0} (tickets {:.0}, transport {:.0}, food {:.0})\n",
		itinerary.total_cost,
		itinerary.budget_breakdown.tickets,
		itinerary.budget_breakdown.local_transport,
		itinerary.budget_breakdown.food_min
	));
	if !itinerary.assumptions.is_empty() {
		out.push_str("\nAssumptions:\n");
		for assumption in &itinerary.assumptions {
			out.push_str(&format!("- {assumption}\n"));
		}
	}
	out
}

#[utoipa::path(
	get,
	path = "/plans/{request_id}/export",
	summary = "Export a finished plan",
	params(
		("request_id" = String, Path, description = "Request id of the plan"),
		("format" = Option<String>, Query, description = "json (default) or markdown")
	),
	responses((status = 200, description = "The plan"), (status = 404, description = "Unknown plan"))
)]
pub async fn api_export_plan(
	Extension(engine): Extension<Arc<Engine>>,
	Path(request_id): Path<String>,
	Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
	let plan = engine
		.plans
		.get(&request_id)
		.ok_or_else(|| AppError::NotFound(format!("plan {request_id}")))?;

	match query.format.as_deref() {
		Some("markdown") => {
			let body = render_markdown(&plan.itinerary, &plan.arena);
			Ok(([("content-type", "text/markdown; charset=utf-8")], body).into_response())
		}
		Some("json") | None => Ok(Json(plan.itinerary).into_response()),
		Some(other) => Err(AppError::Unprocessable(format!("unknown format {other}"))),
	}
}

pub fn session_routes() -> AxumRouter {
	AxumRouter::new()
		.route("/sessions", get(api_sessions))
		.route("/sessions/{id}/history", get(api_session_history))
		.route("/plans/{request_id}/export", get(api_export_plan))
		.route_layer(axum::middleware::from_fn(auth_middleware))
}
