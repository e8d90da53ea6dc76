/*
 * tests/api.rs
 *
 * Router-level tests via tower::ServiceExt::oneshot; no sockets, no network.
 */

extern crate wayfarer as app;

use std::sync::Arc;
use std::time::Duration;

use axum::Extension;
use axum::body::{Body, to_bytes};
use http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use app::config::Config;
use app::controllers::{api_router, into_service_router};
use app::pipeline::Engine;

fn app_with(config: Config) -> (axum::Router, Arc<Engine>) {
	let engine = Arc::new(Engine::new(config));
	let router = into_service_router(api_router()).layer(Extension(Arc::clone(&engine)));
	(router, engine)
}

fn open_config() -> Config {
	Config {
		allow_unauthenticated_api: true,
		..Config::default()
	}
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri(uri)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(body.to_string()))
		.unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
	let (app, _) = app_with(open_config());
	let response = app
		.oneshot(Request::get("/health").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn plan_happy_path_returns_itinerary_and_fingerprint() {
	let (app, _) = app_with(open_config());
	let response = app
		.oneshot(post_json(
			"/plan",
			json!({ "message": "Beijing 3 days, history and food" }),
		))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["status"], "done");
	assert_eq!(body["itinerary"]["days"].as_array().unwrap().len(), 3);
	assert!(body["session_id"].as_str().is_some_and(|s| !s.is_empty()));
	assert!(body["request_id"].as_str().is_some_and(|s| !s.is_empty()));
	assert_eq!(body["run_fingerprint"]["route_provider"], "fixture");
	assert_eq!(body["session_seq"], 1);
}

#[tokio::test]
async fn vague_plan_returns_clarifying_not_error() {
	let (app, _) = app_with(open_config());
	let response = app
		.oneshot(post_json("/plan", json!({ "message": "somewhere nice" })))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["status"], "clarifying");
	assert!(body["itinerary"].is_null());
	assert!(!body["next_questions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn empty_message_is_422() {
	let (app, _) = app_with(open_config());
	let response = app
		.oneshot(post_json("/plan", json!({ "message": "" })))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
	let body = body_json(response).await;
	assert_eq!(body["error_code"], "input_invalid");
}

#[tokio::test]
async fn missing_bearer_token_is_401_when_auth_required() {
	let config = Config {
		allow_unauthenticated_api: false,
		api_bearer_token: Some("secret-token".into()),
		..Config::default()
	};
	let (app, _) = app_with(config);

	let response = app
		.clone()
		.oneshot(post_json("/plan", json!({ "message": "Beijing 2 days" })))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	// Wrong token gets 403, right token gets through.
	let mut request = post_json("/plan", json!({ "message": "Beijing 2 days" }));
	request
		.headers_mut()
		.insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
	let response = app.clone().oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::FORBIDDEN);

	let mut request = post_json("/plan", json!({ "message": "Beijing 2 days" }));
	request.headers_mut().insert(
		header::AUTHORIZATION,
		"Bearer secret-token".parse().unwrap(),
	);
	let response = app.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_yields_429() {
	let config = Config {
		rate_limit_max: 2,
		rate_limit_window: Duration::from_secs(3600),
		..Config::default()
	};
	let (app, _) = app_with(config);

	for _ in 0..2 {
		let response = app
			.clone()
			.oneshot(post_json("/plan", json!({ "message": "Beijing 2 days" })))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}
	let response = app
		.oneshot(post_json("/plan", json!({ "message": "Beijing 2 days" })))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
	let body = body_json(response).await;
	assert_eq!(body["error_code"], "rate_limited");
}

#[tokio::test]
async fn chat_edit_patch_round_trip() {
	let (app, engine) = app_with(open_config());

	let response = app
		.clone()
		.oneshot(post_json(
			"/plan",
			json!({ "message": "Shanghai 2 days, history" }),
		))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	let session_id = body["session_id"].as_str().unwrap().to_string();
	let day1 = body["itinerary"]["days"][0]["items"].as_array().unwrap();
	let old_id = day1[0]["poi_id"].as_str().unwrap().to_string();

	// Any arena candidate that is not currently scheduled.
	let scheduled: Vec<String> = body["itinerary"]["days"]
		.as_array()
		.unwrap()
		.iter()
		.flat_map(|d| d["items"].as_array().unwrap().iter())
		.map(|i| i["poi_id"].as_str().unwrap().to_string())
		.collect();
	let new_id = {
		let session = engine.sessions.get(&session_id).unwrap();
		let data = session.data.lock().await;
		data.snapshot
			.as_ref()
			.unwrap()
			.arena
			.iter()
			.map(|p| p.id.clone())
			.find(|id| !scheduled.contains(id))
			.unwrap()
	};

	let response = app
		.oneshot(post_json(
			"/chat",
			json!({
				"session_id": session_id,
				"message": "",
				"metadata": { "edit_patch": { "replace_stop": {
					"day_number": 1, "old_poi": old_id, "new_poi": new_id
				}}}
			}),
		))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["status"], "done");
	assert_eq!(body["session_seq"], 2);
	let day1_ids: Vec<&str> = body["itinerary"]["days"][0]["items"]
		.as_array()
		.unwrap()
		.iter()
		.map(|i| i["poi_id"].as_str().unwrap())
		.collect();
	assert!(day1_ids.contains(&new_id.as_str()));
	assert!(!day1_ids.contains(&old_id.as_str()));
}

#[tokio::test]
async fn sessions_history_and_export_endpoints() {
	let (app, _) = app_with(open_config());

	let response = app
		.clone()
		.oneshot(post_json("/plan", json!({ "message": "Chengdu 2 days, food" })))
		.await
		.unwrap();
	let body = body_json(response).await;
	let session_id = body["session_id"].as_str().unwrap().to_string();
	let request_id = body["request_id"].as_str().unwrap().to_string();

	let response = app
		.clone()
		.oneshot(
			Request::get("/sessions?limit=5")
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["sessions"][0]["session_id"], session_id.as_str());

	let response = app
		.clone()
		.oneshot(
			Request::get(format!("/sessions/{session_id}/history"))
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["entries"].as_array().unwrap().len(), 2); // user + assistant

	let response = app
		.clone()
		.oneshot(
			Request::get(format!("/plans/{request_id}/export?format=markdown"))
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	let markdown = String::from_utf8(bytes.to_vec()).unwrap();
	assert!(markdown.contains("# Chengdu"));
	assert!(markdown.contains("## Day 1"));

	let response = app
		.oneshot(
			Request::get("/plans/not-a-real-id/export")
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn diagnostics_requires_token_even_when_api_is_open() {
	let config = Config {
		allow_unauthenticated_api: true,
		api_bearer_token: Some("ops-token".into()),
		..Config::default()
	};
	let (app, _) = app_with(config);

	let response = app
		.clone()
		.oneshot(Request::get("/diagnostics").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	let response = app
		.clone()
		.oneshot(
			Request::get("/diagnostics")
				.header(header::AUTHORIZATION, "Bearer ops-token")
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["config"]["poi_provider_key"], Value::Null);
	assert_eq!(body["providers"]["route"], "fixture");

	// Metrics stay open.
	let response = app
		.oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
}
