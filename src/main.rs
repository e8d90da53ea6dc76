#![allow(unexpected_cfgs)]

mod cache;
mod config;
mod controllers;
mod error;
mod global;
mod http_models;
mod log;
mod metrics;
mod middleware;
mod models;
mod pipeline;
mod providers;
mod ratelimit;
mod sessions;

#[cfg(not(tarpaulin_include))]
mod swagger;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::Extension;
use http::{Method, header::HeaderValue};
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::pipeline::Engine;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
	// Load our environment variables
	dotenvy::dotenv().ok();
	log::init_panic_handler();
	log::init_logger();

	let config = Config::from_env();
	let bind_address = config.bind_address.clone();

	/*
	/ CORS is only needed when a browser frontend on another origin talks to
	/ this API; without FRONTEND_URL we stay same-origin strict.
	*/
	let cors = match &config.frontend_url {
		Some(frontend_url) => CorsLayer::new()
			.allow_origin(
				frontend_url
					.parse::<HeaderValue>()
					.expect("Invalid FRONTEND_URL format"),
			)
			.allow_methods([Method::GET, Method::POST])
			.allow_headers([
				http::header::CONTENT_TYPE,
				http::header::ACCEPT,
				http::header::AUTHORIZATION,
			]),
		None => CorsLayer::new(),
	};

	// One engine per process: config, providers, caches, sessions, metrics.
	let engine = Arc::new(Engine::new(config));

	let api_routes = controllers::api_router();

	#[cfg(all(not(test), debug_assertions))]
	let app = crate::swagger::merge_swagger(api_routes);
	#[cfg(any(test, not(debug_assertions)))]
	let app = controllers::into_service_router(api_routes);

	let app = app.layer(Extension(engine)).layer(cors);

	let addr = SocketAddr::from_str(&bind_address).expect("Invalid BIND_ADDRESS format");
	println!("Server starting on {addr}");

	let listener = tokio::net::TcpListener::bind(addr).await?;
	axum::serve(listener, app.into_make_service()).await?;

	Ok(())
}
