use axum::Router;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use utoipa::{
	Modify, OpenApi,
	openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crate::controllers::{
	diagnostics::DiagnosticsApiDoc, health::HealthApiDoc, plan::PlanApiDoc,
	session::SessionApiDoc,
};

#[derive(OpenApi)]
#[openapi(
	modifiers(&SecurityAddon),
	security(
		(),
		("bearer"=[])
	),
	info(
		title = "Wayfarer API",
		description = "The public API documentation for the Wayfarer trip planning service."
	),
	nest(
		(path = "/", api = HealthApiDoc),
		(path = "/", api = PlanApiDoc),
		(path = "/", api = SessionApiDoc),
		(path = "/", api = DiagnosticsApiDoc)
	),
	servers(
		(url = "http://localhost:3001", description = "Local development server")
	)
)]
#[allow(dead_code)]
struct ApiDoc;

#[allow(dead_code)]
pub struct SecurityAddon;

impl Modify for SecurityAddon {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		if let Some(components) = openapi.components.as_mut() {
			components.add_security_scheme(
				"bearer",
				SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
			)
		}
	}
}

/// Merges swagger with the current routes
#[allow(dead_code)]
pub fn merge_swagger(router: OpenApiRouter) -> Router {
	let doc = ApiDoc::openapi();
	let docs_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("docs");
	fs::create_dir_all(&docs_path).unwrap();
	let mut file = File::create(docs_path.join("openapi.json")).unwrap();
	file.write_all(
		doc.to_pretty_json()
			.expect("openapi doc should serialize")
			.as_bytes(),
	)
	.unwrap();

	let (router, _) = router.split_for_parts();
	router.merge(SwaggerUi::new("/docs").url("/docs/openapi.json", doc))
}
