pub mod diagnostics;
pub mod health;
pub mod plan;
pub mod session;

/// A regular [axum::Router] in test and release builds, or [utoipa_axum::router::OpenApiRouter] in non-test dev builds
#[cfg(any(test, not(debug_assertions)))]
pub type AxumRouter = axum::Router;
/// A regular [axum::Router] in test and release builds, or [utoipa_axum::router::OpenApiRouter] in non-test dev builds
#[cfg(all(not(test), debug_assertions))]
pub type AxumRouter = utoipa_axum::router::OpenApiRouter;

/// Every API route, assembled the same way for the binary and the tests.
pub fn api_router() -> AxumRouter {
	AxumRouter::new()
		.merge(health::health_routes())
		.merge(plan::plan_routes())
		.merge(session::session_routes())
		.merge(diagnostics::diagnostics_routes())
}

/// Collapses [AxumRouter] to a servable [axum::Router] regardless of which
/// alias is active.
pub fn into_service_router(router: AxumRouter) -> axum::Router {
	#[cfg(all(not(test), debug_assertions))]
	{
		router.split_for_parts().0
	}
	#[cfg(any(test, not(debug_assertions)))]
	{
		router
	}
}
