/*
 * src/error.rs
 *
 * Error taxonomy for the planning pipeline and its HTTP surface.
 *
 * Purpose:
 *   One enum per layer: [PlanError] is what pipeline stages and providers
 *   return; [AppError] is what controllers return and knows how to render
 *   itself as a JSON body with an `error_code`. No stack traces leak.
 */

use axum::{
	Json,
	http::StatusCode,
	response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, AppError>;
pub type PlanResult<T> = std::result::Result<T, PlanError>;

/// Failures a planning request can hit. Recoverable variants surface as a
/// degraded-but-valid response; fatal ones become an `error` outcome.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
	/// Input could not be understood; surfaced as `clarifying` with questions.
	#[error("invalid input: {0}")]
	InputInvalid(String),

	/// A required external provider was unreachable. Fatal only in strict mode.
	#[error("provider unavailable: {0}")]
	ProviderUnavailable(String),

	/// The per-request deadline elapsed; in-flight external calls are dropped.
	#[error("deadline exceeded")]
	DeadlineExceeded,

	/// A structural invariant escaped the validator. Should be unreachable.
	#[error("internal invariant violated: {0}")]
	InvariantViolated(String),

	#[error("rate limited")]
	RateLimited,
}

impl PlanError {
	/// Stable machine-readable code, part of the API contract.
	pub fn code(&self) -> &'static str {
		match self {
			PlanError::InputInvalid(_) => "input_invalid",
			PlanError::ProviderUnavailable(_) => "provider_unavailable",
			PlanError::DeadlineExceeded => "deadline_exceeded",
			PlanError::InvariantViolated(_) => "internal_invariant_violated",
			PlanError::RateLimited => "rate_limited",
		}
	}
}

/// Controller-level error. Everything renders as `{"error_code", "message"}`.
#[derive(Debug, Error)]
pub enum AppError {
	#[error(transparent)]
	Plan(#[from] PlanError),

	#[error("unauthorized")]
	Unauthorized,

	#[error("forbidden")]
	Forbidden,

	#[error("not found: {0}")]
	NotFound(String),

	#[error("unprocessable: {0}")]
	Unprocessable(String),

	#[error("internal error: {0}")]
	Internal(String),
}

impl AppError {
	fn status(&self) -> StatusCode {
		match self {
			AppError::Plan(PlanError::InputInvalid(_)) => StatusCode::UNPROCESSABLE_ENTITY,
			AppError::Plan(PlanError::ProviderUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
			AppError::Plan(PlanError::DeadlineExceeded) => StatusCode::GATEWAY_TIMEOUT,
			AppError::Plan(PlanError::InvariantViolated(_)) => StatusCode::INTERNAL_SERVER_ERROR,
			AppError::Plan(PlanError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
			AppError::Unauthorized => StatusCode::UNAUTHORIZED,
			AppError::Forbidden => StatusCode::FORBIDDEN,
			AppError::NotFound(_) => StatusCode::NOT_FOUND,
			AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
			AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn code(&self) -> &'static str {
		match self {
			AppError::Plan(e) => e.code(),
			AppError::Unauthorized => "unauthorized",
			AppError::Forbidden => "forbidden",
			AppError::NotFound(_) => "not_found",
			AppError::Unprocessable(_) => "input_invalid",
			AppError::Internal(_) => "internal_error",
		}
	}
}

impl IntoResponse for AppError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			tracing::error!(target: "api", error_code = self.code(), error = %self, "request failed");
		} else {
			tracing::debug!(target: "api", error_code = self.code(), error = %self, "request rejected");
		}
		let body = Json(json!({
			"error_code": self.code(),
			"message": self.to_string(),
		}));
		(status, body).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plan_error_codes_are_stable() {
		assert_eq!(PlanError::InputInvalid("x".into()).code(), "input_invalid");
		assert_eq!(
			PlanError::ProviderUnavailable("maps".into()).code(),
			"provider_unavailable"
		);
		assert_eq!(PlanError::DeadlineExceeded.code(), "deadline_exceeded");
		assert_eq!(PlanError::RateLimited.code(), "rate_limited");
	}

	#[test]
	fn strict_mode_provider_outage_maps_to_503() {
		let err = AppError::from(PlanError::ProviderUnavailable("maps".into()));
		assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
	}
}
