use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::sessions::{HistoryEntry, SessionSummary};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LimitQuery {
	pub limit: Option<usize>,
}

/// Response for `GET /api/sessions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionsResponse {
	pub sessions: Vec<SessionSummary>,
}

/// Response for `GET /api/sessions/{id}/history`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
	pub session_id: String,
	pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExportQuery {
	/// `json` (default) or `markdown`.
	pub format: Option<String>,
}
