use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
	/// At least one realtime provider served this request.
	Realtime,
	/// Curated/heuristic data only.
	Degraded,
}

/// Auditable record of which providers served a request. Emitted on every
/// response so a plan's trustworthiness can be assessed after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RunFingerprint {
	pub run_mode: RunMode,
	pub poi_provider: String,
	pub route_provider: String,
	pub llm_provider: String,
	pub strict_external_data: bool,
	pub env_source: String,
	pub trace_id: String,
}
