use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How bad an issue is. Repair is only entered for Medium and above.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
	Low,
	Medium,
	High,
}

impl Severity {
	/// Weight used by the repair progress invariant.
	pub fn weight(self) -> u32 {
		match self {
			Severity::Low => 1,
			Severity::Medium => 3,
			Severity::High => 5,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
	OverTime,
	TooMuchTravel,
	OverBudget,
	BudgetUnrealistic,
	PaceMismatch,
	TravelTimeInvalid,
	MissingFacts,
	RouteBacktracking,
	DuplicatePoiDay,
	MissingBackup,
	MustVisitClosed,
}

impl IssueCode {
	pub fn default_severity(self) -> Severity {
		match self {
			IssueCode::OverTime
			| IssueCode::TooMuchTravel
			| IssueCode::OverBudget
			| IssueCode::TravelTimeInvalid
			| IssueCode::MissingFacts
			| IssueCode::DuplicatePoiDay
			| IssueCode::MustVisitClosed => Severity::High,
			IssueCode::BudgetUnrealistic
			| IssueCode::PaceMismatch
			| IssueCode::RouteBacktracking => Severity::Medium,
			IssueCode::MissingBackup => Severity::Low,
		}
	}
}

/// One validator finding, carrying enough evidence to act on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Issue {
	pub code: IssueCode,
	pub severity: Severity,
	pub day_number: Option<u32>,
	pub poi_id: Option<String>,
	pub evidence: String,
}

impl Issue {
	pub fn new(code: IssueCode, evidence: impl Into<String>) -> Self {
		Self {
			code,
			severity: code.default_severity(),
			day_number: None,
			poi_id: None,
			evidence: evidence.into(),
		}
	}

	pub fn on_day(mut self, day_number: u32) -> Self {
		self.day_number = Some(day_number);
		self
	}

	pub fn on_poi(mut self, poi_id: impl Into<String>) -> Self {
		self.poi_id = Some(poi_id.into());
		self
	}
}

/// Severity-weighted sum over a set of issues; strictly decreasing across a
/// repair round when cost does not decrease (progress invariant).
pub fn weighted_sum(issues: &[Issue]) -> u32 {
	issues.iter().map(|i| i.severity.weight()).sum()
}
