/*
 * src/models/itinerary.rs
 *
 * The day-by-day plan the scheduler produces and every later stage refines.
 *
 * Purpose:
 *   Strongly-typed itinerary models shared by the pipeline and the API
 *   responses. Items reference POIs by arena id.
 */

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::issue::Issue;

/// Coarse slot a visit falls into, derived from its start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
	Morning,
	Lunch,
	Afternoon,
	Dinner,
	Evening,
}

/// One visit within a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScheduleItem {
	/// Id of the POI in the request's arena.
	pub poi_id: String,
	pub time_slot: TimeSlot,
	pub start_time: NaiveTime,
	pub end_time: NaiveTime,
	/// Minutes of travel from the previous item; 0 for the first item of a day.
	pub travel_minutes: i64,
	pub notes: Vec<String>,
	#[serde(default)]
	pub is_backup: bool,
}

/// A single scheduled day.
/// * `items` are sorted by start time
/// * consecutive items satisfy `end[i] + travel[i+1] <= start[i+1]`
/// * no POI appears twice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Default)]
pub struct ItineraryDay {
	pub day_number: u32,
	pub date: Option<NaiveDate>,
	pub items: Vec<ScheduleItem>,
	/// Spare visits for this day; not counted in cost or travel totals.
	pub backups: Vec<ScheduleItem>,
	pub day_summary: String,
	pub estimated_cost: f64,
	pub total_travel_minutes: i64,
}

impl ItineraryDay {
	/// Wall-clock span in minutes from first start to last end; 0 when empty.
	pub fn wall_clock_minutes(&self) -> i64 {
		match (self.items.first(), self.items.last()) {
			(Some(first), Some(last)) => {
				(last.end_time - first.start_time).num_minutes()
			}
			_ => 0,
		}
	}
}

/// How far a produced itinerary is from a fully verified, realtime-sourced
/// result. L0 is best.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema, Default,
)]
pub enum DegradeLevel {
	#[default]
	L0,
	L1,
	L2,
	L3,
}

impl DegradeLevel {
	pub fn bump(self) -> DegradeLevel {
		match self {
			DegradeLevel::L0 => DegradeLevel::L1,
			DegradeLevel::L1 => DegradeLevel::L2,
			DegradeLevel::L2 | DegradeLevel::L3 => DegradeLevel::L3,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Default)]
pub struct BudgetBreakdown {
	pub tickets: f64,
	pub local_transport: f64,
	pub food_min: f64,
}

/// The full plan returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Default)]
pub struct Itinerary {
	pub city: String,
	pub days: Vec<ItineraryDay>,
	pub total_cost: f64,
	/// Free-form caveats accumulated by scheduling and repair.
	pub assumptions: Vec<String>,
	pub budget_breakdown: BudgetBreakdown,
	/// Least the trip can plausibly cost: required tickets + food + transport.
	pub minimum_feasible_budget: f64,
	/// In [0, 1]; computed by the trust layer from fact provenance.
	pub confidence_score: f64,
	pub degrade_level: DegradeLevel,
	/// Issues left unresolved after repair.
	pub issues: Vec<Issue>,
}

impl Itinerary {
	pub fn scheduled_poi_ids(&self) -> impl Iterator<Item = &str> {
		self.days
			.iter()
			.flat_map(|d| d.items.iter())
			.map(|i| i.poi_id.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn degrade_bump_saturates() {
		assert_eq!(DegradeLevel::L0.bump(), DegradeLevel::L1);
		assert_eq!(DegradeLevel::L3.bump(), DegradeLevel::L3);
	}

	#[test]
	fn wall_clock_of_empty_day_is_zero() {
		assert_eq!(ItineraryDay::default().wall_clock_minutes(), 0);
	}

	#[test]
	fn itinerary_round_trips_through_json() {
		let day = ItineraryDay {
			day_number: 1,
			date: NaiveDate::from_ymd_opt(2026, 4, 1),
			items: vec![ScheduleItem {
				poi_id: "poi-1".into(),
				time_slot: TimeSlot::Morning,
				start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
				end_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
				travel_minutes: 0,
				notes: vec!["note".into()],
				is_backup: false,
			}],
			backups: vec![],
			day_summary: "Day 1".into(),
			estimated_cost: 42.0,
			total_travel_minutes: 12,
		};
		let itinerary = Itinerary {
			city: "Beijing".into(),
			days: vec![day],
			total_cost: 42.0,
			budget_breakdown: BudgetBreakdown {
				tickets: 20.0,
				local_transport: 2.0,
				food_min: 20.0,
			},
			minimum_feasible_budget: 42.0,
			confidence_score: 0.7,
			degrade_level: DegradeLevel::L2,
			..Default::default()
		};
		let json = serde_json::to_string(&itinerary).unwrap();
		let back: Itinerary = serde_json::from_str(&json).unwrap();
		assert_eq!(back, itinerary);
	}
}
