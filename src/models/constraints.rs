/*
 * src/models/constraints.rs
 *
 * Hard trip requirements and soft user preferences.
 *
 * Purpose:
 *   [TripConstraints] is built by intake and immutable afterwards; every later
 *   stage reads it by reference. [UserProfile] carries the soft preferences
 *   that bias retrieval and scheduling but never fail a plan.
 */

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How the traveler moves between stops. Drives cluster radius, leg speed and
/// the per-minute transport cost estimate.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
	Walking,
	#[default]
	PublicTransit,
	Taxi,
	Driving,
}

impl TransportMode {
	pub fn speed_kmh(self) -> f64 {
		match self {
			TransportMode::Walking => 4.0,
			TransportMode::PublicTransit => 18.0,
			TransportMode::Taxi => 30.0,
			TransportMode::Driving => 40.0,
		}
	}

	/// Single-link clustering radius used when partitioning POIs into days.
	pub fn cluster_radius_km(self) -> f64 {
		match self {
			TransportMode::Walking => 3.0,
			TransportMode::PublicTransit | TransportMode::Taxi => 5.0,
			TransportMode::Driving => 10.0,
		}
	}

	/// Rough local-transport cost per minute in trip currency.
	pub fn cost_per_minute(self) -> f64 {
		match self {
			TransportMode::Walking => 0.0,
			TransportMode::PublicTransit => 0.05,
			TransportMode::Taxi => 0.8,
			TransportMode::Driving => 0.5,
		}
	}

	/// The next faster mode, if any. Used by the transport-upgrade repair rung.
	pub fn faster(self) -> Option<TransportMode> {
		match self {
			TransportMode::Walking => Some(TransportMode::PublicTransit),
			TransportMode::PublicTransit => Some(TransportMode::Taxi),
			TransportMode::Taxi => Some(TransportMode::Driving),
			TransportMode::Driving => None,
		}
	}
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Pace {
	Relaxed,
	#[default]
	Moderate,
	Intensive,
}

impl Pace {
	/// Target visits per day; the candidate pool is sized from this.
	pub fn multiplier(self) -> u32 {
		match self {
			Pace::Relaxed => 2,
			Pace::Moderate => 3,
			Pace::Intensive => 4,
		}
	}

	/// Inclusive band of POIs per day the validator accepts.
	pub fn poi_band(self) -> (usize, usize) {
		match self {
			Pace::Relaxed => (1, 3),
			Pace::Moderate => (3, 5),
			Pace::Intensive => (5, 8),
		}
	}
}

/// Hard requirements extracted from the user's request. Created by intake,
/// immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Default)]
pub struct TripConstraints {
	pub city: String,
	/// Number of trip days, at least 1.
	pub days: u32,
	pub date_start: Option<NaiveDate>,
	pub date_end: Option<NaiveDate>,
	pub daily_budget: Option<f64>,
	pub transport_mode: TransportMode,
	pub pace: Pace,
	/// POI names the plan must contain; scheduled items from this set are pinned.
	pub must_visit: BTreeSet<String>,
	/// POI names removed from the candidate pool before ranking.
	pub avoid: BTreeSet<String>,
}

impl TripConstraints {
	/// The concrete dates this trip spans, when a start date is known.
	pub fn trip_dates(&self) -> Vec<NaiveDate> {
		match self.date_start {
			Some(start) => (0..self.days as i64)
				.filter_map(|offset| start.checked_add_days(chrono::Days::new(offset as u64)))
				.collect(),
			None => Vec::new(),
		}
	}
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TravelersType {
	#[default]
	Solo,
	Couple,
	Family,
	Friends,
	Elderly,
}

impl TravelersType {
	/// Head count used by the food-minimum budget estimate.
	pub fn count(self) -> u32 {
		match self {
			TravelersType::Solo => 1,
			TravelersType::Couple => 2,
			TravelersType::Family => 4,
			TravelersType::Friends => 3,
			TravelersType::Elderly => 2,
		}
	}
}

/// Soft preferences. Nothing in here can make a plan infeasible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, Default)]
pub struct UserProfile {
	pub travelers_type: TravelersType,
	/// Ordered by priority; earlier themes weigh more in candidate ranking.
	pub themes: Vec<String>,
	pub dietary: Vec<String>,
	pub mobility_limits: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn trip_dates_span_days() {
		let constraints = TripConstraints {
			city: "Beijing".into(),
			days: 3,
			date_start: NaiveDate::from_ymd_opt(2026, 4, 1),
			..Default::default()
		};
		let dates = constraints.trip_dates();
		assert_eq!(dates.len(), 3);
		assert_eq!(dates[2], NaiveDate::from_ymd_opt(2026, 4, 3).unwrap());
	}

	#[test]
	fn transport_upgrade_chain_terminates() {
		let mut mode = TransportMode::Walking;
		let mut hops = 0;
		while let Some(next) = mode.faster() {
			assert!(next.speed_kmh() > mode.speed_kmh());
			mode = next;
			hops += 1;
		}
		assert_eq!(hops, 3);
	}
}
