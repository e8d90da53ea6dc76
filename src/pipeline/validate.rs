/*
 * src/pipeline/validate.rs
 *
 * Rule checks over a finished itinerary. Every check runs; nothing
 * short-circuits. The validator only reports; repair decides what to do.
 */

use std::collections::HashSet;

use tracing::debug;

use super::routing::{GeoPoint, single_link_clusters};
use crate::config::Config;
use crate::global::*;
use crate::models::{Issue, IssueCode, Itinerary, PoiArena, TripConstraints};

/// Runs all checks and returns every issue found.
pub fn run(
	itinerary: &Itinerary,
	arena: &PoiArena,
	constraints: &TripConstraints,
	_config: &Config,
) -> Vec<Issue> {
	let mut issues = Vec::new();

	check_day_clocks(itinerary, &mut issues);
	check_budget(itinerary, constraints, &mut issues);
	check_pace(itinerary, constraints, &mut issues);
	check_travel_legs(itinerary, &mut issues);
	check_facts(itinerary, arena, &mut issues);
	check_backtracking(itinerary, arena, constraints, &mut issues);
	check_duplicates(itinerary, &mut issues);
	check_backups(itinerary, &mut issues);

	debug!(target: "validator", issues = issues.len(), "validation pass complete");
	issues
}

fn check_day_clocks(itinerary: &Itinerary, issues: &mut Vec<Issue>) {
	for day in &itinerary.days {
		let wall = day.wall_clock_minutes();
		if wall > MAX_DAY_WALL_CLOCK_MIN {
			issues.push(
				Issue::new(
					IssueCode::OverTime,
					format!("day spans {wall} min, limit {MAX_DAY_WALL_CLOCK_MIN}"),
				)
				.on_day(day.day_number),
			);
		}
		if wall > 0 && day.total_travel_minutes as f64 > wall as f64 * MAX_TRAVEL_SHARE {
			issues.push(
				Issue::new(
					IssueCode::TooMuchTravel,
					format!(
						"{} travel min against {wall} min wall-clock",
						day.total_travel_minutes
					),
				)
				.on_day(day.day_number),
			);
		}
	}
}

fn check_budget(itinerary: &Itinerary, constraints: &TripConstraints, issues: &mut Vec<Issue>) {
	let Some(daily_budget) = constraints.daily_budget else {
		return;
	};
	let budget_total = daily_budget * constraints.days as f64;
	if itinerary.total_cost > budget_total * OVER_BUDGET_TOLERANCE {
		issues.push(Issue::new(
			IssueCode::OverBudget,
			format!(
				"estimated cost {:.0} exceeds budget {budget_total:.0}",
				itinerary.total_cost
			),
		));
	}
	// The stated budget cannot plausibly cover the trip's feasible minimum.
	if budget_total < itinerary.minimum_feasible_budget * BUDGET_UNREALISTIC_FACTOR {
		issues.push(Issue::new(
			IssueCode::BudgetUnrealistic,
			format!(
				"budget {budget_total:.0} is below the feasible minimum {:.0}",
				itinerary.minimum_feasible_budget
			),
		));
	}
}

fn check_pace(itinerary: &Itinerary, constraints: &TripConstraints, issues: &mut Vec<Issue>) {
	let (min, max) = constraints.pace.poi_band();
	for day in &itinerary.days {
		let count = day.items.len();
		if count < min || count > max {
			issues.push(
				Issue::new(
					IssueCode::PaceMismatch,
					format!("{count} stops against a {min}-{max} band for {:?} pace", constraints.pace),
				)
				.on_day(day.day_number),
			);
		}
	}
}

fn check_travel_legs(itinerary: &Itinerary, issues: &mut Vec<Issue>) {
	for day in &itinerary.days {
		for item in day.items.iter().skip(1) {
			if item.travel_minutes < MIN_LEG_TRAVEL_MIN || item.travel_minutes > MAX_LEG_TRAVEL_MIN {
				issues.push(
					Issue::new(
						IssueCode::TravelTimeInvalid,
						format!("leg of {} min into {}", item.travel_minutes, item.poi_id),
					)
					.on_day(day.day_number)
					.on_poi(item.poi_id.clone()),
				);
			}
		}
	}
}

fn check_facts(itinerary: &Itinerary, arena: &PoiArena, issues: &mut Vec<Issue>) {
	for day in &itinerary.days {
		for item in &day.items {
			let Some(poi) = arena.get(&item.poi_id) else {
				issues.push(
					Issue::new(IssueCode::MissingFacts, "scheduled POI not in arena")
						.on_day(day.day_number)
						.on_poi(item.poi_id.clone()),
				);
				continue;
			};
			let mut missing = Vec::new();
			if poi.open_hours.is_none() {
				missing.push("open_hours");
			}
			if poi.typical_duration <= 0.0 {
				missing.push("typical_duration");
			}
			if !missing.is_empty() {
				issues.push(
					Issue::new(
						IssueCode::MissingFacts,
						format!("{} lacks {}", poi.name, missing.join(", ")),
					)
					.on_day(day.day_number)
					.on_poi(item.poi_id.clone()),
				);
			}
		}
	}
}

fn check_backtracking(
	itinerary: &Itinerary,
	arena: &PoiArena,
	constraints: &TripConstraints,
	issues: &mut Vec<Issue>,
) {
	let allowed = 2usize.max(constraints.days as usize / 2);
	let radius = constraints.transport_mode.cluster_radius_km();
	for day in &itinerary.days {
		let points: Vec<GeoPoint> = day
			.items
			.iter()
			.filter_map(|item| arena.get(&item.poi_id))
			.map(|poi| GeoPoint {
				lat: poi.lat,
				lon: poi.lon,
			})
			.collect();
		if points.len() < 2 {
			continue;
		}
		let labels = single_link_clusters(&points, radius);
		let switches = labels.windows(2).filter(|w| w[0] != w[1]).count();
		if switches > allowed {
			issues.push(
				Issue::new(
					IssueCode::RouteBacktracking,
					format!("{switches} cluster switches, {allowed} allowed"),
				)
				.on_day(day.day_number),
			);
		}
	}
}

fn check_duplicates(itinerary: &Itinerary, issues: &mut Vec<Issue>) {
	// Within a day and across days; the scheduler invariant makes both
	// unreachable, which is exactly why they are checked.
	let mut seen: HashSet<&str> = HashSet::new();
	for day in &itinerary.days {
		for item in &day.items {
			if !seen.insert(&item.poi_id) {
				issues.push(
					Issue::new(
						IssueCode::DuplicatePoiDay,
						format!("{} scheduled more than once", item.poi_id),
					)
					.on_day(day.day_number)
					.on_poi(item.poi_id.clone()),
				);
			}
		}
	}
}

fn check_backups(itinerary: &Itinerary, issues: &mut Vec<Issue>) {
	for day in &itinerary.days {
		if day.backups.is_empty() {
			issues.push(
				Issue::new(IssueCode::MissingBackup, "day has no backup stop")
					.on_day(day.day_number),
			);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::{
		ItineraryDay, Pace, Poi, ScheduleItem, TimeSlot,
	};
	use chrono::NaiveTime;

	fn item(poi_id: &str, start_h: u32, end_h: u32, travel: i64) -> ScheduleItem {
		ScheduleItem {
			poi_id: poi_id.into(),
			time_slot: TimeSlot::Morning,
			start_time: NaiveTime::from_hms_opt(start_h, 0, 0).unwrap(),
			end_time: NaiveTime::from_hms_opt(end_h, 0, 0).unwrap(),
			travel_minutes: travel,
			notes: vec![],
			is_backup: false,
		}
	}

	fn arena_with(ids: &[&str]) -> PoiArena {
		let mut arena = PoiArena::default();
		for id in ids {
			arena.insert(Poi {
				id: id.to_string(),
				name: id.to_string(),
				typical_duration: 2.0,
				open_hours: Some(crate::models::OpenHours {
					open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
					close: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
				}),
				..Default::default()
			});
		}
		arena
	}

	fn base_constraints() -> TripConstraints {
		TripConstraints {
			city: "Beijing".into(),
			days: 1,
			pace: Pace::Moderate,
			..Default::default()
		}
	}

	fn one_day(items: Vec<ScheduleItem>) -> Itinerary {
		Itinerary {
			city: "Beijing".into(),
			days: vec![ItineraryDay {
				day_number: 1,
				items,
				backups: vec![item("backup", 21, 21, 0)],
				..Default::default()
			}],
			..Default::default()
		}
	}

	fn codes(issues: &[Issue]) -> Vec<IssueCode> {
		issues.iter().map(|i| i.code).collect()
	}

	#[test]
	fn overlong_day_is_flagged() {
		let itinerary = one_day(vec![item("a", 8, 10, 0), item("b", 11, 22, 20)]);
		let issues = run(&itinerary, &arena_with(&["a", "b"]), &base_constraints(), &Config::default());
		assert!(codes(&issues).contains(&IssueCode::OverTime));
	}

	#[test]
	fn excess_travel_share_is_flagged() {
		let mut itinerary = one_day(vec![item("a", 9, 10, 0), item("b", 12, 13, 110)]);
		itinerary.days[0].total_travel_minutes = 110; // 110 of 240 min
		let issues = run(&itinerary, &arena_with(&["a", "b"]), &base_constraints(), &Config::default());
		assert!(codes(&issues).contains(&IssueCode::TooMuchTravel));
	}

	#[test]
	fn unrealistic_budget_is_flagged() {
		let mut itinerary = one_day(vec![
			item("a", 9, 11, 0),
			item("b", 11, 13, 10),
			item("c", 13, 15, 10),
		]);
		itinerary.minimum_feasible_budget = 300.0;
		itinerary.total_cost = 300.0;
		let mut constraints = base_constraints();
		constraints.daily_budget = Some(100.0);
		let issues = run(&itinerary, &arena_with(&["a", "b", "c"]), &constraints, &Config::default());
		assert!(codes(&issues).contains(&IssueCode::BudgetUnrealistic));
		assert!(codes(&issues).contains(&IssueCode::OverBudget));
	}

	#[test]
	fn invalid_leg_times_are_flagged() {
		let itinerary = one_day(vec![
			item("a", 9, 10, 0),
			item("b", 10, 11, 0),
			item("c", 16, 20, 200),
		]);
		let issues = run(&itinerary, &arena_with(&["a", "b", "c"]), &base_constraints(), &Config::default());
		let legs: Vec<&Issue> = issues
			.iter()
			.filter(|i| i.code == IssueCode::TravelTimeInvalid)
			.collect();
		assert_eq!(legs.len(), 2);
	}

	#[test]
	fn first_leg_zero_is_allowed() {
		let itinerary = one_day(vec![
			item("a", 9, 10, 0),
			item("b", 10, 12, 10),
			item("c", 12, 14, 10),
		]);
		let issues = run(&itinerary, &arena_with(&["a", "b", "c"]), &base_constraints(), &Config::default());
		assert!(!codes(&issues).contains(&IssueCode::TravelTimeInvalid));
	}

	#[test]
	fn missing_open_hours_is_flagged() {
		let mut arena = arena_with(&["a", "b", "c"]);
		arena.insert(Poi {
			id: "bare".into(),
			name: "Bare".into(),
			typical_duration: 1.0,
			open_hours: None,
			..Default::default()
		});
		let itinerary = one_day(vec![
			item("a", 9, 10, 0),
			item("bare", 10, 12, 10),
			item("b", 12, 14, 10),
		]);
		let issues = run(&itinerary, &arena, &base_constraints(), &Config::default());
		assert!(
			issues
				.iter()
				.any(|i| i.code == IssueCode::MissingFacts
					&& i.poi_id.as_deref() == Some("bare"))
		);
	}

	#[test]
	fn duplicate_poi_in_day_is_flagged() {
		let itinerary = one_day(vec![
			item("a", 9, 10, 0),
			item("a", 10, 12, 10),
			item("b", 12, 14, 10),
		]);
		let issues = run(&itinerary, &arena_with(&["a", "b"]), &base_constraints(), &Config::default());
		assert!(codes(&issues).contains(&IssueCode::DuplicatePoiDay));
	}

	#[test]
	fn missing_backup_is_low_severity() {
		let mut itinerary = one_day(vec![
			item("a", 9, 11, 0),
			item("b", 11, 13, 10),
			item("c", 13, 15, 10),
		]);
		itinerary.days[0].backups.clear();
		let issues = run(&itinerary, &arena_with(&["a", "b", "c"]), &base_constraints(), &Config::default());
		let backup_issue = issues
			.iter()
			.find(|i| i.code == IssueCode::MissingBackup)
			.expect("backup issue");
		assert_eq!(backup_issue.severity, crate::models::Severity::Low);
	}

	#[test]
	fn clean_day_yields_no_medium_or_high_issues() {
		let itinerary = one_day(vec![
			item("a", 9, 11, 0),
			item("b", 11, 13, 10),
			item("c", 13, 15, 10),
		]);
		let issues = run(&itinerary, &arena_with(&["a", "b", "c"]), &base_constraints(), &Config::default());
		assert!(
			issues
				.iter()
				.all(|i| i.severity < crate::models::Severity::Medium),
			"{issues:?}"
		);
	}
}
