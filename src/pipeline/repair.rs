/*
 * src/pipeline/repair.rs
 *
 * Remediation of validator issues, least to most destructive:
 *
 *   1. substitute a same-theme nearer POI
 *   2. drop low-priority items
 *   3. upgrade the day's transport mode
 *   4. accept with assumptions (the orchestrator's job once the ladder is spent)
 *
 * Chat-driven edit patches are the restricted cousin of repair: one targeted
 * mutation followed by a local re-time-boxing of the touched day only.
 */

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::routing::haversine_km;
use super::schedule::{
	TimeboxOptions, account_budget, minutes_to_time, time_to_minutes, timebox_day,
};
use crate::config::Config;
use crate::error::{PlanError, PlanResult};
use crate::global::*;
use crate::models::{
	Issue, IssueCode, Itinerary, ItineraryDay, Poi, PoiArena, ScheduleItem, TimeSlot,
	TransportMode, TripConstraints, UserProfile, poi::normalize_name,
};
use utoipa::ToSchema;

#[derive(Debug)]
pub struct RepairOutcome {
	pub itinerary: Itinerary,
	/// Ladder rungs that actually changed something this round.
	pub strategies_used: Vec<&'static str>,
}

fn rank_of(pool: &[Poi]) -> HashMap<&str, usize> {
	pool.iter()
		.enumerate()
		.map(|(i, p)| (p.id.as_str(), i))
		.collect()
}

fn arena_index(arena: &PoiArena) -> HashMap<&str, &Poi> {
	arena.iter().map(|p| (p.id.as_str(), p)).collect()
}

/// Recomputes one day's clock after its item list changed. Legs are priced
/// with the distance/speed estimate; repair never goes back to the network.
fn retimebox_day(
	day: &mut ItineraryDay,
	arena: &PoiArena,
	mode: TransportMode,
	peak_trip: bool,
	config: &Config,
	opts: &TimeboxOptions,
) {
	let ordered: Vec<&Poi> = day
		.items
		.iter()
		.filter_map(|item| arena.get(&item.poi_id))
		.collect();
	let mut legs = vec![0i64; ordered.len()];
	for i in 1..ordered.len() {
		let km = haversine_km(
			ordered[i - 1].lat,
			ordered[i - 1].lon,
			ordered[i].lat,
			ordered[i].lon,
		);
		legs[i] = ((km / mode.speed_kmh() * 60.0).round() as i64).max(1);
	}
	let boxed = timebox_day(&ordered, &legs, day.date, peak_trip, config, opts);
	day.items = boxed.items;
	day.backups.extend(boxed.backups);
	day.total_travel_minutes = boxed.total_travel_minutes;
}

fn reaccount(
	itinerary: &mut Itinerary,
	arena: &PoiArena,
	constraints: &TripConstraints,
	profile: &UserProfile,
	config: &Config,
) {
	let index = arena_index(arena);
	account_budget(itinerary, &index, constraints, profile, config);
}

fn scheduled_ids(itinerary: &Itinerary) -> Vec<String> {
	itinerary.scheduled_poi_ids().map(str::to_string).collect()
}

// --- Rung 1: substitution ---

/// For the worst leg of an offending day, swaps the non-pinned stop at its
/// end for the best-ranked unscheduled candidate with a shared theme at no
/// more than 0.6x the distance. Returns true when a swap happened.
fn substitute_nearer(
	itinerary: &mut Itinerary,
	day_numbers: &[u32],
	pool: &[Poi],
	arena: &PoiArena,
	constraints: &TripConstraints,
	peak_trip: bool,
	config: &Config,
) -> bool {
	let index = arena_index(arena);
	let mut changed = false;

	for &day_number in day_numbers {
		let in_use = scheduled_ids(itinerary);
		let Some(day) = itinerary
			.days
			.iter_mut()
			.find(|d| d.day_number == day_number)
		else {
			continue;
		};

		let Some(worst) = day
			.items
			.iter()
			.enumerate()
			.skip(1)
			.filter(|(_, item)| !index.get(item.poi_id.as_str()).is_some_and(|p| p.pinned))
			.max_by_key(|(_, item)| item.travel_minutes)
			.map(|(i, _)| i)
		else {
			continue;
		};

		let (Some(&prev), Some(&old)) = (
			index.get(day.items[worst - 1].poi_id.as_str()),
			index.get(day.items[worst].poi_id.as_str()),
		) else {
			continue;
		};
		let old_km = haversine_km(prev.lat, prev.lon, old.lat, old.lon);

		let substitute = pool.iter().find(|candidate| {
			!in_use.contains(&candidate.id)
				&& candidate.shares_theme(old)
				&& !day.date.is_some_and(|d| candidate.is_closed_on(d))
				&& haversine_km(prev.lat, prev.lon, candidate.lat, candidate.lon)
					<= old_km * SUBSTITUTE_DISTANCE_FACTOR
		});

		if let Some(substitute) = substitute {
			debug!(
				target: "repair",
				day = day_number,
				dropped = %old.name,
				substitute = %substitute.name,
				"substituted nearer same-theme stop"
			);
			day.items[worst].poi_id = substitute.id.clone();
			day.items[worst].notes.push(format!("swapped in for {}", old.name));
			retimebox_day(
				day,
				arena,
				constraints.transport_mode,
				peak_trip,
				config,
				&TimeboxOptions::default(),
			);
			changed = true;
		}
	}

	changed
}

// --- Rung 2: drop low-priority items ---

fn drop_lowest(
	itinerary: &mut Itinerary,
	issues: &[Issue],
	pool: &[Poi],
	arena: &PoiArena,
	constraints: &TripConstraints,
	profile: &UserProfile,
	peak_trip: bool,
	config: &Config,
) -> bool {
	let ranks = rank_of(pool);
	let index = arena_index(arena);
	let (_, pace_max) = constraints.pace.poi_band();
	let mut changed = false;

	// A stop is droppable when it is not pinned; the worst-ranked one goes
	// first. Returns false when nothing droppable remains.
	let mut drop_one = |itinerary: &mut Itinerary, day_filter: Option<u32>| -> bool {
		let mut worst: Option<(usize, usize, usize)> = None; // (rank, day idx, item idx)
		for (d, day) in itinerary.days.iter().enumerate() {
			if day_filter.is_some_and(|n| n != day.day_number) {
				continue;
			}
			for (i, item) in day.items.iter().enumerate() {
				let pinned = index.get(item.poi_id.as_str()).is_some_and(|p| p.pinned);
				if pinned {
					continue;
				}
				let rank = ranks.get(item.poi_id.as_str()).copied().unwrap_or(usize::MAX);
				if worst.is_none() || rank > worst.unwrap().0 {
					worst = Some((rank, d, i));
				}
			}
		}
		let Some((_, d, i)) = worst else {
			return false;
		};
		let mut dropped = itinerary.days[d].items.remove(i);
		dropped.is_backup = true;
		dropped.notes.push("dropped during repair".to_string());
		itinerary.days[d].backups.push(dropped);
		retimebox_day(
			&mut itinerary.days[d],
			arena,
			constraints.transport_mode,
			peak_trip,
			config,
			&TimeboxOptions::default(),
		);
		true
	};

	for issue in issues {
		match issue.code {
			IssueCode::OverTime => {
				let Some(day_number) = issue.day_number else { continue };
				for _ in 0..pace_max {
					let over = itinerary
						.days
						.iter()
						.find(|d| d.day_number == day_number)
						.is_some_and(|d| d.wall_clock_minutes() > MAX_DAY_WALL_CLOCK_MIN);
					if !over || !drop_one(itinerary, Some(day_number)) {
						break;
					}
					changed = true;
				}
			}
			IssueCode::PaceMismatch => {
				let Some(day_number) = issue.day_number else { continue };
				loop {
					let over = itinerary
						.days
						.iter()
						.find(|d| d.day_number == day_number)
						.is_some_and(|d| d.items.len() > pace_max);
					if !over || !drop_one(itinerary, Some(day_number)) {
						break;
					}
					changed = true;
				}
			}
			IssueCode::OverBudget => {
				let Some(budget_total) = constraints
					.daily_budget
					.map(|b| b * constraints.days as f64)
				else {
					continue;
				};
				loop {
					reaccount(itinerary, arena, constraints, profile, config);
					if itinerary.total_cost <= budget_total * OVER_BUDGET_TOLERANCE {
						break;
					}
					if !drop_one(itinerary, None) {
						break;
					}
					changed = true;
				}
			}
			_ => {}
		}
	}

	changed
}

// --- Rung 3: transport upgrade ---

fn upgrade_transport(
	itinerary: &mut Itinerary,
	day_numbers: &[u32],
	arena: &PoiArena,
	constraints: &TripConstraints,
	peak_trip: bool,
	config: &Config,
) -> bool {
	let Some(faster) = constraints.transport_mode.faster() else {
		return false;
	};
	let mut changed = false;

	for &day_number in day_numbers {
		let Some(di) = itinerary
			.days
			.iter()
			.position(|d| d.day_number == day_number)
		else {
			continue;
		};
		let cost_delta = {
			let day = &mut itinerary.days[di];
			let wall = day.wall_clock_minutes();
			if wall == 0 || (day.total_travel_minutes as f64) <= wall as f64 * MAX_TRAVEL_SHARE {
				continue;
			}
			let before_travel = day.total_travel_minutes;
			retimebox_day(day, arena, faster, peak_trip, config, &TimeboxOptions::default());
			day.total_travel_minutes as f64 * faster.cost_per_minute()
				- before_travel as f64 * constraints.transport_mode.cost_per_minute()
		};
		itinerary.assumptions.push(format!(
			"Day {day_number} moves by {faster:?} instead of {:?} (about {cost_delta:+.0} on transport).",
			constraints.transport_mode
		));
		changed = true;
	}

	changed
}

/// One repair round. Applies ladder rungs in order; each rung that changes
/// the itinerary is recorded so the orchestrator can elevate the degrade
/// level accordingly.
pub fn run(
	mut itinerary: Itinerary,
	issues: &[Issue],
	pool: &[Poi],
	arena: &PoiArena,
	constraints: &TripConstraints,
	profile: &UserProfile,
	config: &Config,
) -> RepairOutcome {
	let peak_trip = itinerary.assumptions.iter().any(|a| a.contains("peak"));
	let mut strategies_used = Vec::new();

	let substitution_days: Vec<u32> = issues
		.iter()
		.filter(|i| {
			matches!(
				i.code,
				IssueCode::TooMuchTravel | IssueCode::RouteBacktracking
			)
		})
		.filter_map(|i| i.day_number)
		.collect();
	if !substitution_days.is_empty()
		&& substitute_nearer(
			&mut itinerary,
			&substitution_days,
			pool,
			arena,
			constraints,
			peak_trip,
			config,
		) {
		strategies_used.push("substitute");
	}

	if drop_lowest(
		&mut itinerary,
		issues,
		pool,
		arena,
		constraints,
		profile,
		peak_trip,
		config,
	) {
		strategies_used.push("drop");
	}

	// Travel-heavy days that substitution did not cure get a faster mode.
	let travel_days: Vec<u32> = issues
		.iter()
		.filter(|i| i.code == IssueCode::TooMuchTravel)
		.filter_map(|i| i.day_number)
		.collect();
	if !travel_days.is_empty()
		&& upgrade_transport(
			&mut itinerary,
			&travel_days,
			arena,
			constraints,
			peak_trip,
			config,
		) {
		strategies_used.push("upgrade_transport");
	}

	reaccount(&mut itinerary, arena, constraints, profile, config);

	info!(
		target: "repair",
		strategies = ?strategies_used,
		total_cost = itinerary.total_cost,
		"repair round finished"
	);

	RepairOutcome {
		itinerary,
		strategies_used,
	}
}

// --- Edit patches ---

/// Chat-driven local edits. Each targets one day and triggers a local
/// re-time-boxing of that day only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EditPatch {
	ReplaceStop {
		day_number: u32,
		old_poi: String,
		new_poi: String,
	},
	AddStop {
		day_number: u32,
		poi: String,
	},
	RemoveStop {
		day_number: u32,
		poi: String,
	},
	AdjustTime {
		day_number: u32,
		poi: String,
		/// "HH:MM", the earliest the stop may start.
		start_time: String,
	},
	LunchBreak {
		day_number: u32,
	},
}

impl EditPatch {
	pub fn day_number(&self) -> u32 {
		match self {
			EditPatch::ReplaceStop { day_number, .. }
			| EditPatch::AddStop { day_number, .. }
			| EditPatch::RemoveStop { day_number, .. }
			| EditPatch::AdjustTime { day_number, .. }
			| EditPatch::LunchBreak { day_number } => *day_number,
		}
	}
}

fn resolve_poi<'a>(arena: &'a PoiArena, name_or_id: &str) -> Option<&'a Poi> {
	if let Some(poi) = arena.get(name_or_id) {
		return Some(poi);
	}
	let key = normalize_name(name_or_id);
	arena.iter().find(|p| p.normalized_name() == key)
}

fn parse_clock(raw: &str) -> Option<i64> {
	let (h, m) = raw.trim().split_once(':')?;
	let h: i64 = h.parse().ok()?;
	let m: i64 = m.parse().ok()?;
	if (0..24).contains(&h) && (0..60).contains(&m) {
		Some(h * 60 + m)
	} else {
		None
	}
}

/// Applies one patch to the prior itinerary and re-time-boxes the touched
/// day. The caller revalidates afterwards.
pub fn apply_edit_patch(
	mut itinerary: Itinerary,
	patch: &EditPatch,
	arena: &PoiArena,
	constraints: &TripConstraints,
	profile: &UserProfile,
	config: &Config,
) -> PlanResult<Itinerary> {
	let peak_trip = itinerary.assumptions.iter().any(|a| a.contains("peak"));
	let day_number = patch.day_number();
	let in_use = scheduled_ids(&itinerary);
	let day = itinerary
		.days
		.iter_mut()
		.find(|d| d.day_number == day_number)
		.ok_or_else(|| PlanError::InputInvalid(format!("no day {day_number} in the itinerary")))?;

	let mut opts = TimeboxOptions::default();

	match patch {
		EditPatch::ReplaceStop { old_poi, new_poi, .. } => {
			let old = resolve_poi(arena, old_poi)
				.ok_or_else(|| PlanError::InputInvalid(format!("unknown stop {old_poi}")))?;
			let new = resolve_poi(arena, new_poi)
				.ok_or_else(|| PlanError::InputInvalid(format!("unknown stop {new_poi}")))?;
			if in_use.contains(&new.id) && new.id != old.id {
				return Err(PlanError::InputInvalid(format!(
					"{new_poi} is already scheduled"
				)));
			}
			let item = day
				.items
				.iter_mut()
				.find(|i| i.poi_id == old.id)
				.ok_or_else(|| {
					PlanError::InputInvalid(format!("{old_poi} is not on day {day_number}"))
				})?;
			item.poi_id = new.id.clone();
			item.notes.push(format!("replaced {}", old.name));
		}
		EditPatch::AddStop { poi, .. } => {
			let new = resolve_poi(arena, poi)
				.ok_or_else(|| PlanError::InputInvalid(format!("unknown stop {poi}")))?;
			if in_use.contains(&new.id) {
				return Err(PlanError::InputInvalid(format!("{poi} is already scheduled")));
			}
			day.items.push(ScheduleItem {
				poi_id: new.id.clone(),
				time_slot: TimeSlot::Afternoon,
				start_time: minutes_to_time(DAY_START_MIN),
				end_time: minutes_to_time(DAY_START_MIN),
				travel_minutes: 0,
				notes: vec!["added on request".to_string()],
				is_backup: false,
			});
		}
		EditPatch::RemoveStop { poi, .. } => {
			let target = resolve_poi(arena, poi)
				.ok_or_else(|| PlanError::InputInvalid(format!("unknown stop {poi}")))?;
			let before = day.items.len();
			day.items.retain(|i| i.poi_id != target.id);
			if day.items.len() == before {
				return Err(PlanError::InputInvalid(format!(
					"{poi} is not on day {day_number}"
				)));
			}
		}
		EditPatch::AdjustTime { poi, start_time, .. } => {
			let target = resolve_poi(arena, poi)
				.ok_or_else(|| PlanError::InputInvalid(format!("unknown stop {poi}")))?;
			let floor = parse_clock(start_time).ok_or_else(|| {
				PlanError::InputInvalid(format!("bad start_time {start_time}, expected HH:MM"))
			})?;
			let idx = day
				.items
				.iter()
				.position(|i| i.poi_id == target.id)
				.ok_or_else(|| {
					PlanError::InputInvalid(format!("{poi} is not on day {day_number}"))
				})?;
			opts.floors = vec![None; day.items.len()];
			opts.floors[idx] = Some(floor);
		}
		EditPatch::LunchBreak { .. } => {
			opts.force_lunch_break = true;
		}
	}

	retimebox_day(day, arena, constraints.transport_mode, peak_trip, config, &opts);
	reaccount(&mut itinerary, arena, constraints, profile, config);
	Ok(itinerary)
}
