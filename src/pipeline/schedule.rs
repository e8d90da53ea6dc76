/*
 * src/pipeline/schedule.rs
 *
 * Turns the ranked candidate pool into a day-by-day, time-boxed itinerary.
 *
 * Phase 1  partition candidates into days by geographic cluster,
 *          round-robin weighted by total visit duration.
 * Phase 2  order each day's visits (nearest-neighbor + 2-opt) and price the
 *          legs, asking the route provider and falling back to the
 *          distance/speed estimate.
 * Phase 3  walk the clock from 09:00, inserting meal windows, security
 *          buffers and closed-day replacements; overflow past 21:00 becomes
 *          backups.
 * Phase 4  budget accounting.
 *
 * No validation happens here; the validator sees the finished itinerary.
 */

use std::collections::HashMap;
use std::time::Instant;

use chrono::{Datelike, NaiveDate, NaiveTime};
use tracing::{debug, info};

use super::retrieve::RouteCache;
use super::routing::{GeoPoint, haversine_km, order_day, single_link_clusters};
use crate::cache::route_key;
use crate::config::Config;
use crate::error::PlanError;
use crate::global::*;
use crate::models::{
	BudgetBreakdown, Issue, IssueCode, Itinerary, ItineraryDay, Poi, ScheduleItem, TimeSlot,
	TransportMode, TripConstraints, UserProfile,
};
use crate::providers::retry::{CallPolicy, call_external};
use crate::providers::ProviderSet;

pub struct SchedulerOutput {
	pub itinerary: Itinerary,
	/// Confidence of leg times, fed into the trust score.
	pub routing_confidence: f64,
}

pub fn minutes_to_time(minutes: i64) -> NaiveTime {
	let clamped = minutes.clamp(0, 24 * 60 - 1);
	NaiveTime::from_hms_opt(clamped as u32 / 60, clamped as u32 % 60, 0).unwrap()
}

pub fn time_to_minutes(time: NaiveTime) -> i64 {
	(time - NaiveTime::from_hms_opt(0, 0, 0).unwrap()).num_minutes()
}

fn duration_minutes(poi: &Poi) -> i64 {
	(poi.typical_duration * 60.0).round() as i64
}

fn geo(poi: &Poi) -> GeoPoint {
	GeoPoint {
		lat: poi.lat,
		lon: poi.lon,
	}
}

// --- Peak calendar ---

/// Peak windows: the configured festival anchor plus the National Day week.
pub fn is_peak_day(date: NaiveDate, config: &Config) -> bool {
	let anchor = config.spring_festival_date;
	let delta = (date - anchor).num_days().abs();
	if delta <= PEAK_WINDOW_DAYS {
		return true;
	}
	if let Some(national_day) = NaiveDate::from_ymd_opt(date.year(), 10, 1) {
		let offset = (date - national_day).num_days();
		if (0..7).contains(&offset) {
			return true;
		}
	}
	false
}

fn trip_is_peak(dates: &[NaiveDate], config: &Config) -> bool {
	dates.iter().any(|d| is_peak_day(*d, config))
}

fn security_buffer(poi: &Poi, date: Option<NaiveDate>, peak_trip: bool, config: &Config) -> i64 {
	let base = match date {
		Some(date) if is_peak_day(date, config) => SECURITY_BUFFER_PEAK_MIN,
		_ if poi.reservation_required => SECURITY_BUFFER_RESERVATION_MIN,
		_ => 0,
	};
	if peak_trip {
		(base as f64 * PEAK_BUFFER_FACTOR).round() as i64
	} else {
		base
	}
}

// --- Phase 1: day partitioning ---

struct DayAssignment {
	/// Pool indices per day, in rank order within the day.
	days: Vec<Vec<usize>>,
	/// Pool indices not scheduled anywhere; replacement and backup material.
	reserve: Vec<usize>,
}

fn partition_days(pool: &[Poi], constraints: &TripConstraints) -> DayAssignment {
	let day_count = constraints.days as usize;
	let target_per_day = constraints.pace.multiplier() as usize;
	let (_, pace_max) = constraints.pace.poi_band();
	let total_target = day_count * target_per_day;

	// Pinned first, then rank order, up to the overall target.
	let mut selected: Vec<usize> = Vec::new();
	for (i, poi) in pool.iter().enumerate() {
		if poi.pinned {
			selected.push(i);
		}
	}
	for i in 0..pool.len() {
		if selected.len() >= total_target {
			break;
		}
		if !selected.contains(&i) {
			selected.push(i);
		}
	}
	let reserve: Vec<usize> = (0..pool.len()).filter(|i| !selected.contains(i)).collect();

	// Cluster the selected POIs, then split any cluster that cannot fit a
	// single day into rank-ordered chunks.
	let points: Vec<GeoPoint> = selected.iter().map(|&i| geo(&pool[i])).collect();
	let radius = constraints.transport_mode.cluster_radius_km();
	let labels = single_link_clusters(&points, radius);

	let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
	for (sel_idx, label) in labels.iter().enumerate() {
		clusters.entry(*label).or_default().push(selected[sel_idx]);
	}

	let mut groups: Vec<Vec<usize>> = Vec::new();
	let mut labels_sorted: Vec<usize> = clusters.keys().copied().collect();
	labels_sorted.sort_unstable();
	for label in labels_sorted {
		let members = &clusters[&label];
		let mut chunk: Vec<usize> = Vec::new();
		let mut chunk_minutes = 0i64;
		for &idx in members {
			let minutes = duration_minutes(&pool[idx]);
			if !chunk.is_empty()
				&& (chunk.len() >= pace_max || chunk_minutes + minutes > DAILY_ACTIVITY_BUDGET_MIN)
			{
				groups.push(std::mem::take(&mut chunk));
				chunk_minutes = 0;
			}
			chunk.push(idx);
			chunk_minutes += minutes;
		}
		if !chunk.is_empty() {
			groups.push(chunk);
		}
	}

	// Biggest groups first, each onto the currently lightest day that still
	// has headroom; what fits nowhere joins the reserve.
	groups.sort_by_key(|g| {
		std::cmp::Reverse(g.iter().map(|&i| duration_minutes(&pool[i])).sum::<i64>())
	});

	let mut days: Vec<Vec<usize>> = vec![Vec::new(); day_count];
	let mut loads = vec![0i64; day_count];
	let mut reserve = reserve;
	for group in groups {
		let group_minutes: i64 = group.iter().map(|&i| duration_minutes(&pool[i])).sum();
		let candidate_days: Vec<usize> = {
			let mut order: Vec<usize> = (0..day_count).collect();
			order.sort_by_key(|&d| (loads[d], d));
			order
		};
		let mut placed = false;
		for d in candidate_days {
			let fits_count = days[d].len() + group.len() <= pace_max;
			let fits_time = loads[d] + group_minutes <= DAILY_ACTIVITY_BUDGET_MIN;
			if days[d].is_empty() || (fits_count && fits_time) {
				loads[d] += group_minutes;
				days[d].extend(group.iter().copied());
				placed = true;
				break;
			}
		}
		if !placed {
			// Spill item by item, pinned ones forced onto the lightest day.
			for idx in group {
				if pool[idx].pinned {
					let d = (0..day_count).min_by_key(|&d| (loads[d], d)).unwrap();
					loads[d] += duration_minutes(&pool[idx]);
					days[d].push(idx);
				} else {
					reserve.push(idx);
				}
			}
		}
	}

	DayAssignment { days, reserve }
}

/// Moves pinned POIs off days where they are closed, when some trip day has
/// them open. POIs closed the whole trip stay put; the caller raises the
/// issue for them.
fn relocate_closed_pinned(
	assignment: &mut DayAssignment,
	pool: &[Poi],
	dates: &[NaiveDate],
) {
	if dates.is_empty() {
		return;
	}
	let day_count = assignment.days.len();
	for day in 0..day_count {
		let mut i = 0;
		while i < assignment.days[day].len() {
			let idx = assignment.days[day][i];
			let poi = &pool[idx];
			let closed_here = dates.get(day).is_some_and(|d| poi.is_closed_on(*d));
			if poi.pinned && closed_here {
				if let Some(open_day) = (0..day_count)
					.find(|&d| d != day && dates.get(d).is_some_and(|date| !poi.is_closed_on(*date)))
				{
					assignment.days[day].remove(i);
					assignment.days[open_day].push(idx);
					debug!(
						target: "scheduler",
						poi = %poi.name,
						from = day + 1,
						to = open_day + 1,
						"moved pinned POI off closed day"
					);
					continue;
				}
			}
			i += 1;
		}
	}
}

// --- Phase 2: leg pricing ---

async fn leg_minutes(
	from: &Poi,
	to: &Poi,
	mode: TransportMode,
	providers: &ProviderSet,
	route_cache: &RouteCache,
	deadline: Option<Instant>,
) -> (i64, f64) {
	let km = haversine_km(from.lat, from.lon, to.lat, to.lon);
	let estimate = ((km / mode.speed_kmh() * 60.0).round() as i64).max(1);

	let key = route_key(
		(from.lat, from.lon),
		(to.lat, to.lon),
		&format!("{mode:?}"),
	);
	if let Some(hit) = route_cache.get(&key) {
		return (hit.minutes, hit.confidence);
	}

	match call_external("route", CallPolicy::map(), deadline, || {
		providers.router.route_minutes((from.lat, from.lon), (to.lat, to.lon), mode)
	})
	.await
	{
		Ok(est) => {
			route_cache.put(key, est);
			(est.minutes, est.confidence)
		}
		Err(e) => {
			debug!(target: "scheduler", error = %e, "route provider failed, keeping estimate");
			(estimate, 0.5)
		}
	}
}

// --- Phase 3: time-boxing ---

fn slot_for(start_minutes: i64, is_meal_stop: bool) -> TimeSlot {
	if is_meal_stop {
		if start_minutes < DINNER_WINDOW_MIN.0 {
			return TimeSlot::Lunch;
		}
		return TimeSlot::Dinner;
	}
	if start_minutes < LUNCH_WINDOW_MIN.0 {
		TimeSlot::Morning
	} else if start_minutes < DINNER_WINDOW_MIN.0 {
		TimeSlot::Afternoon
	} else {
		TimeSlot::Evening
	}
}

pub(crate) struct TimeboxedDay {
	pub items: Vec<ScheduleItem>,
	pub backups: Vec<ScheduleItem>,
	pub total_travel_minutes: i64,
}

/// Knobs for local re-time-boxing (chat edit patches).
#[derive(Default)]
pub(crate) struct TimeboxOptions {
	/// Per-stop earliest start, minutes since midnight, aligned with `ordered`.
	pub floors: Vec<Option<i64>>,
	/// Insert an explicit lunch break even when a food stop spans the window.
	pub force_lunch_break: bool,
}

/// Walks one day from 09:00. `legs[i]` is the travel time into `ordered[i]`
/// (0 for the first stop). Items ending past 21:00 are demoted to backups.
pub(crate) fn timebox_day(
	ordered: &[&Poi],
	legs: &[i64],
	date: Option<NaiveDate>,
	peak_trip: bool,
	config: &Config,
	opts: &TimeboxOptions,
) -> TimeboxedDay {
	let mut items = Vec::new();
	let mut backups = Vec::new();
	let mut cursor = DAY_START_MIN;
	let mut total_travel = 0i64;
	let mut had_lunch = false;
	let mut had_dinner = false;

	for (i, poi) in ordered.iter().enumerate() {
		let travel = if items.is_empty() { 0 } else { legs[i] };
		let mut arrive = cursor + travel;
		if let Some(floor) = opts.floors.get(i).copied().flatten() {
			arrive = arrive.max(floor);
		}
		let mut notes = Vec::new();

		let food_stop = poi.has_theme("food") && !opts.force_lunch_break;
		let mut meal_slot = false;

		// Meal windows: a food-themed stop landing in the window is the meal;
		// otherwise a break is taken on arrival before the visit starts. A
		// visit that would swallow the whole window takes the break early.
		let visit_minutes = duration_minutes(poi);
		if !had_lunch && arrive <= LUNCH_WINDOW_MIN.1 {
			let in_window = arrive >= LUNCH_WINDOW_MIN.0;
			let spans_window = arrive >= LUNCH_WINDOW_MIN.0 - MEAL_DURATION_MIN
				&& arrive + visit_minutes >= LUNCH_WINDOW_MIN.1;
			if in_window || spans_window {
				if food_stop {
					meal_slot = true;
				} else {
					arrive += MEAL_DURATION_MIN;
					notes.push("after a lunch break".to_string());
				}
				had_lunch = true;
			}
		}
		if !had_dinner && !meal_slot && arrive <= DINNER_WINDOW_MIN.1 {
			let in_window = arrive >= DINNER_WINDOW_MIN.0;
			let spans_window = arrive >= DINNER_WINDOW_MIN.0 - MEAL_DURATION_MIN
				&& arrive + visit_minutes >= DINNER_WINDOW_MIN.1;
			if in_window || spans_window {
				if food_stop {
					meal_slot = true;
				} else {
					arrive += MEAL_DURATION_MIN;
					notes.push("after a dinner break".to_string());
				}
				had_dinner = true;
			}
		}

		let buffer = security_buffer(poi, date, peak_trip, config);
		if buffer > 0 {
			notes.push(format!("{buffer} min entry buffer"));
		}
		let start = arrive;
		let end = start + duration_minutes(poi) + buffer;

		if end > DAY_END_MIN {
			backups.push(ScheduleItem {
				poi_id: poi.id.clone(),
				time_slot: TimeSlot::Evening,
				start_time: minutes_to_time(DAY_END_MIN),
				end_time: minutes_to_time(DAY_END_MIN),
				travel_minutes: 0,
				notes: vec!["did not fit the day".to_string()],
				is_backup: true,
			});
			continue;
		}

		items.push(ScheduleItem {
			poi_id: poi.id.clone(),
			time_slot: slot_for(start, meal_slot),
			start_time: minutes_to_time(start),
			end_time: minutes_to_time(end),
			travel_minutes: travel,
			notes,
			is_backup: false,
		});
		total_travel += travel;
		cursor = end;
	}

	TimeboxedDay {
		items,
		backups,
		total_travel_minutes: total_travel,
	}
}

// --- Phase 4: budget accounting ---

pub(crate) fn account_budget(
	itinerary: &mut Itinerary,
	pool_by_id: &HashMap<&str, &Poi>,
	constraints: &TripConstraints,
	profile: &UserProfile,
	config: &Config,
) {
	let mut tickets = 0.0;
	let mut travel_minutes = 0i64;
	for day in &mut itinerary.days {
		let mut day_tickets = 0.0;
		for item in &day.items {
			if let Some(poi) = pool_by_id.get(item.poi_id.as_str()) {
				day_tickets += poi.ticket_price;
			}
		}
		day.estimated_cost = day_tickets
			+ day.total_travel_minutes as f64 * constraints.transport_mode.cost_per_minute();
		tickets += day_tickets;
		travel_minutes += day.total_travel_minutes;
	}

	let local_transport = travel_minutes as f64 * constraints.transport_mode.cost_per_minute();
	let food_min = constraints.days as f64
		* profile.travelers_type.count() as f64
		* config.food_min_per_person_per_day;

	itinerary.budget_breakdown = BudgetBreakdown {
		tickets,
		local_transport,
		food_min,
	};
	itinerary.total_cost = tickets + local_transport + food_min;
	// Cheapest plausible rendition of the trip as scheduled: the tickets it
	// needs, the food floor, and transit-priced travel. Set once; repair
	// dropping stops does not redefine what the trip minimally costs.
	if itinerary.minimum_feasible_budget == 0.0 {
		itinerary.minimum_feasible_budget = tickets
			+ food_min
			+ travel_minutes as f64 * TransportMode::PublicTransit.cost_per_minute();
	}
}

// --- Entry point ---

pub async fn run(
	constraints: &TripConstraints,
	profile: &UserProfile,
	pool: &[Poi],
	providers: &ProviderSet,
	config: &Config,
	route_cache: &RouteCache,
	deadline: Option<Instant>,
) -> Result<SchedulerOutput, PlanError> {
	let dates = constraints.trip_dates();
	let peak_trip = trip_is_peak(&dates, config);

	let mut assignment = partition_days(pool, constraints);
	relocate_closed_pinned(&mut assignment, pool, &dates);

	let pool_by_id: HashMap<&str, &Poi> = pool.iter().map(|p| (p.id.as_str(), p)).collect();
	let mut routing_confidence: f64 = 1.0;
	let mut assumptions = Vec::new();
	let mut issues = Vec::new();
	let mut reserve = assignment.reserve.clone();
	let mut days_out = Vec::with_capacity(assignment.days.len());

	if peak_trip {
		assumptions.push(format!(
			"Trip overlaps a peak travel window; entry buffers inflated by {PEAK_BUFFER_FACTOR}x (peak season)."
		));
	}

	for (day_idx, day_members) in assignment.days.iter().enumerate() {
		let date = dates.get(day_idx).copied();

		// Closed-day replacement: swap closed non-pinned stops for the
		// nearest same-theme reserve candidate within 2 km.
		let mut members: Vec<usize> = Vec::with_capacity(day_members.len());
		for &idx in day_members {
			let poi = &pool[idx];
			let closed = date.is_some_and(|d| poi.is_closed_on(d));
			if !closed {
				members.push(idx);
				continue;
			}
			if poi.pinned {
				members.push(idx);
				if poi.is_closed_on_all(&dates) {
					issues.push(
						Issue::new(
							IssueCode::MustVisitClosed,
							format!("{} is closed on every trip day", poi.name),
						)
						.on_day(day_idx as u32 + 1)
						.on_poi(poi.id.clone()),
					);
					assumptions.push(format!(
						"{} is kept in the plan although it is closed for the trip dates.",
						poi.name
					));
				}
				continue;
			}
			let replacement = reserve
				.iter()
				.position(|&r| {
					let candidate = &pool[r];
					candidate.shares_theme(poi)
						&& !date.is_some_and(|d| candidate.is_closed_on(d))
						&& haversine_km(poi.lat, poi.lon, candidate.lat, candidate.lon)
							<= REPLACEMENT_RADIUS_KM
				});
			match replacement {
				Some(pos) => {
					let r = reserve.remove(pos);
					debug!(
						target: "scheduler",
						closed = %poi.name,
						replacement = %pool[r].name,
						"replaced closed stop"
					);
					members.push(r);
				}
				None => {
					debug!(target: "scheduler", closed = %poi.name, "closed stop dropped, no replacement");
					reserve.push(idx);
				}
			}
		}

		// Phase 2: order the day's stops and price the legs.
		let points: Vec<GeoPoint> = members.iter().map(|&i| geo(&pool[i])).collect();
		let anchor = members.iter().position(|&i| pool[i].pinned);
		let order = order_day(&points, anchor);
		let ordered: Vec<&Poi> = order.iter().map(|&o| &pool[members[o]]).collect();

		let mut legs = vec![0i64; ordered.len()];
		for i in 1..ordered.len() {
			let (minutes, confidence) = leg_minutes(
				ordered[i - 1],
				ordered[i],
				constraints.transport_mode,
				providers,
				route_cache,
				deadline,
			)
			.await;
			legs[i] = minutes;
			routing_confidence = routing_confidence.min(confidence);
		}

		// Phase 3.
		let boxed = timebox_day(&ordered, &legs, date, peak_trip, config, &TimeboxOptions::default());
		let mut day_out = ItineraryDay {
			day_number: day_idx as u32 + 1,
			date,
			day_summary: String::new(),
			items: boxed.items,
			backups: boxed.backups,
			estimated_cost: 0.0,
			total_travel_minutes: boxed.total_travel_minutes,
		};

		// Top the backups up from the reserve so every day has a fallback.
		while day_out.backups.is_empty() && !reserve.is_empty() {
			let idx = reserve.remove(0);
			let poi = &pool[idx];
			day_out.backups.push(ScheduleItem {
				poi_id: poi.id.clone(),
				time_slot: TimeSlot::Evening,
				start_time: minutes_to_time(DAY_END_MIN),
				end_time: minutes_to_time(DAY_END_MIN),
				travel_minutes: 0,
				notes: vec!["spare".to_string()],
				is_backup: true,
			});
		}

		day_out.day_summary = match (day_out.items.len(), date) {
			(0, _) => "No scheduled stops".to_string(),
			(n, Some(date)) => format!("{n} stops on {date}"),
			(n, None) => format!("{n} stops"),
		};
		days_out.push(day_out);
	}

	let mut itinerary = Itinerary {
		city: constraints.city.clone(),
		days: days_out,
		assumptions,
		issues,
		..Default::default()
	};
	account_budget(&mut itinerary, &pool_by_id, constraints, profile, config);

	info!(
		target: "scheduler",
		days = itinerary.days.len(),
		stops = itinerary.days.iter().map(|d| d.items.len()).sum::<usize>(),
		total_cost = itinerary.total_cost,
		routing_confidence,
		"schedule built"
	);

	Ok(SchedulerOutput {
		itinerary,
		routing_confidence,
	})
}
