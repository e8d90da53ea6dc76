/*
 * tests/pipeline.rs
 *
 * End-to-end planning scenarios against the curated dataset and fixture
 * providers. No network: no map key, no LLM key, fixture routing.
 */

extern crate wayfarer as app;

use std::sync::Arc;

use app::config::Config;
use app::models::{DegradeLevel, IssueCode, Itinerary};
use app::pipeline::{Engine, PlanRequest, PlanStatus};

fn fixture_engine() -> Engine {
	Engine::new(Config::default())
}

fn wall_clock_minutes(day: &app::models::ItineraryDay) -> i64 {
	day.wall_clock_minutes()
}

fn assert_no_duplicate_pois(itinerary: &Itinerary) {
	let ids: Vec<&str> = itinerary.scheduled_poi_ids().collect();
	let mut unique = ids.clone();
	unique.sort_unstable();
	unique.dedup();
	assert_eq!(ids.len(), unique.len(), "duplicate POI across the itinerary");
}

fn assert_timeline_feasible(itinerary: &Itinerary) {
	for day in &itinerary.days {
		for pair in day.items.windows(2) {
			let gap = (pair[1].start_time - pair[0].end_time).num_minutes();
			assert!(
				gap >= pair[1].travel_minutes,
				"day {}: {} min gap for {} min travel",
				day.day_number,
				gap,
				pair[1].travel_minutes
			);
		}
	}
}

#[tokio::test]
async fn beijing_spring_festival_four_days() {
	let engine = fixture_engine();
	let output = engine
		.plan(PlanRequest {
			message: "Beijing 4 days, Spring Festival, history+food, budget 600/day".into(),
			..Default::default()
		})
		.await;

	assert_eq!(output.status, PlanStatus::Done, "message: {}", output.message);
	let itinerary = output.itinerary.expect("itinerary");
	assert_eq!(itinerary.days.len(), 4);

	// Peak buffers applied and surfaced as an assumption.
	assert!(
		itinerary.assumptions.iter().any(|a| a.contains("peak")),
		"assumptions: {:?}",
		itinerary.assumptions
	);

	// Curated facts with fixture routing and no realtime providers.
	assert!(
		matches!(itinerary.degrade_level, DegradeLevel::L2 | DegradeLevel::L3),
		"degrade level: {:?} (confidence {})",
		itinerary.degrade_level,
		itinerary.confidence_score
	);

	for day in &itinerary.days {
		assert!(
			wall_clock_minutes(day) <= 12 * 60,
			"day {} spans {} minutes",
			day.day_number,
			wall_clock_minutes(day)
		);
	}
	assert_no_duplicate_pois(&itinerary);
	assert_timeline_feasible(&itinerary);
}

#[tokio::test]
async fn vague_request_asks_for_city_and_days() {
	let engine = fixture_engine();
	let output = engine
		.plan(PlanRequest {
			message: "I want to travel".into(),
			..Default::default()
		})
		.await;

	assert_eq!(output.status, PlanStatus::Clarifying);
	assert!(output.itinerary.is_none());
	assert!(!output.next_questions.is_empty());
	assert!(output.next_questions.len() <= 3);
	let all = output.next_questions.join(" ").to_lowercase();
	assert!(all.contains("city"), "questions: {all}");
	assert!(all.contains("days"), "questions: {all}");
}

#[tokio::test]
async fn shanghai_on_a_shoestring_flags_unrealistic_budget() {
	let engine = fixture_engine();
	let output = engine
		.plan(PlanRequest {
			message: "Shanghai 2 days, budget 100/day".into(),
			..Default::default()
		})
		.await;

	assert_eq!(output.status, PlanStatus::Done, "message: {}", output.message);
	let itinerary = output.itinerary.expect("itinerary");
	assert!(
		output
			.issues
			.iter()
			.any(|i| i.code == IssueCode::BudgetUnrealistic),
		"issues: {:?}",
		output.issues
	);
	assert!(
		itinerary.minimum_feasible_budget > 200.0,
		"minimum feasible {}",
		itinerary.minimum_feasible_budget
	);
	assert!(output.budget_warning.is_some());
}

#[tokio::test]
async fn edit_patch_replaces_one_stop_and_leaves_other_days_alone() {
	let engine = Arc::new(fixture_engine());
	let first = engine
		.plan(PlanRequest {
			message: "Shanghai 2 days, history".into(),
			..Default::default()
		})
		.await;
	assert_eq!(first.status, PlanStatus::Done, "message: {}", first.message);
	let before = first.itinerary.clone().expect("itinerary");
	let session_id = first.session_id.clone();

	// Pick the first stop of day 1 and an arena POI that is not scheduled.
	let old_id = before.days[0].items[0].poi_id.clone();
	let scheduled: Vec<String> = before.scheduled_poi_ids().map(str::to_string).collect();
	let new_id = {
		let session = engine.sessions.get(&session_id).expect("session");
		let data = session.data.lock().await;
		let snapshot = data.snapshot.as_ref().expect("snapshot");
		snapshot
			.arena
			.iter()
			.map(|p| p.id.clone())
			.find(|id| !scheduled.contains(id))
			.expect("an unscheduled candidate")
	};

	let patch = serde_json::from_value(serde_json::json!({
		"replace_stop": { "day_number": 1, "old_poi": old_id, "new_poi": new_id }
	}))
	.unwrap();

	let second = engine
		.plan(PlanRequest {
			message: String::new(),
			session_id: Some(session_id),
			constraints: None,
			edit_patch: Some(patch),
		})
		.await;
	assert_eq!(second.status, PlanStatus::Done, "message: {}", second.message);
	let after = second.itinerary.expect("itinerary");

	let day1_ids: Vec<&str> = after.days[0].items.iter().map(|i| i.poi_id.as_str()).collect();
	assert!(day1_ids.contains(&new_id.as_str()));
	assert!(!day1_ids.contains(&old_id.as_str()));

	// Day 2 is untouched by a day-1 patch.
	let day2_before: Vec<&str> = before.days[1].items.iter().map(|i| i.poi_id.as_str()).collect();
	let day2_after: Vec<&str> = after.days[1].items.iter().map(|i| i.poi_id.as_str()).collect();
	assert_eq!(day2_before, day2_after);

	// Revalidation ran on the patched plan.
	assert_timeline_feasible(&after);
	assert_no_duplicate_pois(&after);
}

#[tokio::test]
async fn closed_must_visit_is_kept_with_high_issue() {
	let engine = fixture_engine();
	let output = engine
		.plan(PlanRequest {
			message: "Chengdu 3 days starting 2026-06-10, must_visit=Panda Base".into(),
			..Default::default()
		})
		.await;

	assert_eq!(output.status, PlanStatus::Done, "message: {}", output.message);
	let itinerary = output.itinerary.expect("itinerary");

	// The pinned stop stays in the schedule despite the closure.
	assert!(
		itinerary
			.scheduled_poi_ids()
			.any(|id| id == "cd-panda-base"),
		"panda base missing from schedule"
	);
	let issue = output
		.issues
		.iter()
		.find(|i| i.code == IssueCode::MustVisitClosed)
		.expect("MUST_VISIT_CLOSED issue");
	assert_eq!(issue.severity, app::models::Severity::High);
	assert!(
		itinerary
			.assumptions
			.iter()
			.any(|a| a.contains("closed")),
		"assumptions: {:?}",
		itinerary.assumptions
	);
}

#[tokio::test]
async fn itinerary_round_trips_through_json() {
	let engine = fixture_engine();
	let output = engine
		.plan(PlanRequest {
			message: "Beijing 2 days, history".into(),
			..Default::default()
		})
		.await;
	let itinerary = output.itinerary.expect("itinerary");

	let json = serde_json::to_string(&itinerary).unwrap();
	let back: Itinerary = serde_json::from_str(&json).unwrap();
	assert_eq!(back, itinerary);
}

#[tokio::test]
async fn strict_mode_fails_before_scheduling() {
	let config = Config {
		strict_external_data: true,
		..Config::default()
	};
	let engine = Engine::new(config);
	let output = engine
		.plan(PlanRequest {
			message: "Beijing 2 days".into(),
			..Default::default()
		})
		.await;

	assert_eq!(output.status, PlanStatus::Error);
	assert_eq!(output.error_code.as_deref(), Some("provider_unavailable"));
	assert!(output.itinerary.is_none());
}

#[tokio::test]
async fn empty_message_without_patch_is_input_invalid() {
	let engine = fixture_engine();
	let output = engine.plan(PlanRequest::default()).await;
	assert_eq!(output.status, PlanStatus::Error);
	assert_eq!(output.error_code.as_deref(), Some("input_invalid"));
}

#[tokio::test]
async fn same_session_requests_never_interleave() {
	let engine = Arc::new(fixture_engine());
	let first = engine
		.plan(PlanRequest {
			message: "Chengdu 2 days, food".into(),
			..Default::default()
		})
		.await;
	let session_id = first.session_id.clone();
	assert_eq!(first.session_seq, 1);

	let mut tasks = Vec::new();
	for _ in 0..8 {
		let engine = Arc::clone(&engine);
		let session_id = session_id.clone();
		tasks.push(tokio::spawn(async move {
			engine
				.plan(PlanRequest {
					message: "Chengdu 2 days, food".into(),
					session_id: Some(session_id),
					..Default::default()
				})
				.await
				.session_seq
		}));
	}
	let mut seqs = Vec::new();
	for task in tasks {
		seqs.push(task.await.unwrap());
	}
	seqs.sort_unstable();
	let expected: Vec<u64> = (2..=9).collect();
	assert_eq!(seqs, expected, "sequence numbers must be gapless and unique");
}

#[tokio::test]
async fn concurrent_sessions_all_terminate() {
	let engine = Arc::new(fixture_engine());
	let mut tasks = Vec::new();
	for i in 0..16 {
		let engine = Arc::clone(&engine);
		let message = if i % 2 == 0 {
			"Beijing 3 days, history"
		} else {
			"Shanghai 2 days, family"
		};
		tasks.push(tokio::spawn(async move {
			engine
				.plan(PlanRequest {
					message: message.into(),
					..Default::default()
				})
				.await
		}));
	}
	for task in tasks {
		let output = task.await.unwrap();
		assert_eq!(output.status, PlanStatus::Done, "message: {}", output.message);
	}
}

#[tokio::test]
async fn fingerprint_reports_degraded_fixture_run() {
	let engine = fixture_engine();
	let output = engine
		.plan(PlanRequest {
			message: "Beijing 2 days".into(),
			..Default::default()
		})
		.await;
	let fp = &output.run_fingerprint;
	assert_eq!(fp.route_provider, "fixture");
	assert_eq!(fp.llm_provider, "none");
	assert!(!fp.strict_external_data);
	assert!(!fp.trace_id.is_empty());
	assert_eq!(fp.trace_id, output.trace_id);
}
