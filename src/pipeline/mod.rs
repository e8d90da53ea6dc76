/*
 * src/pipeline/mod.rs
 *
 * The orchestrator: a loop over explicit stage transitions carrying one
 * accumulating [PlanState].
 *
 *   Intake -> (Clarify -> return) | Retrieve -> Schedule -> Validate
 *          -> [Repair -> Validate]* -> Finalize
 *
 * The Validate->Repair edge is taken only while an unresolved issue of
 * severity >= medium exists, at most MAX_REPAIR_ROUNDS times; on exhaustion
 * the itinerary ships at L3 with the remaining issues attached. The whole
 * request runs under one deadline; external calls are the only suspension
 * points and are individually bounded besides.
 */

pub mod clarify;
pub mod intake;
pub mod repair;
pub mod retrieve;
pub mod routing;
pub mod schedule;
pub mod trust;
pub mod validate;

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{Config, RuntimeFlags};
use crate::error::{PlanError, PlanResult};
use crate::metrics::Metrics;
use crate::models::{
	DegradeLevel, Issue, IssueCode, Itinerary, PoiArena, RunFingerprint, Severity,
	TripConstraints, UserProfile, issue::weighted_sum,
};
use crate::providers::ProviderSet;
use crate::sessions::{HistoryEntry, PlanSnapshot, PlanStore, SessionStore, StoredPlan};
use crate::stage_trace;
use intake::IntakeDraft;
use repair::EditPatch;
use retrieve::{PoiQueryCache, RouteCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
	Done,
	Clarifying,
	Error,
}

/// One planning request, already pulled out of whatever transport carried it.
#[derive(Debug, Default)]
pub struct PlanRequest {
	pub message: String,
	pub session_id: Option<String>,
	pub constraints: Option<IntakeDraft>,
	pub edit_patch: Option<EditPatch>,
}

/// What the orchestrator hands back to the transport layer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlanOutput {
	pub status: PlanStatus,
	pub message: String,
	pub itinerary: Option<Itinerary>,
	pub session_id: String,
	pub request_id: String,
	pub trace_id: String,
	pub degrade_level: DegradeLevel,
	pub confidence_score: f64,
	pub issues: Vec<Issue>,
	pub next_questions: Vec<String>,
	pub field_evidence: BTreeMap<String, String>,
	pub budget_warning: Option<String>,
	pub run_fingerprint: RunFingerprint,
	/// Per-session sequence number, bumped under the session lock.
	pub session_seq: u64,
	pub error_code: Option<String>,
}

/// Everything a request accumulates while moving through the stages.
struct PlanState {
	constraints: TripConstraints,
	profile: UserProfile,
	field_evidence: BTreeMap<String, String>,
	pool: Vec<crate::models::Poi>,
	arena: PoiArena,
	itinerary: Itinerary,
	issues: Vec<Issue>,
	repair_rounds: u32,
	degrade_floor: DegradeLevel,
	routing_confidence: f64,
	realtime_used: bool,
}

pub struct Engine {
	pub config: Config,
	pub flags: RuntimeFlags,
	pub providers: ProviderSet,
	pub sessions: SessionStore,
	pub plans: PlanStore,
	pub metrics: Metrics,
	pub poi_cache: PoiQueryCache,
	pub route_cache: RouteCache,
	pub limiter: crate::ratelimit::RateLimiter,
}

impl Engine {
	pub fn new(config: Config) -> Self {
		let providers = ProviderSet::from_config(&config);
		let limiter =
			crate::ratelimit::RateLimiter::new(config.rate_limit_max, config.rate_limit_window);
		Self {
			config,
			flags: RuntimeFlags::default(),
			providers,
			sessions: SessionStore::new(),
			plans: PlanStore::new(),
			metrics: Metrics::new(),
			poi_cache: PoiQueryCache::with_defaults(),
			route_cache: RouteCache::with_defaults(),
			limiter,
		}
	}

	/// Entry point for both `/plan` and `/chat`. Holds the session lock for
	/// the whole request so requests on one session never interleave.
	pub async fn plan(&self, request: PlanRequest) -> PlanOutput {
		let request_id = Uuid::new_v4().to_string();
		let trace_id = Uuid::new_v4().to_string();
		let started = Instant::now();
		self.metrics
			.requests_total
			.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

		let session = self.sessions.get_or_create(request.session_id.as_deref());
		let mut session_data = session.data.lock().await;
		session_data.seq += 1;
		let session_seq = session_data.seq;
		if session_data.title.is_empty() && !request.message.trim().is_empty() {
			session_data.title = request.message.chars().take(60).collect();
		}
		session_data.history.push(HistoryEntry {
			role: "user".to_string(),
			message: request.message.clone(),
			request_id: request_id.clone(),
			timestamp: Utc::now(),
		});

		let deadline = Instant::now() + self.config.request_deadline;
		let outcome = tokio::time::timeout(
			self.config.request_deadline,
			self.drive(&request, &mut session_data, deadline),
		)
		.await
		.unwrap_or(Err(PlanError::DeadlineExceeded));

		let elapsed = started.elapsed().as_millis() as u64;
		self.metrics
			.pipeline_millis_total
			.fetch_add(elapsed, std::sync::atomic::Ordering::Relaxed);

		let mut output = match outcome {
			Ok(mut output) => {
				output.session_id = session.id.clone();
				output.request_id = request_id.clone();
				output.trace_id = trace_id.clone();
				output
			}
			Err(e) => {
				warn!(target: "pipeline", error = %e, error_code = e.code(), "request failed");
				self.metrics
					.requests_error
					.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
				PlanOutput {
					status: PlanStatus::Error,
					message: e.to_string(),
					itinerary: None,
					session_id: session.id.clone(),
					request_id: request_id.clone(),
					trace_id: trace_id.clone(),
					degrade_level: DegradeLevel::L3,
					confidence_score: 0.0,
					issues: Vec::new(),
					next_questions: Vec::new(),
					field_evidence: BTreeMap::new(),
					budget_warning: None,
					run_fingerprint: trust::fingerprint(
						&self.config,
						&self.providers,
						false,
						&trace_id,
					),
					session_seq,
					error_code: Some(e.code().to_string()),
				}
			}
		};
		output.session_seq = session_seq;
		output.run_fingerprint.trace_id = trace_id;

		session_data.history.push(HistoryEntry {
			role: "assistant".to_string(),
			message: output.message.clone(),
			request_id,
			timestamp: Utc::now(),
		});
		session_data.updated_at = Some(Utc::now());

		match output.status {
			PlanStatus::Done => {
				self.metrics
					.requests_done
					.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
			}
			PlanStatus::Clarifying => {
				self.metrics
					.requests_clarifying
					.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
			}
			PlanStatus::Error => {}
		}

		output
	}

	/// The stage loop proper. Runs with the session lock held and the
	/// deadline armed by the caller.
	async fn drive(
		&self,
		request: &PlanRequest,
		session_data: &mut crate::sessions::SessionData,
		deadline: Instant,
	) -> PlanResult<PlanOutput> {
		if request.message.trim().is_empty() && request.edit_patch.is_none() {
			return Err(PlanError::InputInvalid(
				"message must not be empty".to_string(),
			));
		}

		// Edit patches short-circuit intake and retrieval entirely: load the
		// prior plan, apply the patch, and re-enter at Validate.
		let mut state = if let Some(patch) = &request.edit_patch {
			stage_trace!(stage: "edit_patch", status: "begin");
			let snapshot = session_data.snapshot.clone().ok_or_else(|| {
				PlanError::InputInvalid("no prior itinerary in this session to edit".to_string())
			})?;
			let itinerary = repair::apply_edit_patch(
				snapshot.itinerary,
				patch,
				&snapshot.arena,
				&snapshot.constraints,
				&snapshot.profile,
				&self.config,
			)?;
			let pool: Vec<crate::models::Poi> = snapshot
				.pool
				.iter()
				.filter_map(|id| snapshot.arena.get(id))
				.cloned()
				.collect();
			PlanState {
				constraints: snapshot.constraints,
				profile: snapshot.profile,
				field_evidence: BTreeMap::new(),
				pool,
				arena: snapshot.arena,
				itinerary,
				issues: Vec::new(),
				repair_rounds: 0,
				degrade_floor: DegradeLevel::L0,
				routing_confidence: 0.5,
				realtime_used: false,
			}
		} else {
			// Intake. Runtime flags are read once here, not mid-request.
			let (_engine_version, strict_required_fields) = self.flags.snapshot();
			stage_trace!(stage: "intake", status: "begin");
			let intake_out = intake::run(
				&request.message,
				request.constraints.as_ref(),
				&self.providers,
				&self.config,
				strict_required_fields,
				Some(deadline),
			)
			.await;
			stage_trace!(stage: "intake", status: "done");

			let Some(constraints) = intake_out.constraints else {
				// Clarify, then stop: no scheduling on an incomplete request.
				stage_trace!(stage: "clarify", status: "begin");
				let questions =
					clarify::run(&intake_out.missing, &self.providers, Some(deadline)).await;
				return Ok(self.clarifying_output(questions, intake_out.field_evidence));
			};

			// Retrieve.
			stage_trace!(stage: "retrieve", status: "begin");
			let retrieved = retrieve::run(
				&constraints,
				&intake_out.profile,
				&self.providers,
				&self.config,
				&self.poi_cache,
				Some(deadline),
			)
			.await?;
			stage_trace!(stage: "retrieve", status: "done", details: format!("pool={}", retrieved.pois.len()));

			let mut arena = PoiArena::default();
			for poi in &retrieved.pois {
				arena.insert(poi.clone());
			}

			// Schedule.
			stage_trace!(stage: "schedule", status: "begin");
			let scheduled = schedule::run(
				&constraints,
				&intake_out.profile,
				&retrieved.pois,
				&self.providers,
				&self.config,
				&self.route_cache,
				Some(deadline),
			)
			.await?;
			stage_trace!(stage: "schedule", status: "done");

			let realtime_used = retrieved.used_map_provider
				|| self.providers.route_provider_name() == "mapreal";
			PlanState {
				constraints,
				profile: intake_out.profile,
				field_evidence: intake_out.field_evidence,
				pool: retrieved.pois,
				arena,
				itinerary: scheduled.itinerary,
				issues: Vec::new(),
				repair_rounds: 0,
				degrade_floor: if retrieved.used_llm_fallback {
					DegradeLevel::L1
				} else {
					DegradeLevel::L0
				},
				routing_confidence: scheduled.routing_confidence,
				realtime_used,
			}
		};

		// Validate / repair fixpoint, bounded by MAX_REPAIR_ROUNDS.
		self.validate_and_repair(&mut state);

		// Finalize.
		Ok(self.finalize(state, session_data))
	}

	fn combined_issues(&self, state: &PlanState) -> Vec<Issue> {
		let mut issues = validate::run(
			&state.itinerary,
			&state.arena,
			&state.constraints,
			&self.config,
		);
		// Structural findings the scheduler already made (must-visit closures)
		// ride along on the itinerary itself. Only those carry over: validator
		// findings from an earlier round would otherwise be counted twice.
		issues.extend(
			state
				.itinerary
				.issues
				.iter()
				.filter(|i| i.code == IssueCode::MustVisitClosed)
				.cloned(),
		);
		issues
	}

	fn validate_and_repair(&self, state: &mut PlanState) {
		stage_trace!(stage: "validate", status: "begin");
		state.issues = self.combined_issues(state);

		let needs_repair =
			|issues: &[Issue]| issues.iter().any(|i| i.severity >= Severity::Medium);

		while needs_repair(&state.issues) && state.repair_rounds < self.config.max_repair_rounds {
			state.repair_rounds += 1;
			stage_trace!(stage: "repair", status: "begin", details: format!("round={}", state.repair_rounds));

			let cost_before = state.itinerary.total_cost;
			let weight_before = weighted_sum(&state.issues);

			let outcome = repair::run(
				state.itinerary.clone(),
				&state.issues,
				&state.pool,
				&state.arena,
				&state.constraints,
				&state.profile,
				&self.config,
			);
			for _ in &outcome.strategies_used {
				state.degrade_floor = state.degrade_floor.bump();
			}
			let changed = !outcome.strategies_used.is_empty();
			state.itinerary = outcome.itinerary;

			state.issues = self.combined_issues(state);

			// Progress invariant: cost strictly down, or the severity-weighted
			// issue sum strictly down; otherwise the loop cannot converge.
			let progress = state.itinerary.total_cost < cost_before - 1e-9
				|| weighted_sum(&state.issues) < weight_before;
			if !changed || !progress {
				info!(
					target: "pipeline",
					round = state.repair_rounds,
					changed,
					"repair made no progress, accepting itinerary"
				);
				break;
			}
		}

		if needs_repair(&state.issues) && state.repair_rounds >= self.config.max_repair_rounds {
			state.degrade_floor = DegradeLevel::L3;
		}
		self.metrics.record_repair_rounds(state.repair_rounds);
	}

	fn finalize(
		&self,
		mut state: PlanState,
		session_data: &mut crate::sessions::SessionData,
	) -> PlanOutput {
		stage_trace!(stage: "finalize", status: "begin");
		let report = trust::assess(
			&state.itinerary,
			&state.arena,
			state.routing_confidence,
			state.realtime_used,
		);

		state.itinerary.confidence_score = report.confidence_score;
		state.itinerary.degrade_level = report.degrade_level.max(state.degrade_floor);
		state.itinerary.issues = state.issues.clone();

		let budget_warning = state
			.issues
			.iter()
			.find(|i| i.code == IssueCode::BudgetUnrealistic)
			.map(|i| i.evidence.clone());

		let fingerprint = trust::fingerprint(
			&self.config,
			&self.providers,
			state.realtime_used,
			"", // filled by the caller with the real trace id
		);

		let message = format!(
			"Planned {} day(s) in {} with {} stop(s); estimated cost {:.0}.",
			state.itinerary.days.len(),
			state.itinerary.city,
			state
				.itinerary
				.days
				.iter()
				.map(|d| d.items.len())
				.sum::<usize>(),
			state.itinerary.total_cost,
		);

		// Remember enough to serve edit patches and exports later.
		session_data.snapshot = Some(PlanSnapshot {
			constraints: state.constraints.clone(),
			profile: state.profile.clone(),
			pool: state.pool.iter().map(|p| p.id.clone()).collect(),
			arena: state.arena.clone(),
			itinerary: state.itinerary.clone(),
		});

		PlanOutput {
			status: PlanStatus::Done,
			message,
			degrade_level: state.itinerary.degrade_level,
			confidence_score: state.itinerary.confidence_score,
			issues: state.issues,
			itinerary: Some(state.itinerary),
			session_id: String::new(),
			request_id: String::new(),
			trace_id: String::new(),
			next_questions: Vec::new(),
			field_evidence: state.field_evidence,
			budget_warning,
			run_fingerprint: fingerprint,
			session_seq: 0,
			error_code: None,
		}
	}

	fn clarifying_output(
		&self,
		questions: Vec<String>,
		field_evidence: BTreeMap<String, String>,
	) -> PlanOutput {
		PlanOutput {
			status: PlanStatus::Clarifying,
			message: "I need a little more information before planning.".to_string(),
			itinerary: None,
			session_id: String::new(),
			request_id: String::new(),
			trace_id: String::new(),
			degrade_level: DegradeLevel::L0,
			confidence_score: 0.0,
			issues: Vec::new(),
			next_questions: questions,
			field_evidence,
			budget_warning: None,
			run_fingerprint: trust::fingerprint(&self.config, &self.providers, false, ""),
			session_seq: 0,
			error_code: None,
		}
	}

	/// Persists a finished plan for the export endpoint. Called by the
	/// controller once ids are final.
	pub async fn store_plan(&self, output: &PlanOutput) {
		let Some(itinerary) = &output.itinerary else {
			return;
		};
		let arena = {
			let session = self.sessions.get(&output.session_id);
			match session {
				Some(handle) => {
					let data = handle.data.lock().await;
					data.snapshot
						.as_ref()
						.map(|s| s.arena.clone())
						.unwrap_or_default()
				}
				None => PoiArena::default(),
			}
		};
		self.plans.insert(StoredPlan {
			request_id: output.request_id.clone(),
			session_id: output.session_id.clone(),
			created_at: Utc::now(),
			itinerary: itinerary.clone(),
			arena,
		});
	}
}
