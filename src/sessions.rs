/*
 * src/sessions.rs
 *
 * In-memory session and plan stores.
 *
 * Purpose:
 *   Per-session linearizability: each session owns a tokio Mutex held for the
 *   whole request touching it, and a sequence number bumped under that lock.
 *   Finished plans are kept by request id for the export endpoint.
 */

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Itinerary, PoiArena, TripConstraints, UserProfile};

/// Everything a follow-up chat request needs to edit and revalidate the last
/// plan without re-running retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSnapshot {
	pub constraints: TripConstraints,
	pub profile: UserProfile,
	/// Ranked candidate ids, best first; used by repair substitutions.
	pub pool: Vec<String>,
	pub arena: PoiArena,
	pub itinerary: Itinerary,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
	pub role: String,
	pub message: String,
	pub request_id: String,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionData {
	pub title: String,
	pub seq: u64,
	pub history: Vec<HistoryEntry>,
	pub snapshot: Option<PlanSnapshot>,
	pub updated_at: Option<DateTime<Utc>>,
}

pub struct SessionHandle {
	pub id: String,
	pub created_at: DateTime<Utc>,
	pub data: Mutex<SessionData>,
}

#[derive(Default)]
pub struct SessionStore {
	sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fetches the session, creating it when `id` is None or unknown.
	/// The caller must lock `data` before reading or writing session state.
	pub fn get_or_create(&self, id: Option<&str>) -> Arc<SessionHandle> {
		if let Some(id) = id {
			let sessions = self.sessions.read().expect("session lock poisoned");
			if let Some(handle) = sessions.get(id) {
				return Arc::clone(handle);
			}
		}

		let id = id
			.map(str::to_string)
			.unwrap_or_else(|| Uuid::new_v4().to_string());
		let handle = Arc::new(SessionHandle {
			id: id.clone(),
			created_at: Utc::now(),
			data: Mutex::new(SessionData::default()),
		});
		self.sessions
			.write()
			.expect("session lock poisoned")
			.insert(id, Arc::clone(&handle));
		handle
	}

	pub fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
		self.sessions
			.read()
			.expect("session lock poisoned")
			.get(id)
			.cloned()
	}

	/// Most recently updated sessions first.
	pub async fn list(&self, limit: usize) -> Vec<SessionSummary> {
		let handles: Vec<Arc<SessionHandle>> = {
			let sessions = self.sessions.read().expect("session lock poisoned");
			sessions.values().cloned().collect()
		};
		let mut summaries = Vec::with_capacity(handles.len());
		for handle in handles {
			let data = handle.data.lock().await;
			summaries.push(SessionSummary {
				session_id: handle.id.clone(),
				title: data.title.clone(),
				created_at: handle.created_at,
				updated_at: data.updated_at.unwrap_or(handle.created_at),
				seq: data.seq,
			});
		}
		summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
		summaries.truncate(limit);
		summaries
	}

	pub fn len(&self) -> usize {
		self.sessions.read().expect("session lock poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
	pub session_id: String,
	pub title: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub seq: u64,
}

/// A finished plan retained for export, keyed by request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPlan {
	pub request_id: String,
	pub session_id: String,
	pub created_at: DateTime<Utc>,
	pub itinerary: Itinerary,
	pub arena: PoiArena,
}

#[derive(Default)]
pub struct PlanStore {
	plans: RwLock<HashMap<String, StoredPlan>>,
}

impl PlanStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, plan: StoredPlan) {
		self.plans
			.write()
			.expect("plan lock poisoned")
			.insert(plan.request_id.clone(), plan);
	}

	pub fn get(&self, request_id: &str) -> Option<StoredPlan> {
		self.plans
			.read()
			.expect("plan lock poisoned")
			.get(request_id)
			.cloned()
	}

	pub fn len(&self) -> usize {
		self.plans.read().expect("plan lock poisoned").len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn get_or_create_is_stable() {
		let store = SessionStore::new();
		let first = store.get_or_create(None);
		let again = store.get_or_create(Some(&first.id));
		assert_eq!(first.id, again.id);
		assert_eq!(store.len(), 1);
	}

	#[tokio::test]
	async fn sequence_numbers_increase_under_lock() {
		let store = Arc::new(SessionStore::new());
		let handle = store.get_or_create(None);

		let mut tasks = Vec::new();
		for _ in 0..16 {
			let handle = Arc::clone(&handle);
			tasks.push(tokio::spawn(async move {
				let mut data = handle.data.lock().await;
				data.seq += 1;
				data.seq
			}));
		}
		let mut seen = Vec::new();
		for task in tasks {
			seen.push(task.await.unwrap());
		}
		seen.sort_unstable();
		let expected: Vec<u64> = (1..=16).collect();
		assert_eq!(seen, expected);
	}

	#[tokio::test]
	async fn list_orders_by_recency() {
		let store = SessionStore::new();
		let older = store.get_or_create(None);
		let newer = store.get_or_create(None);
		{
			let mut data = older.data.lock().await;
			data.updated_at = Some(Utc::now() - chrono::Duration::minutes(5));
		}
		{
			let mut data = newer.data.lock().await;
			data.updated_at = Some(Utc::now());
		}
		let listed = store.list(10).await;
		assert_eq!(listed[0].session_id, newer.id);
	}
}
