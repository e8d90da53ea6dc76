/*
 * src/http_models/plan.rs
 *
 * Request payloads for the planning endpoints. The response body is
 * [crate::pipeline::PlanOutput] serialized as-is.
 */

use serde::Deserialize;
use utoipa::ToSchema;

use crate::pipeline::intake::IntakeDraft;
use crate::pipeline::repair::EditPatch;

/// Soft-preference seed the caller can send alongside the message.
#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct UserProfileDraft {
	pub travelers_type: Option<String>,
	#[serde(default)]
	pub themes: Vec<String>,
	#[serde(default)]
	pub dietary: Vec<String>,
	#[serde(default)]
	pub mobility_limits: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct RequestMetadata {
	/// Local edit applied to the session's previous itinerary.
	pub edit_patch: Option<EditPatch>,
}

/// Body of `POST /api/plan`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PlanApiRequest {
	#[serde(default)]
	pub message: String,
	/// Structured constraints; they outrank anything parsed from the message.
	#[schema(value_type = Object)]
	pub constraints: Option<IntakeDraft>,
	pub user_profile: Option<UserProfileDraft>,
	pub metadata: Option<RequestMetadata>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatApiRequest {
	pub session_id: String,
	#[serde(default)]
	pub message: String,
	pub metadata: Option<RequestMetadata>,
}

/// Folds a separate user_profile object into the intake seed.
pub fn seed_from(
	constraints: Option<IntakeDraft>,
	user_profile: Option<UserProfileDraft>,
) -> Option<IntakeDraft> {
	match (constraints, user_profile) {
		(None, None) => None,
		(constraints, user_profile) => {
			let mut seed = constraints.unwrap_or_default();
			if let Some(profile) = user_profile {
				if seed.travelers_type.is_none() {
					seed.travelers_type = profile.travelers_type;
				}
				for theme in profile.themes {
					if !seed.themes.contains(&theme) {
						seed.themes.push(theme);
					}
				}
				seed.dietary.extend(profile.dietary);
				seed.mobility_limits.extend(profile.mobility_limits);
			}
			Some(seed)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn profile_folds_into_seed() {
		let profile = UserProfileDraft {
			travelers_type: Some("family".into()),
			themes: vec!["food".into()],
			..Default::default()
		};
		let seed = seed_from(None, Some(profile)).unwrap();
		assert_eq!(seed.travelers_type.as_deref(), Some("family"));
		assert_eq!(seed.themes, vec!["food".to_string()]);
	}

	#[test]
	fn request_body_parses_with_edit_patch() {
		let raw = r#"{
			"session_id": "s-1",
			"message": "",
			"metadata": {"edit_patch": {"lunch_break": {"day_number": 2}}}
		}"#;
		let req: ChatApiRequest = serde_json::from_str(raw).unwrap();
		assert!(matches!(
			req.metadata.unwrap().edit_patch,
			Some(EditPatch::LunchBreak { day_number: 2 })
		));
	}
}
