/*
 * src/pipeline/clarify.rs
 *
 * Emits 1-3 targeted follow-up questions when intake could not fill the
 * required fields. Template phrasings by default; when a generator is
 * configured the phrasing is rewritten by the LLM but the fields asked about
 * stay the same.
 */

use std::time::Instant;

use tracing::debug;

use super::intake::ClarifyField;
use crate::providers::retry::{CallPolicy, call_external};
use crate::providers::ProviderSet;

const MAX_QUESTIONS: usize = 3;

fn template_question(field: ClarifyField) -> &'static str {
	match field {
		ClarifyField::City => "Which city would you like to visit?",
		ClarifyField::Days => "How many days will your trip last?",
		ClarifyField::Dates => "Do you have concrete travel dates (YYYY-MM-DD)?",
		ClarifyField::Budget => "What is your rough daily budget?",
		ClarifyField::Themes => "What are you most interested in (history, food, nature, ...)?",
	}
}

/// Builds the question list. `missing` is already in priority order
/// (city > days > dates > budget > themes).
pub async fn run(
	missing: &[ClarifyField],
	providers: &ProviderSet,
	deadline: Option<Instant>,
) -> Vec<String> {
	let fields: Vec<ClarifyField> = missing.iter().copied().take(MAX_QUESTIONS).collect();
	let mut questions: Vec<String> = fields
		.iter()
		.map(|f| template_question(*f).to_string())
		.collect();

	if let Some(generator) = providers.generator.as_deref() {
		let prompt = format!(
			"Rephrase these travel-planning questions in a friendly tone, one per line, \
			 keeping their meaning and order. Reply with the questions only.\n{}",
			questions.join("\n")
		);
		match call_external("llm", CallPolicy::llm(), deadline, || {
			generator.generate(&prompt)
		})
		.await
		{
			Ok(reply) => {
				let rephrased: Vec<String> = reply
					.lines()
					.map(str::trim)
					.filter(|l| !l.is_empty())
					.map(str::to_string)
					.collect();
				// Only adopt the rewrite when it kept the shape.
				if rephrased.len() == questions.len() {
					questions = rephrased;
				}
			}
			Err(e) => {
				debug!(target: "clarify", error = %e, "llm phrasing unavailable, keeping templates");
			}
		}
	}

	questions
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;

	#[tokio::test]
	async fn caps_at_three_questions_in_priority_order() {
		let providers = ProviderSet::from_config(&Config::default());
		let missing = vec![
			ClarifyField::City,
			ClarifyField::Days,
			ClarifyField::Dates,
			ClarifyField::Budget,
			ClarifyField::Themes,
		];
		let questions = run(&missing, &providers, None).await;
		assert_eq!(questions.len(), 3);
		assert!(questions[0].contains("city"));
		assert!(questions[1].contains("days"));
	}
}
