/*
 * src/providers/llm.rs
 *
 * LLM-backed [Generate] implementation. The model is called directly with a
 * prompt per use (intake parsing, clarify phrasing, POI fallback); callers own
 * their prompts and the parsing of replies. The concrete model comes from the
 * configured priority list, first recognized name wins.
 */

use std::sync::Arc;

use async_trait::async_trait;
use langchain_rust::language_models::llm::LLM;
use langchain_rust::llm::openai::{OpenAI, OpenAIModel};
use tracing::{debug, info};

use super::{Generate, ProviderError};

/// Maps one priority-list entry to a concrete model. Names are matched on
/// their alphanumerics so "gpt-4o-mini" and "gpt4o mini" read the same.
fn model_of(name: &str) -> Option<OpenAIModel> {
	let key: String = name
		.chars()
		.filter(|c| c.is_ascii_alphanumeric())
		.collect::<String>()
		.to_ascii_lowercase();
	match key.as_str() {
		"gpt4omini" => Some(OpenAIModel::Gpt4oMini),
		"gpt4o" => Some(OpenAIModel::Gpt4o),
		"gpt4turbo" => Some(OpenAIModel::Gpt4Turbo),
		"gpt4" => Some(OpenAIModel::Gpt4),
		"gpt35" | "gpt35turbo" => Some(OpenAIModel::Gpt35),
		_ => None,
	}
}

pub struct LlmProvider {
	llm: Arc<dyn LLM + Send + Sync>,
}

impl LlmProvider {
	/// Reads the API key from the environment, like the rest of the OpenAI
	/// client configuration.
	pub fn new() -> Self {
		Self::from_priority(&[])
	}

	/// Walks the `LLM_PROVIDER_PRIORITY` list and takes the first entry that
	/// names a known model; unknown entries are skipped, an empty or fully
	/// unrecognized list falls back to the default model.
	pub fn from_priority(priority: &[String]) -> Self {
		let model = priority
			.iter()
			.find_map(|name| {
				let model = model_of(name);
				if model.is_none() {
					debug!(target: "providers", name = %name, "unknown model in priority list, skipping");
				}
				model
			})
			.unwrap_or(OpenAIModel::Gpt4oMini);
		info!(target: "providers", model = %model.to_string(), "llm provider model selected");
		let llm = OpenAI::default().with_model(model);
		Self { llm: Arc::new(llm) }
	}
}

impl Default for LlmProvider {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Generate for LlmProvider {
	fn name(&self) -> &'static str {
		"openai"
	}

	async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
		let response = self
			.llm
			.invoke(prompt)
			.await
			.map_err(|e| ProviderError::Unavailable(format!("llm: {e}")))?;
		debug!(target: "providers", chars = response.len(), "llm reply received");
		Ok(response)
	}
}

/// Strips the markdown fences models wrap JSON replies in.
pub fn strip_code_fences(reply: &str) -> &str {
	reply
		.trim()
		.trim_start_matches("```json")
		.trim_start_matches("```")
		.trim_end_matches("```")
		.trim()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fence_stripping() {
		assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
		assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
	}

	#[test]
	fn priority_names_map_to_models() {
		assert!(matches!(model_of("gpt-4o-mini"), Some(OpenAIModel::Gpt4oMini)));
		assert!(matches!(model_of("GPT-4o"), Some(OpenAIModel::Gpt4o)));
		assert!(matches!(model_of("gpt-4-turbo"), Some(OpenAIModel::Gpt4Turbo)));
		assert!(matches!(model_of("gpt-3.5-turbo"), Some(OpenAIModel::Gpt35)));
		assert!(model_of("claude-sonnet").is_none());
	}
}
