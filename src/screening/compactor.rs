//! History compaction: fold everything but the last two messages into the
//! rolling summary.

use std::sync::Arc;

use crate::error::Error;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::screening::prompts;
use crate::screening::state::{ConversationState, HandlerKind, StatePatch};

/// Messages kept verbatim after compaction.
const KEEP_TAIL: usize = 2;

pub const SUMMARY_PREFIX: &str = "Summary of previous conversation: ";

pub struct Compactor {
    llm: Arc<dyn LlmProvider>,
}

impl Compactor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Build the compaction patch. Returns an empty patch when there is
    /// nothing to fold.
    pub async fn compact(&self, state: &ConversationState) -> Result<StatePatch, Error> {
        let mut patch = StatePatch::new(HandlerKind::Compactor);
        let fold_len = state.messages.len().saturating_sub(KEEP_TAIL);
        if fold_len == 0 {
            return Ok(patch);
        }
        let folded = &state.messages[..fold_len];

        let transcript = folded
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let request = CompletionRequest::new(vec![ChatMessage::system(prompts::summary_prompt(
            &state.summary,
            &transcript,
        ))]);
        let response = self.llm.complete(request).await?;
        let summary = response.content.trim().to_string();

        tracing::info!(
            folded = fold_len,
            kept = KEEP_TAIL,
            summary_chars = summary.len(),
            "Compacted conversation history"
        );

        patch.remove_ids = folded.iter().map(|m| m.id).collect();
        patch.prepend = vec![ChatMessage::system(format!("{SUMMARY_PREFIX}{summary}"))];
        patch.summary = Some(summary);
        Ok(patch)
    }
}
