//! Bridges rig-core completion models to `LlmProvider`.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message as RigMessage};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role,
};

/// Adapter from a rig `CompletionModel` to our provider trait.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider: provider.to_string(),
        }
    }
}

/// Split our flat message list into rig's (preamble, history, prompt).
///
/// System messages are joined into the preamble. The last non-system
/// message becomes the prompt.
fn split_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<RigMessage>, RigMessage) {
    let preamble: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let preamble = if preamble.is_empty() {
        None
    } else {
        Some(preamble.join("\n\n"))
    };

    let mut history: Vec<RigMessage> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| match m.role {
            Role::Assistant => RigMessage::assistant(m.content.clone()),
            _ => RigMessage::user(m.content.clone()),
        })
        .collect();

    let prompt = history
        .pop()
        .unwrap_or_else(|| RigMessage::user("Please respond."));
    (preamble, history, prompt)
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, history, prompt) = split_messages(&request.messages);

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens as u64);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::from_provider_message(&self.provider, &e.to_string()))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.provider.clone(),
                reason: "empty completion".to_string(),
            });
        }

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens as u32,
            output_tokens: response.usage.output_tokens as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_moves_system_into_preamble() {
        let messages = vec![
            ChatMessage::system("rules"),
            ChatMessage::assistant("Hello!"),
            ChatMessage::system("Summary of previous conversation: calm"),
            ChatMessage::user("hi"),
        ];
        let (preamble, history, _prompt) = split_messages(&messages);
        let preamble = preamble.unwrap();
        assert!(preamble.starts_with("rules"));
        assert!(preamble.contains("calm"));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn split_without_user_messages_still_has_prompt() {
        let (preamble, history, _prompt) = split_messages(&[ChatMessage::system("only")]);
        assert_eq!(preamble.as_deref(), Some("only"));
        assert!(history.is_empty());
    }
}
