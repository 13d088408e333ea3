//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use phq_screen::analysis::{
    BackgroundAnalyzer, EmotionClassifier, NeutralClassifier, SuicideRiskClassifier,
};
use phq_screen::config::ScreeningConfig;
use phq_screen::dashboard::SharedStateStore;
use phq_screen::error::LlmError;
use phq_screen::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use phq_screen::screening::ScreeningSession;

pub const RAPPORT_REPLY: &str = "That sounds hard. Tell me more about it.";
pub const PERMISSION_REPLY: &str = "Would you be okay with starting a short questionnaire now?";
pub const CLARIFY_REPLY: &str = "Could you tell me how often, for example several days or nearly every day?";
pub const SUMMARY_REPLY: &str = "Student under exam stress, answering PHQ-9.";
pub const ADVICE_REPLY: &str = "It may help to talk to a counsellor about the exam pressure.";

/// Stands in for a real model: recognises each prompt the screening core
/// sends and answers it the way a well-behaved model would.
#[derive(Default)]
pub struct FakeModel {
    calls: Mutex<Vec<CompletionRequest>>,
    reject_credentials: bool,
}

impl FakeModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A model whose every call fails authentication.
    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject_credentials: true,
            ..Self::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// How many requests carried a system prompt containing `marker`.
    pub fn calls_containing(&self, marker: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system_prompt().is_some_and(|p| p.contains(marker)))
            .count()
    }
}

/// Text between `prefix` and the next double quote.
fn quoted_after<'a>(prompt: &'a str, prefix: &str) -> &'a str {
    prompt
        .split_once(prefix)
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(inner, _)| inner)
        .unwrap_or("")
}

fn score_answer(answer: &str) -> String {
    let answer = answer.to_lowercase();
    let score = if answer.contains("nearly every day") {
        Some(3)
    } else if answer.contains("more than half") {
        Some(2)
    } else if answer.contains("several days") {
        Some(1)
    } else if answer.contains("not at all") {
        Some(0)
    } else {
        None
    };
    match score {
        Some(s) => format!(r#"{{"is_relevant": true, "is_ambiguous": false, "score": {s}}}"#),
        None => r#"{"is_relevant": true, "is_ambiguous": true, "score": null}"#.to_string(),
    }
}

fn respond(prompt: &str) -> String {
    if prompt.contains("genuinely agreeing") {
        let reply = quoted_after(prompt, "The user replied: \"").to_lowercase();
        let start = reply.contains("yes") || reply.contains("sure");
        format!(r#"{{"start": {start}}}"#)
    } else if prompt.contains("Task:") {
        score_answer(quoted_after(prompt, "The user answered: \""))
    } else if prompt.contains("was ambiguous or irrelevant") {
        CLARIFY_REPLY.to_string()
    } else if prompt.contains("Distill the following conversation") {
        SUMMARY_REPLY.to_string()
    } else if prompt.contains("completed the PHQ-9 screening") {
        ADVICE_REPLY.to_string()
    } else if prompt.contains("permission") {
        PERMISSION_REPLY.to_string()
    } else {
        RAPPORT_REPLY.to_string()
    }
}

#[async_trait]
impl LlmProvider for FakeModel {
    fn model_name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if self.reject_credentials {
            return Err(LlmError::AuthFailed {
                provider: "fake".to_string(),
            });
        }
        let content = respond(request.system_prompt().unwrap_or_default());
        self.calls.lock().unwrap().push(request);
        Ok(CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

pub fn temp_store() -> (tempfile::TempDir, Arc<SharedStateStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SharedStateStore::new(dir.path().join("dashboard_state.json")));
    (dir, store)
}

/// Session with background analysis switched off so the shared document
/// only reflects screening results.
pub fn session(llm: Arc<FakeModel>, store: Arc<SharedStateStore>) -> ScreeningSession {
    let neutral = Arc::new(NeutralClassifier);
    let analyzer = BackgroundAnalyzer::new(neutral.clone(), neutral, store.clone(), false);
    ScreeningSession::new(llm, store, analyzer, &ScreeningConfig::default())
}

/// Session with background analysis on, using the given classifiers.
pub fn analysed_session(
    llm: Arc<FakeModel>,
    store: Arc<SharedStateStore>,
    emotion: Arc<dyn EmotionClassifier>,
    risk: Arc<dyn SuicideRiskClassifier>,
) -> ScreeningSession {
    let analyzer = BackgroundAnalyzer::new(emotion, risk, store.clone(), true);
    ScreeningSession::new(llm, store, analyzer, &ScreeningConfig::default())
}
