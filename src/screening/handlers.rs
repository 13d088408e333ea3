//! One handler per interview phase. Each reads the state and returns a
//! `StatePatch`; none of them mutate anything directly.

use std::sync::Arc;

use crate::dashboard::model::{ExternalFactor, OrdinalScore, Symptom};
use crate::error::Error;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::screening::extractor::{ScoreExtractor, parse_option};
use crate::screening::prompts::{self, PHQ9_QUESTIONS};
use crate::screening::state::{ConversationState, HandlerKind, Phase, SharedEffect, StatePatch};

/// Level published for an affirmative yes/no answer. Negative answers map to 0.
const AFFIRMATIVE_LEVEL: u8 = 2;

#[derive(serde::Deserialize)]
struct ConsentVerdict {
    start: bool,
}

pub struct PhaseHandlers {
    llm: Arc<dyn LlmProvider>,
    extractor: ScoreExtractor,
    max_clarifications: u32,
}

impl PhaseHandlers {
    pub fn new(llm: Arc<dyn LlmProvider>, max_clarifications: u32) -> Self {
        Self {
            extractor: ScoreExtractor::new(llm.clone()),
            llm,
            max_clarifications,
        }
    }

    /// Run the handler for the current phase.
    pub async fn run(&self, state: &ConversationState) -> Result<StatePatch, Error> {
        match state.phase {
            Phase::Rapport => self.rapport(state).await,
            Phase::Permission => self.permission(state).await,
            Phase::Questionnaire => self.questionnaire(state).await,
            Phase::AdditionalFinancial | Phase::AdditionalStudy => Ok(additional(state)),
            Phase::Advice => self.advice(state).await,
            Phase::End => Ok(end()),
        }
    }

    /// Chat completion over the full history with a phase-specific system prompt.
    async fn chat(&self, system: String, state: &ConversationState) -> Result<String, Error> {
        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(ChatMessage::system(system));
        messages.extend(state.messages.iter().cloned());
        let response = self.llm.complete(CompletionRequest::new(messages)).await?;
        Ok(response.content.trim().to_string())
    }

    async fn rapport(&self, state: &ConversationState) -> Result<StatePatch, Error> {
        if !state.phq9_responses.is_empty() {
            return Ok(StatePatch::new(HandlerKind::Rapport)
                .phase(Phase::End)
                .reply(prompts::ALREADY_SCREENED));
        }

        let name = state.patient_info.as_deref().unwrap_or("there");
        let reply = self.chat(prompts::rapport_system_prompt(name), state).await?;
        let next = if state.messages.len() > 2 {
            Phase::Permission
        } else {
            Phase::Rapport
        };
        Ok(StatePatch::new(HandlerKind::Rapport).phase(next).reply(reply))
    }

    async fn permission(&self, state: &ConversationState) -> Result<StatePatch, Error> {
        if state.permission_asked {
            if let (Some(asked), Some(reply)) = (state.last_assistant_text(), state.last_user_text())
            {
                if self.consents(asked, reply).await? {
                    tracing::info!("Screening consent given");
                    return Ok(StatePatch::new(HandlerKind::Permission)
                        .phase(Phase::Questionnaire)
                        .reply(prompts::questionnaire_intro()));
                }
            }
        }

        let reply = self
            .chat(prompts::PERMISSION_SYSTEM_PROMPT.to_string(), state)
            .await?;
        let mut patch = StatePatch::new(HandlerKind::Permission)
            .phase(Phase::Permission)
            .reply(reply);
        patch.permission_asked = Some(true);
        Ok(patch)
    }

    /// Whether `reply` is a genuine "start now" answer to `asked`.
    /// Unparseable verdicts count as no.
    async fn consents(&self, asked: &str, reply: &str) -> Result<bool, Error> {
        let request = CompletionRequest::new(vec![ChatMessage::system(prompts::consent_prompt(
            asked, reply,
        ))])
        .with_temperature(0.0)
        .with_max_tokens(50);
        let response = self.llm.complete(request).await?;
        match crate::screening::extractor::parse_structured::<ConsentVerdict>(&response.content) {
            Ok(verdict) => Ok(verdict.start),
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable consent verdict, staying in permission");
                Ok(false)
            }
        }
    }

    async fn questionnaire(&self, state: &ConversationState) -> Result<StatePatch, Error> {
        let index = state.current_question_index;
        let Some(question) = PHQ9_QUESTIONS.get(index) else {
            return Ok(StatePatch::new(HandlerKind::Questionnaire)
                .phase(Phase::AdditionalFinancial)
                .reply(completion_message()));
        };

        let Some(answer) = state.last_user_text() else {
            return Ok(StatePatch::new(HandlerKind::Questionnaire)
                .phase(Phase::Questionnaire)
                .reply(*question));
        };

        let attempts = state.clarification_attempts;
        if attempts > self.max_clarifications {
            // Picker already shown: only a deterministic match is accepted.
            return Ok(match parse_option(answer) {
                Some(score) => record_answer(index, score),
                None => clarify(attempts, prompts::strict_picker(question)),
            });
        }

        match self.extractor.classify(question, answer).await {
            Ok(classification) => match classification.accepted_score() {
                Some(score) => Ok(record_answer(index, score)),
                None if attempts < self.max_clarifications => {
                    let text = self.extractor.clarify(question, answer).await?;
                    tracing::debug!(question = index, attempts = attempts + 1, "Asking for clarification");
                    Ok(clarify(attempts, text))
                }
                None => {
                    tracing::info!(question = index, "Clarifications exhausted, showing option picker");
                    Ok(clarify(attempts, prompts::strict_picker(question)))
                }
            },
            Err(Error::Extraction(_)) => Ok(clarify(attempts, prompts::PARSE_FAILURE_REPLY.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn advice(&self, state: &ConversationState) -> Result<StatePatch, Error> {
        if state.last_user_text().is_some_and(prompts::is_farewell) {
            return Ok(StatePatch::new(HandlerKind::Advice)
                .phase(Phase::End)
                .reply(prompts::FAREWELL_REPLY));
        }
        self.advise(state).await
    }

    /// Advice reply with no farewell check. Used for the first advice turn,
    /// chained straight after the study-pressure answer, which is a reply to
    /// a yes/no question and never a goodbye.
    pub async fn advise(&self, state: &ConversationState) -> Result<StatePatch, Error> {
        let reply = self.chat(prompts::advice_system_prompt(state), state).await?;
        Ok(StatePatch::new(HandlerKind::Advice).phase(Phase::Advice).reply(reply))
    }
}

fn completion_message() -> String {
    format!("{}\n\n{}", prompts::QUESTIONNAIRE_DONE, prompts::FINANCIAL_QUESTION)
}

fn record_answer(index: usize, score: OrdinalScore) -> StatePatch {
    let next = index + 1;
    let mut patch = StatePatch::new(HandlerKind::Questionnaire);
    patch.record_score = Some((index, score));
    patch.current_question_index = Some(next);
    patch.clarification_attempts = Some(0);
    if let Some(symptom) = Symptom::for_question(index) {
        patch = patch.effect(SharedEffect::Symptom { symptom, score });
    }
    tracing::info!(question = index, score = score.value(), "Recorded answer");

    match PHQ9_QUESTIONS.get(next) {
        Some(question) => patch.phase(Phase::Questionnaire).reply(*question),
        None => patch
            .phase(Phase::AdditionalFinancial)
            .reply(completion_message()),
    }
}

fn clarify(attempts: u32, text: String) -> StatePatch {
    let mut patch = StatePatch::new(HandlerKind::Questionnaire)
        .phase(Phase::Questionnaire)
        .reply(text);
    patch.clarification_attempts = Some(attempts.saturating_add(1));
    patch
}

fn factor_level(answer: &str) -> OrdinalScore {
    let level = if prompts::is_affirmative(answer) {
        AFFIRMATIVE_LEVEL
    } else {
        0
    };
    OrdinalScore::new(level).unwrap_or_default()
}

/// Financial question, then study question. No model call.
fn additional(state: &ConversationState) -> StatePatch {
    let answer = state.last_user_text();

    if state.financial_distress.is_none() {
        return match (state.phase, answer) {
            (Phase::AdditionalFinancial, Some(answer)) => {
                let mut patch = StatePatch::new(HandlerKind::Additional)
                    .phase(Phase::AdditionalStudy)
                    .effect(SharedEffect::ExternalFactor {
                        factor: ExternalFactor::FinancialPressure,
                        level: factor_level(answer),
                    })
                    .reply(prompts::STUDY_QUESTION);
                patch.financial_distress = Some(answer.to_string());
                patch
            }
            _ => StatePatch::new(HandlerKind::Additional)
                .phase(Phase::AdditionalFinancial)
                .reply(prompts::FINANCIAL_QUESTION),
        };
    }

    if state.study_pressure.is_none() {
        return match (state.phase, answer) {
            (Phase::AdditionalStudy, Some(answer)) => {
                // No reply: the router hands straight on to advice.
                let mut patch = StatePatch::new(HandlerKind::Additional)
                    .phase(Phase::Advice)
                    .effect(SharedEffect::ExternalFactor {
                        factor: ExternalFactor::StudyPressure,
                        level: factor_level(answer),
                    });
                patch.study_pressure = Some(answer.to_string());
                patch
            }
            _ => StatePatch::new(HandlerKind::Additional)
                .phase(Phase::AdditionalStudy)
                .reply(prompts::STUDY_QUESTION),
        };
    }

    let next = if state.phase == Phase::AdditionalStudy {
        Phase::Advice
    } else {
        Phase::AdditionalStudy
    };
    StatePatch::new(HandlerKind::Additional).phase(next)
}

fn end() -> StatePatch {
    StatePatch::new(HandlerKind::End)
        .phase(Phase::End)
        .reply(prompts::END_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedLlm;

    fn handlers(llm: Arc<ScriptedLlm>) -> PhaseHandlers {
        PhaseHandlers::new(llm, 3)
    }

    fn with_user(mut state: ConversationState, text: &str) -> ConversationState {
        state.messages.push(ChatMessage::user(text));
        state
    }

    #[tokio::test]
    async fn rapport_moves_to_permission_after_two_exchanges() {
        let llm = Arc::new(ScriptedLlm::fixed("That sounds hard."));
        let h = handlers(llm);
        let mut state = ConversationState::default();
        state.messages.push(ChatMessage::assistant("Hello"));
        let state = with_user(state, "hi");
        let patch = h.run(&state).await.unwrap();
        assert_eq!(patch.phase, Some(Phase::Rapport));

        let mut longer = state.clone();
        longer.messages.push(ChatMessage::assistant("How are you?"));
        let longer = with_user(longer, "tired");
        let patch = h.run(&longer).await.unwrap();
        assert_eq!(patch.phase, Some(Phase::Permission));
    }

    #[tokio::test]
    async fn rapport_guard_ends_finished_screening() {
        let llm = Arc::new(ScriptedLlm::fixed("unused"));
        let h = handlers(llm.clone());
        let mut state = with_user(ConversationState::default(), "hello again");
        state.phq9_responses.insert(0, OrdinalScore::new(1).unwrap());
        let patch = h.run(&state).await.unwrap();
        assert_eq!(patch.phase, Some(Phase::End));
        assert_eq!(patch.replies().next(), Some(prompts::ALREADY_SCREENED));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn permission_asks_before_classifying() {
        let llm = Arc::new(ScriptedLlm::fixed("Would you be open to a short screening?"));
        let h = handlers(llm.clone());
        let state = ConversationState {
            phase: Phase::Permission,
            ..with_user(ConversationState::default(), "yes")
        };
        let patch = h.run(&state).await.unwrap();
        assert_eq!(patch.phase, Some(Phase::Permission));
        assert_eq!(patch.permission_asked, Some(true));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn consent_is_judged_against_question_asked() {
        let llm = Arc::new(ScriptedLlm::new(|req| {
            let prompt = req.system_prompt().unwrap_or_default();
            if prompt.contains("short screening now?") && prompt.contains("sure, go ahead") {
                Ok(r#"{"start": true}"#.into())
            } else {
                Ok(r#"{"start": false}"#.into())
            }
        }));
        let h = handlers(llm);
        let mut state = ConversationState {
            phase: Phase::Permission,
            permission_asked: true,
            ..Default::default()
        };
        state.messages.push(ChatMessage::assistant("Shall we do a short screening now?"));
        let state = with_user(state, "sure, go ahead");
        let patch = h.run(&state).await.unwrap();
        assert_eq!(patch.phase, Some(Phase::Questionnaire));
        assert!(patch.replies().next().unwrap().ends_with(PHQ9_QUESTIONS[0]));
    }

    #[tokio::test]
    async fn unparseable_consent_stays_in_permission() {
        let llm = Arc::new(ScriptedLlm::new(|req| {
            if req.system_prompt().unwrap_or_default().contains("genuinely agreeing") {
                Ok("maybe?".into())
            } else {
                Ok("No rush. Let me know when you're ready.".into())
            }
        }));
        let h = handlers(llm);
        let mut state = ConversationState {
            phase: Phase::Permission,
            permission_asked: true,
            ..Default::default()
        };
        state.messages.push(ChatMessage::assistant("Can we start?"));
        let state = with_user(state, "ok");
        let patch = h.run(&state).await.unwrap();
        assert_eq!(patch.phase, Some(Phase::Permission));
    }

    #[tokio::test]
    async fn parse_failure_gets_fixed_clarification() {
        let llm = Arc::new(ScriptedLlm::fixed("I'd rather not say"));
        let h = handlers(llm);
        let state = ConversationState {
            phase: Phase::Questionnaire,
            ..with_user(ConversationState::default(), "eh")
        };
        let patch = h.run(&state).await.unwrap();
        assert_eq!(patch.replies().next(), Some(prompts::PARSE_FAILURE_REPLY));
        assert_eq!(patch.current_question_index, None);
        assert_eq!(patch.clarification_attempts, Some(1));
    }

    #[tokio::test]
    async fn exhausted_clarifications_switch_to_picker() {
        let llm = Arc::new(ScriptedLlm::new(|req| {
            if req.system_prompt().unwrap_or_default().contains("Task:") {
                Ok(r#"{"is_relevant": true, "is_ambiguous": true, "score": null}"#.into())
            } else {
                Ok("Could you say more?".into())
            }
        }));
        let h = handlers(llm.clone());
        let state = ConversationState {
            phase: Phase::Questionnaire,
            clarification_attempts: 3,
            ..with_user(ConversationState::default(), "dunno")
        };
        let patch = h.run(&state).await.unwrap();
        assert!(patch.replies().next().unwrap().contains("0 - Not at all"));
        assert_eq!(patch.clarification_attempts, Some(4));

        // Picker mode: deterministic only, no model calls.
        let calls_before = llm.call_count();
        let picked = ConversationState {
            phase: Phase::Questionnaire,
            clarification_attempts: 4,
            ..with_user(ConversationState::default(), "2")
        };
        let patch = h.run(&picked).await.unwrap();
        assert_eq!(patch.record_score, Some((0, OrdinalScore::new(2).unwrap())));
        assert_eq!(patch.current_question_index, Some(1));
        assert_eq!(patch.clarification_attempts, Some(0));
        assert_eq!(llm.call_count(), calls_before);
    }

    #[tokio::test]
    async fn last_answer_moves_to_financial_question() {
        let llm = Arc::new(ScriptedLlm::fixed(
            r#"{"is_relevant": true, "is_ambiguous": false, "score": 1}"#,
        ));
        let h = handlers(llm);
        let mut state = ConversationState {
            phase: Phase::Questionnaire,
            current_question_index: 8,
            ..with_user(ConversationState::default(), "several days")
        };
        for i in 0..8 {
            state.phq9_responses.insert(i, OrdinalScore::new(0).unwrap());
        }
        let patch = h.run(&state).await.unwrap();
        assert_eq!(patch.phase, Some(Phase::AdditionalFinancial));
        let reply = patch.replies().next().unwrap();
        assert!(reply.starts_with(prompts::QUESTIONNAIRE_DONE));
        assert!(reply.ends_with(prompts::FINANCIAL_QUESTION));
        assert_eq!(
            patch.effects,
            vec![SharedEffect::Symptom {
                symptom: Symptom::SuicidalIdeation,
                score: OrdinalScore::new(1).unwrap()
            }]
        );
    }

    #[test]
    fn additional_collects_both_answers() {
        let state = ConversationState {
            phase: Phase::AdditionalFinancial,
            ..with_user(ConversationState::default(), "Yes, rent is a struggle")
        };
        let patch = additional(&state);
        assert_eq!(patch.phase, Some(Phase::AdditionalStudy));
        assert_eq!(patch.replies().next(), Some(prompts::STUDY_QUESTION));
        assert_eq!(
            patch.effects,
            vec![SharedEffect::ExternalFactor {
                factor: ExternalFactor::FinancialPressure,
                level: OrdinalScore::new(2).unwrap()
            }]
        );

        let state = ConversationState {
            phase: Phase::AdditionalStudy,
            financial_distress: Some("Yes".into()),
            ..with_user(ConversationState::default(), "no, not really")
        };
        let patch = additional(&state);
        assert_eq!(patch.phase, Some(Phase::Advice));
        assert_eq!(patch.replies().count(), 0);
        assert_eq!(patch.study_pressure.as_deref(), Some("no, not really"));
        assert_eq!(
            patch.effects,
            vec![SharedEffect::ExternalFactor {
                factor: ExternalFactor::StudyPressure,
                level: OrdinalScore::new(0).unwrap()
            }]
        );
    }

    #[tokio::test]
    async fn advice_ends_on_farewell() {
        let llm = Arc::new(ScriptedLlm::fixed("unused"));
        let h = handlers(llm.clone());
        let state = ConversationState {
            phase: Phase::Advice,
            ..with_user(ConversationState::default(), "Thank you, bye")
        };
        let patch = h.run(&state).await.unwrap();
        assert_eq!(patch.phase, Some(Phase::End));
        assert_eq!(patch.replies().next(), Some(prompts::FAREWELL_REPLY));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn chained_advice_ignores_closing_words() {
        let llm = Arc::new(ScriptedLlm::fixed("Let's talk about what might help."));
        let h = handlers(llm.clone());
        let state = ConversationState {
            phase: Phase::Advice,
            study_pressure: Some("No, I'm okay".into()),
            ..with_user(ConversationState::default(), "No, I'm okay")
        };
        let patch = h.advise(&state).await.unwrap();
        assert_eq!(patch.phase, Some(Phase::Advice));
        assert_eq!(patch.replies().next(), Some("Let's talk about what might help."));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn end_is_absorbing() {
        let llm = Arc::new(ScriptedLlm::fixed("unused"));
        let h = handlers(llm);
        let state = ConversationState {
            phase: Phase::End,
            ..with_user(ConversationState::default(), "restart please")
        };
        let patch = h.run(&state).await.unwrap();
        assert_eq!(patch.phase, Some(Phase::End));
        assert_eq!(patch.replies().next(), Some(prompts::END_MESSAGE));
        assert!(patch.record_score.is_none());
        assert!(patch.current_question_index.is_none());
    }
}
