//! Screening state machine: phases, per-session conversation state, and the
//! patch reducer that enforces single-writer field ownership.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dashboard::model::{ExternalFactor, OrdinalScore, Symptom};
use crate::error::StateError;
use crate::llm::ChatMessage;
use crate::screening::prompts::PHQ9_QUESTIONS;

/// The phases of the screening interview.
///
/// Progresses: Rapport → Permission → Questionnaire → AdditionalFinancial →
/// AdditionalStudy → Advice → End. Most phases may also loop on themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Rapport,
    Permission,
    Questionnaire,
    #[serde(alias = "completed_phq9", alias = "additional")]
    AdditionalFinancial,
    AdditionalStudy,
    Advice,
    #[serde(alias = "end_node")]
    End,
}

impl Phase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Phase) -> bool {
        use Phase::*;
        if *self == target {
            return true;
        }
        matches!(
            (self, target),
            (Rapport, Permission)
                | (Rapport, End)
                | (Permission, Questionnaire)
                | (Questionnaire, AdditionalFinancial)
                | (AdditionalFinancial, AdditionalStudy)
                | (AdditionalStudy, Advice)
                | (Advice, End)
        )
    }

    /// Whether this phase is absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// The handler family that serves this phase.
    pub fn handler(&self) -> HandlerKind {
        match self {
            Self::Rapport => HandlerKind::Rapport,
            Self::Permission => HandlerKind::Permission,
            Self::Questionnaire => HandlerKind::Questionnaire,
            Self::AdditionalFinancial | Self::AdditionalStudy => HandlerKind::Additional,
            Self::Advice => HandlerKind::Advice,
            Self::End => HandlerKind::End,
        }
    }
}

impl Default for Phase {
    fn default() -> Self {
        Self::Rapport
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Rapport => "rapport",
            Self::Permission => "permission",
            Self::Questionnaire => "questionnaire",
            Self::AdditionalFinancial => "additional_financial",
            Self::AdditionalStudy => "additional_study",
            Self::Advice => "advice",
            Self::End => "end",
        };
        write!(f, "{s}")
    }
}

/// Who produced a patch. Each conversation field has exactly one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Rapport,
    Permission,
    Questionnaire,
    Additional,
    Advice,
    End,
    Compactor,
    /// Session bootstrap (`ScreeningSession::start`).
    Session,
}

impl HandlerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rapport => "rapport",
            Self::Permission => "permission",
            Self::Questionnaire => "questionnaire",
            Self::Additional => "additional",
            Self::Advice => "advice",
            Self::End => "end",
            Self::Compactor => "compactor",
            Self::Session => "session",
        }
    }
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-session conversation state. Owned by the active session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub phase: Phase,
    /// Question index (0-based) → score.
    pub phq9_responses: BTreeMap<usize, OrdinalScore>,
    pub current_question_index: usize,
    /// Clarifications issued for the current question.
    pub clarification_attempts: u32,
    /// Rolling summary, empty until the first compaction.
    pub summary: String,
    pub patient_info: Option<String>,
    pub financial_distress: Option<String>,
    pub study_pressure: Option<String>,
    pub permission_asked: bool,
}

impl ConversationState {
    /// Sum of the recorded questionnaire scores.
    pub fn phq9_total(&self) -> u32 {
        self.phq9_responses.values().map(|s| s.value() as u32).sum()
    }

    /// Whether every questionnaire item has a score.
    pub fn questionnaire_complete(&self) -> bool {
        self.phq9_responses.len() >= PHQ9_QUESTIONS.len()
    }

    /// The most recent message, if it came from the user.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == crate::llm::Role::User)
            .map(|m| m.content.as_str())
    }

    /// The most recent assistant message.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::llm::Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Merge a handler patch into the state.
    ///
    /// The whole patch is validated before any field changes, so a rejected
    /// patch leaves the state untouched.
    pub fn apply(&mut self, patch: StatePatch) -> Result<(), StateError> {
        self.validate(&patch)?;

        let StatePatch {
            writer: _,
            phase,
            append,
            remove_ids,
            prepend,
            record_score,
            current_question_index,
            clarification_attempts,
            summary,
            patient_info,
            financial_distress,
            study_pressure,
            permission_asked,
            effects: _,
        } = patch;

        if !remove_ids.is_empty() {
            self.messages.retain(|m| !remove_ids.contains(&m.id));
        }
        if !prepend.is_empty() {
            let mut messages = prepend;
            messages.append(&mut self.messages);
            self.messages = messages;
        }
        self.messages.extend(append);

        if let Some((index, score)) = record_score {
            self.phq9_responses.insert(index, score);
        }
        if let Some(index) = current_question_index {
            self.current_question_index = index;
        }
        if let Some(attempts) = clarification_attempts {
            self.clarification_attempts = attempts;
        }
        if let Some(summary) = summary {
            self.summary = summary;
        }
        if patient_info.is_some() {
            self.patient_info = patient_info;
        }
        if financial_distress.is_some() {
            self.financial_distress = financial_distress;
        }
        if study_pressure.is_some() {
            self.study_pressure = study_pressure;
        }
        if let Some(asked) = permission_asked {
            self.permission_asked = asked;
        }
        if let Some(phase) = phase {
            self.phase = phase;
        }
        Ok(())
    }

    fn validate(&self, patch: &StatePatch) -> Result<(), StateError> {
        let writer = patch.writer;
        let owns = |owner: HandlerKind, field: &'static str, touched: bool| {
            if touched && writer != owner {
                Err(StateError::OwnershipViolation {
                    writer: writer.name(),
                    field,
                })
            } else {
                Ok(())
            }
        };

        owns(HandlerKind::Questionnaire, "phq9_responses", patch.record_score.is_some())?;
        owns(
            HandlerKind::Questionnaire,
            "current_question_index",
            patch.current_question_index.is_some(),
        )?;
        owns(
            HandlerKind::Questionnaire,
            "clarification_attempts",
            patch.clarification_attempts.is_some(),
        )?;
        owns(HandlerKind::Compactor, "summary", patch.summary.is_some())?;
        owns(HandlerKind::Compactor, "messages", !patch.remove_ids.is_empty())?;
        owns(HandlerKind::Compactor, "messages", !patch.prepend.is_empty())?;
        owns(HandlerKind::Session, "patient_info", patch.patient_info.is_some())?;
        owns(
            HandlerKind::Additional,
            "financial_distress",
            patch.financial_distress.is_some(),
        )?;
        owns(HandlerKind::Additional, "study_pressure", patch.study_pressure.is_some())?;
        owns(HandlerKind::Permission, "permission_asked", patch.permission_asked.is_some())?;

        if patch.patient_info.is_some() && self.patient_info.is_some() {
            return Err(StateError::AlreadySet("patient_info"));
        }
        if patch.financial_distress.is_some() && self.financial_distress.is_some() {
            return Err(StateError::AlreadySet("financial_distress"));
        }
        if patch.study_pressure.is_some() && self.study_pressure.is_some() {
            return Err(StateError::AlreadySet("study_pressure"));
        }
        if patch.permission_asked == Some(false) && self.permission_asked {
            return Err(StateError::AlreadySet("permission_asked"));
        }

        if let Some((index, _)) = patch.record_score {
            if index >= PHQ9_QUESTIONS.len() {
                return Err(StateError::QuestionOutOfRange(index));
            }
            if self.phq9_responses.contains_key(&index) {
                return Err(StateError::DuplicateResponse(index));
            }
        }
        if let Some(to) = patch.current_question_index {
            if to > PHQ9_QUESTIONS.len() {
                return Err(StateError::QuestionOutOfRange(to));
            }
            if to < self.current_question_index {
                return Err(StateError::IndexRegression {
                    from: self.current_question_index,
                    to,
                });
            }
        }

        if let Some(to) = patch.phase {
            // Session bootstrap may reset the phase; everyone else follows
            // the transition table.
            if writer != HandlerKind::Session && !self.phase.can_transition_to(to) {
                return Err(StateError::InvalidTransition {
                    from: self.phase,
                    to,
                });
            }
        }
        Ok(())
    }
}

/// A write into the shared dashboard document requested by a handler.
///
/// Handlers stay pure; the caller applies these after the patch is merged.
#[derive(Debug, Clone, PartialEq)]
pub enum SharedEffect {
    Symptom {
        symptom: Symptom,
        score: OrdinalScore,
    },
    ExternalFactor {
        factor: ExternalFactor,
        level: OrdinalScore,
    },
}

/// Partial update produced by one handler invocation.
#[derive(Debug, Clone)]
pub struct StatePatch {
    pub writer: HandlerKind,
    pub phase: Option<Phase>,
    /// Messages appended to the history.
    pub append: Vec<ChatMessage>,
    /// Messages removed from the history (compaction only).
    pub remove_ids: Vec<Uuid>,
    /// Messages inserted at the head of the history (compaction only).
    pub prepend: Vec<ChatMessage>,
    pub record_score: Option<(usize, OrdinalScore)>,
    pub current_question_index: Option<usize>,
    pub clarification_attempts: Option<u32>,
    pub summary: Option<String>,
    pub patient_info: Option<String>,
    pub financial_distress: Option<String>,
    pub study_pressure: Option<String>,
    pub permission_asked: Option<bool>,
    pub effects: Vec<SharedEffect>,
}

impl StatePatch {
    pub fn new(writer: HandlerKind) -> Self {
        Self {
            writer,
            phase: None,
            append: Vec::new(),
            remove_ids: Vec::new(),
            prepend: Vec::new(),
            record_score: None,
            current_question_index: None,
            clarification_attempts: None,
            summary: None,
            patient_info: None,
            financial_distress: None,
            study_pressure: None,
            permission_asked: None,
            effects: Vec::new(),
        }
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Append an assistant reply.
    pub fn reply(mut self, text: impl Into<String>) -> Self {
        self.append.push(ChatMessage::assistant(text));
        self
    }

    pub fn effect(mut self, effect: SharedEffect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Text of the assistant messages this patch appends.
    pub fn replies(&self) -> impl Iterator<Item = &str> {
        self.append
            .iter()
            .filter(|m| m.role == crate::llm::Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(v: u8) -> OrdinalScore {
        OrdinalScore::new(v).unwrap()
    }

    #[test]
    fn aliases_map_to_additional_family() {
        let completed: Phase = serde_json::from_str("\"completed_phq9\"").unwrap();
        assert_eq!(completed, Phase::AdditionalFinancial);
        let end: Phase = serde_json::from_str("\"end_node\"").unwrap();
        assert_eq!(end, Phase::End);
        assert_eq!(Phase::AdditionalStudy.handler(), HandlerKind::Additional);
        assert_eq!(completed.handler(), HandlerKind::Additional);
    }

    #[test]
    fn display_matches_serde() {
        use Phase::*;
        for phase in [
            Rapport,
            Permission,
            Questionnaire,
            AdditionalFinancial,
            AdditionalStudy,
            Advice,
            End,
        ] {
            let serde = serde_json::to_string(&phase).unwrap();
            assert_eq!(serde.trim_matches('"'), phase.to_string());
        }
    }

    #[test]
    fn transitions_follow_interview_order() {
        use Phase::*;
        assert!(Rapport.can_transition_to(Permission));
        assert!(Permission.can_transition_to(Questionnaire));
        assert!(Questionnaire.can_transition_to(AdditionalFinancial));
        assert!(AdditionalStudy.can_transition_to(Advice));
        assert!(Advice.can_transition_to(End));
        assert!(End.can_transition_to(End));
        // Skips and backward moves
        assert!(!Rapport.can_transition_to(Questionnaire));
        assert!(!Questionnaire.can_transition_to(Rapport));
        assert!(!End.can_transition_to(Rapport));
        assert!(End.is_terminal());
        assert!(!Advice.is_terminal());
    }

    #[test]
    fn questionnaire_owns_scores() {
        let mut state = ConversationState {
            phase: Phase::Questionnaire,
            ..Default::default()
        };
        let mut patch = StatePatch::new(HandlerKind::Questionnaire);
        patch.record_score = Some((0, score(2)));
        patch.current_question_index = Some(1);
        state.apply(patch).unwrap();
        assert_eq!(state.phq9_responses[&0], score(2));
        assert_eq!(state.current_question_index, 1);

        let mut foreign = StatePatch::new(HandlerKind::Advice);
        foreign.record_score = Some((1, score(1)));
        let err = state.apply(foreign).unwrap_err();
        assert!(matches!(
            err,
            StateError::OwnershipViolation {
                writer: "advice",
                field: "phq9_responses"
            }
        ));
        assert_eq!(state.phq9_responses.len(), 1);
    }

    #[test]
    fn rejected_patch_leaves_state_untouched() {
        let mut state = ConversationState::default();
        let before = state.clone();
        let mut patch = StatePatch::new(HandlerKind::Rapport).reply("hello");
        patch.summary = Some("not mine".into());
        assert!(state.apply(patch).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn index_never_moves_back_and_scores_are_unique() {
        let mut state = ConversationState {
            phase: Phase::Questionnaire,
            current_question_index: 3,
            ..Default::default()
        };
        state.phq9_responses.insert(2, score(1));

        let mut back = StatePatch::new(HandlerKind::Questionnaire);
        back.current_question_index = Some(2);
        assert!(matches!(
            state.apply(back),
            Err(StateError::IndexRegression { from: 3, to: 2 })
        ));

        let mut dup = StatePatch::new(HandlerKind::Questionnaire);
        dup.record_score = Some((2, score(3)));
        assert!(matches!(state.apply(dup), Err(StateError::DuplicateResponse(2))));

        let mut past_end = StatePatch::new(HandlerKind::Questionnaire);
        past_end.record_score = Some((9, score(0)));
        assert!(matches!(
            state.apply(past_end),
            Err(StateError::QuestionOutOfRange(9))
        ));
    }

    #[test]
    fn set_once_fields_reject_second_write() {
        let mut state = ConversationState {
            phase: Phase::AdditionalFinancial,
            ..Default::default()
        };
        let mut first = StatePatch::new(HandlerKind::Additional).phase(Phase::AdditionalStudy);
        first.financial_distress = Some("yes".into());
        state.apply(first).unwrap();

        let mut second = StatePatch::new(HandlerKind::Additional);
        second.financial_distress = Some("no".into());
        assert!(matches!(
            state.apply(second),
            Err(StateError::AlreadySet("financial_distress"))
        ));
        assert_eq!(state.financial_distress.as_deref(), Some("yes"));
    }

    #[test]
    fn compactor_replaces_window_with_summary() {
        let old = vec![ChatMessage::user("a"), ChatMessage::assistant("b")];
        let kept = vec![ChatMessage::user("c"), ChatMessage::assistant("d")];
        let mut state = ConversationState {
            messages: old.iter().chain(kept.iter()).cloned().collect(),
            ..Default::default()
        };

        let mut patch = StatePatch::new(HandlerKind::Compactor);
        patch.remove_ids = old.iter().map(|m| m.id).collect();
        patch.prepend = vec![ChatMessage::system("Summary of previous conversation: x")];
        patch.summary = Some("x".into());
        state.apply(patch).unwrap();

        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[0].role, crate::llm::Role::System);
        assert_eq!(&state.messages[1..], &kept[..]);
        assert_eq!(state.summary, "x");
    }

    #[test]
    fn invalid_phase_jump_is_rejected() {
        let mut state = ConversationState::default();
        let patch = StatePatch::new(HandlerKind::Rapport).phase(Phase::Advice);
        assert!(matches!(
            state.apply(patch),
            Err(StateError::InvalidTransition {
                from: Phase::Rapport,
                to: Phase::Advice
            })
        ));
    }
}
