//! Shared dashboard document: one flat JSON file written by the dialogue
//! process and the background analyzer, polled by the dashboard.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// A severity rating on the 0–3 scale shared by questionnaire items and
/// external factors.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "u8")]
pub struct OrdinalScore(u8);

impl OrdinalScore {
    pub const MAX: u8 = 3;

    pub fn new(value: u8) -> Result<Self, StateError> {
        Self::try_from(value as i64)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for OrdinalScore {
    type Error = StateError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(StateError::ScoreOutOfRange(value))
        }
    }
}

impl From<OrdinalScore> for u8 {
    fn from(score: OrdinalScore) -> Self {
        score.0
    }
}

impl std::fmt::Display for OrdinalScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The nine PHQ-9 symptom domains, in questionnaire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Symptom {
    #[serde(rename = "Interest/Pleasure")]
    InterestPleasure,
    #[serde(rename = "Feeling Down")]
    FeelingDown,
    #[serde(rename = "Sleep Issues")]
    SleepIssues,
    #[serde(rename = "Fatigue")]
    Fatigue,
    #[serde(rename = "Appetite")]
    Appetite,
    #[serde(rename = "Self-Worth")]
    SelfWorth,
    #[serde(rename = "Concentration")]
    Concentration,
    #[serde(rename = "Psychomotor")]
    Psychomotor,
    #[serde(rename = "Suicidal Ideation")]
    SuicidalIdeation,
}

impl Symptom {
    pub const ALL: [Symptom; 9] = [
        Self::InterestPleasure,
        Self::FeelingDown,
        Self::SleepIssues,
        Self::Fatigue,
        Self::Appetite,
        Self::SelfWorth,
        Self::Concentration,
        Self::Psychomotor,
        Self::SuicidalIdeation,
    ];

    /// Symptom measured by questionnaire item `index` (0-based).
    pub fn for_question(index: usize) -> Option<Symptom> {
        Self::ALL.get(index).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::InterestPleasure => "Interest/Pleasure",
            Self::FeelingDown => "Feeling Down",
            Self::SleepIssues => "Sleep Issues",
            Self::Fatigue => "Fatigue",
            Self::Appetite => "Appetite",
            Self::SelfWorth => "Self-Worth",
            Self::Concentration => "Concentration",
            Self::Psychomotor => "Psychomotor",
            Self::SuicidalIdeation => "Suicidal Ideation",
        }
    }
}

/// Contextual stressors tracked next to the symptom profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExternalFactor {
    #[serde(rename = "Sleep Quality")]
    SleepQuality,
    #[serde(rename = "Study Pressure")]
    StudyPressure,
    #[serde(rename = "Financial Pressure")]
    FinancialPressure,
}

impl ExternalFactor {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SleepQuality => "Sleep Quality",
            Self::StudyPressure => "Study Pressure",
            Self::FinancialPressure => "Financial Pressure",
        }
    }
}

/// Display name for an external-factor level.
pub fn factor_level_name(level: OrdinalScore) -> &'static str {
    match level.value() {
        0 => "Good",
        1 => "Average",
        2 => "Bad",
        _ => "Worst",
    }
}

/// Patient identity shown in the dashboard header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
}

/// One live risk alert raised by the background analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Latest suicide-risk classification plus the alert log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuicideRisk {
    pub label: String,
    pub score: u8,
    #[serde(default)]
    pub alerts: Vec<RiskAlert>,
}

impl Default for SuicideRisk {
    fn default() -> Self {
        Self {
            label: "Supportive".to_string(),
            score: 0,
            alerts: Vec::new(),
        }
    }
}

/// The shared document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    #[serde(default)]
    pub patient: Option<PatientInfo>,
    #[serde(default)]
    pub symptoms: BTreeMap<Symptom, OrdinalScore>,
    #[serde(default)]
    pub external_factors: BTreeMap<ExternalFactor, OrdinalScore>,
    #[serde(default)]
    pub top_emotions: BTreeMap<String, u64>,
    #[serde(default)]
    pub suicide_risk: SuicideRisk,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u64,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            patient: None,
            symptoms: BTreeMap::new(),
            external_factors: BTreeMap::new(),
            top_emotions: BTreeMap::new(),
            suicide_risk: SuicideRisk::default(),
            last_updated: Utc::now(),
            message_count: 0,
        }
    }
}

impl SharedState {
    /// Sum of the recorded symptom scores.
    pub fn phq9_total(&self) -> u32 {
        self.symptoms.values().map(|s| s.value() as u32).sum()
    }
}
