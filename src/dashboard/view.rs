//! Clinician-facing summary derived from a shared-state snapshot.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dashboard::model::{
    PatientInfo, RiskAlert, SharedState, Symptom, factor_level_name,
};

const TOP_EMOTIONS: usize = 3;
const RECENT_ALERTS: usize = 3;

/// Overall risk tier from the PHQ-9 total and the suicidal-ideation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskTier {
    Mild,
    Moderate,
    #[serde(rename = "Moderate-High")]
    ModerateHigh,
    High,
}

impl RiskTier {
    pub fn assess(total: u32, suicidal_item: u8) -> Self {
        if suicidal_item >= 2 || total >= 20 {
            Self::High
        } else if total >= 15 {
            Self::ModerateHigh
        } else if total >= 10 {
            Self::Moderate
        } else {
            Self::Mild
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Mild => "Mild",
            Self::Moderate => "Moderate",
            Self::ModerateHigh => "Moderate-High",
            Self::High => "High",
        }
    }

    /// Recommended clinical action.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Mild => "Supportive intervention",
            Self::Moderate => "Monitor and schedule follow-up",
            Self::ModerateHigh => "Clinical follow-up recommended within 1 week",
            Self::High => "Immediate clinical attention required",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Critical,
    Clinical,
    Contextual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

/// A symptom combination worth flagging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternAlert {
    pub kind: PatternKind,
    pub priority: Priority,
    pub message: &'static str,
}

/// Spread of the recorded symptom scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymptomSpread {
    pub variance: f64,
    pub std_dev: f64,
    pub interpretation: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct FactorReading {
    pub factor: &'static str,
    pub level: u8,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub patient: Option<PatientInfo>,
    pub phq9_total: u32,
    pub answered: usize,
    pub risk_tier: RiskTier,
    pub recommended_action: &'static str,
    pub suicide_risk_label: String,
    pub top_emotions: Vec<(String, u64)>,
    pub recent_alerts: Vec<RiskAlert>,
    pub patterns: Vec<PatternAlert>,
    pub external_factors: Vec<FactorReading>,
    pub spread: Option<SymptomSpread>,
    pub message_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl DashboardView {
    pub fn from_state(state: &SharedState) -> Self {
        let total = state.phq9_total();
        let suicidal = symptom(state, Symptom::SuicidalIdeation);
        let tier = RiskTier::assess(total, suicidal);

        let mut top_emotions: Vec<(String, u64)> = state
            .top_emotions
            .iter()
            .map(|(label, count)| (label.clone(), *count))
            .collect();
        top_emotions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_emotions.truncate(TOP_EMOTIONS);

        let alerts = &state.suicide_risk.alerts;
        let recent_alerts = alerts[alerts.len().saturating_sub(RECENT_ALERTS)..].to_vec();

        let external_factors = state
            .external_factors
            .iter()
            .map(|(factor, level)| FactorReading {
                factor: factor.label(),
                level: level.value(),
                label: factor_level_name(*level),
            })
            .collect();

        Self {
            patient: state.patient.clone(),
            phq9_total: total,
            answered: state.symptoms.len(),
            risk_tier: tier,
            recommended_action: tier.action(),
            suicide_risk_label: state.suicide_risk.label.clone(),
            top_emotions,
            recent_alerts,
            patterns: detect_patterns(state),
            external_factors,
            spread: symptom_spread(state),
            message_count: state.message_count,
            last_updated: state.last_updated,
        }
    }

    /// Plain-text rendering for the terminal poller.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== PHQ-9 Clinical Dashboard ===");
        match &self.patient {
            Some(p) => {
                let _ = writeln!(out, "Patient {} | {} | {} | {}", p.id, p.name, p.age, p.gender);
            }
            None => {
                let _ = writeln!(out, "Patient: (not registered)");
            }
        }
        let _ = writeln!(
            out,
            "PHQ-9: {}/27 ({} of 9 answered) | Risk: {} - {}",
            self.phq9_total,
            self.answered,
            self.risk_tier.label(),
            self.recommended_action
        );
        let _ = writeln!(out, "Suicide risk: {}", self.suicide_risk_label);

        if !self.top_emotions.is_empty() {
            let emotions: Vec<String> = self
                .top_emotions
                .iter()
                .map(|(label, count)| format!("{label} ({count})"))
                .collect();
            let _ = writeln!(out, "Top emotions: {}", emotions.join(", "));
        }
        for f in &self.external_factors {
            let _ = writeln!(out, "{}: {}", f.factor, f.label);
        }
        if let Some(spread) = &self.spread {
            let _ = writeln!(
                out,
                "Symptom variance {:.2} (sd {:.2}): {}",
                spread.variance, spread.std_dev, spread.interpretation
            );
        }
        for p in &self.patterns {
            let _ = writeln!(out, "[{:?}] {}", p.kind, p.message);
        }
        if !self.recent_alerts.is_empty() {
            let _ = writeln!(out, "LIVE WARNINGS:");
            for alert in &self.recent_alerts {
                let _ = writeln!(out, "  {} {}", alert.timestamp.format("%H:%M:%S"), alert.message);
            }
        }
        let _ = write!(
            out,
            "Messages analysed: {} | Updated {}",
            self.message_count,
            self.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
        );
        out
    }
}

fn symptom(state: &SharedState, symptom: Symptom) -> u8 {
    state.symptoms.get(&symptom).map(|s| s.value()).unwrap_or(0)
}

/// Symptom combinations flagged for the clinician.
pub fn detect_patterns(state: &SharedState) -> Vec<PatternAlert> {
    let mut patterns = Vec::new();
    let s = |sym| symptom(state, sym);

    if s(Symptom::SuicidalIdeation) >= 2 && state.phq9_total() < 15 {
        patterns.push(PatternAlert {
            kind: PatternKind::Critical,
            priority: Priority::High,
            message: "Elevated suicidal ideation despite moderate overall score",
        });
    }
    if s(Symptom::SleepIssues) >= 2 && s(Symptom::Fatigue) >= 2 {
        patterns.push(PatternAlert {
            kind: PatternKind::Clinical,
            priority: Priority::Medium,
            message: "Sleep-Fatigue cluster detected - consider sleep hygiene intervention",
        });
    }
    if s(Symptom::Concentration) >= 2 && s(Symptom::SelfWorth) >= 2 {
        patterns.push(PatternAlert {
            kind: PatternKind::Clinical,
            priority: Priority::Medium,
            message: "Cognitive-emotional pattern - may benefit from CBT",
        });
    }
    let external: u32 = state.external_factors.values().map(|l| l.value() as u32).sum();
    if external >= 5 {
        patterns.push(PatternAlert {
            kind: PatternKind::Contextual,
            priority: Priority::Medium,
            message: "High external stressors - consider resource referrals",
        });
    }
    patterns
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Population variance of the recorded symptom scores. `None` before the
/// first answer.
pub fn symptom_spread(state: &SharedState) -> Option<SymptomSpread> {
    if state.symptoms.is_empty() {
        return None;
    }
    let values: Vec<f64> = state.symptoms.values().map(|s| s.value() as f64).collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    Some(SymptomSpread {
        variance: round2(variance),
        std_dev: round2(std_dev),
        interpretation: if std_dev > 0.9 {
            "High variability - uneven symptom profile"
        } else {
            "Relatively consistent symptom severity"
        },
    })
}
