//! Emotion and suicide-risk classifiers.
//!
//! The analyzer only depends on the two traits. `NeutralClassifier` stands
//! in when analysis is disabled; `LexiconClassifier` is a regex rules engine
//! over the GoEmotions label set and the C-SSRS risk scale.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClassifierError;

/// GoEmotions label set.
pub const EMOTION_LABELS: [&str; 28] = [
    "admiration",
    "amusement",
    "anger",
    "annoyance",
    "approval",
    "caring",
    "confusion",
    "curiosity",
    "desire",
    "disappointment",
    "disapproval",
    "disgust",
    "embarrassment",
    "excitement",
    "fear",
    "gratitude",
    "grief",
    "joy",
    "love",
    "nervousness",
    "optimism",
    "pride",
    "realization",
    "relief",
    "remorse",
    "sadness",
    "surprise",
    "neutral",
];

pub const NEUTRAL: &str = "neutral";

/// Texts shorter than this are never scored for risk.
const MIN_RISK_TEXT_LEN: usize = 10;

/// C-SSRS severity scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Supportive = 0,
    Indicator = 1,
    Ideation = 2,
    Behavior = 3,
    Attempt = 4,
}

impl RiskLevel {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Supportive => "Supportive",
            Self::Indicator => "Indicator",
            Self::Ideation => "Ideation",
            Self::Behavior => "Behavior",
            Self::Attempt => "Attempt",
        }
    }

    /// Behavior and above raise a live alert.
    pub fn is_alert(self) -> bool {
        self >= Self::Behavior
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Dominant emotion label for `text`.
    async fn classify(&self, text: &str) -> Result<String, ClassifierError>;
}

#[async_trait]
pub trait SuicideRiskClassifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> Result<RiskLevel, ClassifierError>;
}

/// Always neutral, never at risk.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralClassifier;

#[async_trait]
impl EmotionClassifier for NeutralClassifier {
    fn name(&self) -> &str {
        "neutral"
    }

    async fn classify(&self, _text: &str) -> Result<String, ClassifierError> {
        Ok(NEUTRAL.to_string())
    }
}

#[async_trait]
impl SuicideRiskClassifier for NeutralClassifier {
    fn name(&self) -> &str {
        "neutral"
    }

    async fn classify(&self, _text: &str) -> Result<RiskLevel, ClassifierError> {
        Ok(RiskLevel::Supportive)
    }
}

/// An emotion keyed by a compiled pattern.
#[derive(Debug, Clone)]
pub struct EmotionRule {
    pub label: &'static str,
    pub regex: Regex,
}

/// A risk level keyed by a compiled pattern.
#[derive(Debug, Clone)]
pub struct RiskRule {
    pub level: RiskLevel,
    pub regex: Regex,
}

/// Regex rules engine for both classifiers.
pub struct LexiconClassifier {
    emotion_rules: Vec<EmotionRule>,
    risk_rules: Vec<RiskRule>,
}

impl LexiconClassifier {
    /// Build with the default lexicon.
    pub fn default_rules() -> Result<Self, ClassifierError> {
        let emotion = |label: &'static str, pattern: &str| -> Result<EmotionRule, ClassifierError> {
            Ok(EmotionRule {
                label,
                regex: compile(pattern)?,
            })
        };
        let risk = |level: RiskLevel, pattern: &str| -> Result<RiskRule, ClassifierError> {
            Ok(RiskRule {
                level,
                regex: compile(pattern)?,
            })
        };

        let emotion_rules = vec![
            emotion("sadness", r"(?i)\b(sad|down|depress\w*|unhappy|miserable|cry(ing)?|cried|low)\b")?,
            emotion("grief", r"(?i)\b(griev\w*|grief|mourn\w*|passed away|lost my)\b")?,
            emotion("fear", r"(?i)\b(scared|afraid|terrified|frighten\w*|fear\w*)\b")?,
            emotion("nervousness", r"(?i)\b(anxious|anxiety|nervous|worried|worry|panic\w*|stress(ed|ful)?)\b")?,
            emotion("anger", r"(?i)\b(angry|furious|mad at|rage|hate)\b")?,
            emotion("annoyance", r"(?i)\b(annoy\w*|irritat\w*|frustrat\w*|fed up)\b")?,
            emotion("disappointment", r"(?i)\b(disappoint\w*|let down|failed|failure)\b")?,
            emotion("remorse", r"(?i)\b(sorry|regret\w*|guilty|my fault)\b")?,
            emotion("embarrassment", r"(?i)\b(embarrass\w*|ashamed|humiliat\w*)\b")?,
            emotion("confusion", r"(?i)\b(confus\w*|don'?t understand|not sure|lost)\b")?,
            emotion("gratitude", r"(?i)\b(thank(s| you)|grateful|appreciate)\b")?,
            emotion("joy", r"(?i)\b(happy|glad|great|good|wonderful|excited)\b")?,
            emotion("optimism", r"(?i)\b(hope(ful)?|better soon|looking forward|optimistic)\b")?,
            emotion("relief", r"(?i)\b(reliev\w*|relief|finally)\b")?,
            emotion("caring", r"(?i)\b(care about|worried about (him|her|them)|look after)\b")?,
            emotion("love", r"(?i)\b(love|adore)\b")?,
        ];

        let risk_rules = vec![
            risk(
                RiskLevel::Attempt,
                r"(?i)\b(i (tried|attempted) to (kill myself|end (it|my life))|overdosed|took (too many|a bunch of) pills)\b",
            )?,
            risk(
                RiskLevel::Behavior,
                r"(?i)\b(wrote (a|my) (suicide )?note|bought (a )?(rope|gun)|stockpil\w* (pills|meds)|giving away my (things|stuff)|planned how to (die|kill myself)|i have a plan to)\b",
            )?,
            risk(
                RiskLevel::Ideation,
                r"(?i)\b(kill myself|end my life|want to die|wish i (was|were) dead|suicid\w*|better off dead|don'?t want to (live|be alive|wake up))\b",
            )?,
            risk(
                RiskLevel::Indicator,
                r"(?i)\b(hopeless|worthless|no point|can'?t go on|give up|empty inside|a burden)\b",
            )?,
        ];

        Ok(Self {
            emotion_rules,
            risk_rules,
        })
    }

    /// Label with the most pattern hits; earlier rules win ties.
    pub fn emotion_of(&self, text: &str) -> &'static str {
        let mut best: Option<(&'static str, usize)> = None;
        for rule in &self.emotion_rules {
            let hits = rule.regex.find_iter(text).count();
            if hits > 0 && best.is_none_or(|(_, n)| hits > n) {
                best = Some((rule.label, hits));
            }
        }
        best.map(|(label, _)| label).unwrap_or(NEUTRAL)
    }

    /// Highest level whose pattern matches.
    pub fn risk_of(&self, text: &str) -> RiskLevel {
        if text.trim().chars().count() < MIN_RISK_TEXT_LEN {
            return RiskLevel::Supportive;
        }
        self.risk_rules
            .iter()
            .filter(|rule| rule.regex.is_match(text))
            .map(|rule| rule.level)
            .max()
            .unwrap_or(RiskLevel::Supportive)
    }
}

fn compile(pattern: &str) -> Result<Regex, ClassifierError> {
    Regex::new(pattern).map_err(|e| ClassifierError::Unavailable {
        name: "lexicon".to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl EmotionClassifier for LexiconClassifier {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn classify(&self, text: &str) -> Result<String, ClassifierError> {
        let label = self.emotion_of(text);
        debug!(label, "Emotion classified");
        Ok(label.to_string())
    }
}

#[async_trait]
impl SuicideRiskClassifier for LexiconClassifier {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn classify(&self, text: &str) -> Result<RiskLevel, ClassifierError> {
        let level = self.risk_of(text);
        debug!(level = %level, "Risk classified");
        Ok(level)
    }
}
