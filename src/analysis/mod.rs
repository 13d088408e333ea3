//! Background utterance analysis: emotion tagging and suicide-risk
//! screening, published to the shared dashboard document.

pub mod analyzer;
pub mod classifier;

pub use analyzer::BackgroundAnalyzer;
pub use classifier::{
    EmotionClassifier, LexiconClassifier, NeutralClassifier, RiskLevel, SuicideRiskClassifier,
};
