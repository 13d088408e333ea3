//! Fire-and-forget per-utterance analysis.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::analysis::classifier::{EmotionClassifier, RiskLevel, SuicideRiskClassifier};
use crate::dashboard::model::RiskAlert;
use crate::dashboard::store::SharedStateStore;

pub const ALERT_MESSAGE: &str = "Suicidal language detected";

/// Tags each user utterance with an emotion and a risk level and records
/// both in the shared document. Never blocks the reply.
#[derive(Clone)]
pub struct BackgroundAnalyzer {
    emotion: Arc<dyn EmotionClassifier>,
    risk: Arc<dyn SuicideRiskClassifier>,
    store: Arc<SharedStateStore>,
    enabled: bool,
}

impl BackgroundAnalyzer {
    pub fn new(
        emotion: Arc<dyn EmotionClassifier>,
        risk: Arc<dyn SuicideRiskClassifier>,
        store: Arc<SharedStateStore>,
        enabled: bool,
    ) -> Self {
        Self {
            emotion,
            risk,
            store,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Spawn a detached analysis task. `None` when analysis is disabled.
    pub fn spawn(&self, utterance: &str) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }
        let this = self.clone();
        let text = utterance.to_string();
        Some(tokio::spawn(async move {
            this.analyze(&text).await;
        }))
    }

    /// Classify and record. Every failure is logged and dropped.
    pub async fn analyze(&self, text: &str) {
        let emotion = match self.emotion.classify(text).await {
            Ok(label) => label,
            Err(e) => {
                tracing::warn!(classifier = self.emotion.name(), error = %e, "Emotion classification failed, using neutral");
                crate::analysis::classifier::NEUTRAL.to_string()
            }
        };
        let level = match self.risk.classify(text).await {
            Ok(level) => level,
            Err(e) => {
                tracing::warn!(classifier = self.risk.name(), error = %e, "Risk classification failed, assuming no risk");
                RiskLevel::Supportive
            }
        };

        let alert = level.is_alert().then(|| RiskAlert {
            message: ALERT_MESSAGE.to_string(),
            timestamp: Utc::now(),
            details: serde_json::json!({
                "label": level.label(),
                "level": level.id(),
                "emotion": emotion,
            }),
        });
        if alert.is_some() {
            tracing::warn!(level = %level, "Risk alert raised");
        }

        let emotion_label = emotion.clone();
        let result = self
            .store
            .blocking(move |store| {
                store.update_emotion(&emotion_label)?;
                store.update_suicide_risk(level.label(), level.id(), alert)
            })
            .await;

        match result {
            Ok(()) => tracing::debug!(emotion = %emotion, level = %level, "Utterance analysed"),
            Err(e) => tracing::warn!(error = %e, "Failed to record analysis"),
        }
    }
}
