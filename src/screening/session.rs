//! ScreeningSession: owns one conversation, runs turns through the router,
//! and publishes results to the shared dashboard document.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::RwLock;

use crate::analysis::BackgroundAnalyzer;
use crate::config::ScreeningConfig;
use crate::dashboard::model::PatientInfo;
use crate::dashboard::store::SharedStateStore;
use crate::error::Error;
use crate::llm::LlmProvider;
use crate::screening::prompts;
use crate::screening::router::PhaseRouter;
use crate::screening::state::{ConversationState, HandlerKind, Phase, SharedEffect, StatePatch};

/// What the caller shows for one turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub reply: Option<String>,
    pub phase: Phase,
    /// Whether the conversation has reached its absorbing end phase.
    pub finished: bool,
}

pub struct ScreeningSession {
    router: PhaseRouter,
    store: Arc<SharedStateStore>,
    analyzer: BackgroundAnalyzer,
    state: Arc<RwLock<ConversationState>>,
}

impl ScreeningSession {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        store: Arc<SharedStateStore>,
        analyzer: BackgroundAnalyzer,
        config: &ScreeningConfig,
    ) -> Self {
        Self {
            router: PhaseRouter::new(llm, config.compaction_threshold, config.max_clarifications),
            store,
            analyzer,
            state: Arc::new(RwLock::new(ConversationState::default())),
        }
    }

    /// Start a fresh session: clears the shared document, registers the
    /// patient and seeds the welcome message. Returns the welcome text.
    pub async fn start(
        &self,
        name: &str,
        age: u32,
        gender: &str,
    ) -> Result<(PatientInfo, String), Error> {
        let patient = PatientInfo {
            id: format!("P-{}", rand::thread_rng().gen_range(1000..10000)),
            name: name.to_string(),
            age,
            gender: gender.to_string(),
        };

        let published = patient.clone();
        self.store
            .blocking(move |store| {
                store.clear()?;
                store.update_patient(published)
            })
            .await?;

        let welcome = prompts::welcome_message(name);
        let mut fresh = ConversationState::default();
        let mut patch = StatePatch::new(HandlerKind::Session)
            .phase(Phase::Rapport)
            .reply(welcome.clone());
        patch.patient_info = Some(name.to_string());
        fresh.apply(patch)?;

        *self.state.write().await = fresh;
        tracing::info!(patient = %patient.id, "Screening session started");
        Ok((patient, welcome))
    }

    /// Process one user utterance.
    ///
    /// On error the conversation state is left as it was before the turn.
    pub async fn turn(&self, utterance: &str) -> Result<TurnReply, Error> {
        self.analyzer.spawn(utterance);

        let mut guard = self.state.write().await;
        let outcome = self.router.turn(utterance, guard.clone()).await?;
        *guard = outcome.state;
        let phase = guard.phase;
        drop(guard);

        self.publish(outcome.effects).await;

        Ok(TurnReply {
            reply: outcome.reply,
            phase,
            finished: phase.is_terminal(),
        })
    }

    /// Write handler effects to the shared document. Failures are logged.
    async fn publish(&self, effects: Vec<SharedEffect>) {
        if effects.is_empty() {
            return;
        }
        let result = self
            .store
            .blocking(move |store| {
                for effect in effects {
                    match effect {
                        SharedEffect::Symptom { symptom, score } => {
                            store.update_symptom(symptom, score)?
                        }
                        SharedEffect::ExternalFactor { factor, level } => {
                            store.update_external_factors(&[(factor, level)])?
                        }
                    }
                }
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to publish screening results");
        }
    }

    pub async fn phase(&self) -> Phase {
        self.state.read().await.phase
    }

    /// Copy of the current conversation state.
    pub async fn snapshot(&self) -> ConversationState {
        self.state.read().await.clone()
    }

    /// Replace the conversation state, e.g. to resume a saved session.
    pub async fn restore(&self, state: ConversationState) {
        *self.state.write().await = state;
    }
}
