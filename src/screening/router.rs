//! Entry-point dispatch: picks the compactor or the phase handler for each
//! inbound turn and merges the resulting patches.

use std::sync::Arc;

use crate::error::Error;
use crate::llm::{ChatMessage, LlmProvider};
use crate::screening::compactor::Compactor;
use crate::screening::handlers::PhaseHandlers;
use crate::screening::state::{ConversationState, HandlerKind, Phase, SharedEffect, StatePatch};

/// Where a turn enters the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Compact first, then run the phase handler.
    Compact,
    Handler(HandlerKind),
}

/// Pick the entry route from the current phase and history length.
pub fn route_entry(phase: Phase, message_count: usize, threshold: usize) -> Route {
    if message_count > threshold {
        Route::Compact
    } else {
        Route::Handler(phase.handler())
    }
}

/// Result of one conversation turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The single user-visible reply, if any.
    pub reply: Option<String>,
    pub state: ConversationState,
    /// Handlers that ran, in order.
    pub hops: Vec<HandlerKind>,
    /// Shared-document writes requested by the handlers.
    pub effects: Vec<SharedEffect>,
}

pub struct PhaseRouter {
    handlers: PhaseHandlers,
    compactor: Compactor,
    compaction_threshold: usize,
}

impl PhaseRouter {
    pub fn new(llm: Arc<dyn LlmProvider>, compaction_threshold: usize, max_clarifications: u32) -> Self {
        Self {
            handlers: PhaseHandlers::new(llm.clone(), max_clarifications),
            compactor: Compactor::new(llm),
            compaction_threshold,
        }
    }

    /// Process one user utterance against `prior`.
    ///
    /// Fields no handler touches come back unchanged. A provider failure
    /// aborts the turn and the caller keeps its prior state.
    pub async fn turn(&self, utterance: &str, prior: ConversationState) -> Result<TurnOutcome, Error> {
        let mut state = prior;
        state.messages.push(ChatMessage::user(utterance));

        let mut hops = Vec::new();
        let mut replies = Vec::new();
        let mut effects = Vec::new();

        if route_entry(state.phase, state.messages.len(), self.compaction_threshold) == Route::Compact {
            let patch = self.compactor.compact(&state).await?;
            state.apply(patch)?;
            hops.push(HandlerKind::Compactor);
        }

        let kind = state.phase.handler();
        let patch = self.handlers.run(&state).await?;
        apply_hop(kind, patch, &mut state, &mut replies, &mut effects)?;
        hops.push(kind);

        // Both additional answers are in: advice replies in the same turn.
        // The study answer is not a goodbye, so no farewell check here.
        if kind == HandlerKind::Additional && state.phase == Phase::Advice {
            let patch = self.handlers.advise(&state).await?;
            apply_hop(HandlerKind::Advice, patch, &mut state, &mut replies, &mut effects)?;
            hops.push(HandlerKind::Advice);
        }

        debug_assert!(replies.len() <= 1, "more than one reply in a turn: {replies:?}");
        tracing::info!(
            phase = %state.phase,
            hops = ?hops,
            question = state.current_question_index,
            "Turn complete"
        );

        Ok(TurnOutcome {
            reply: replies.pop(),
            state,
            hops,
            effects,
        })
    }
}

fn apply_hop(
    kind: HandlerKind,
    patch: StatePatch,
    state: &mut ConversationState,
    replies: &mut Vec<String>,
    effects: &mut Vec<SharedEffect>,
) -> Result<(), Error> {
    let from = state.phase;
    replies.extend(patch.replies().map(String::from));
    effects.extend(patch.effects.iter().cloned());
    state.apply(patch)?;
    if state.phase != from {
        tracing::info!(from = %from, to = %state.phase, handler = %kind, "Phase transition");
    }
    Ok(())
}
