//! Screening conversation core.
//!
//! A fixed-phase interview (rapport, permission, PHQ-9 questionnaire,
//! additional stressor questions, advice, end). Each inbound turn is routed
//! to exactly one phase handler, optionally preceded by history compaction.
//! Handlers return patches; the reducer in `state` enforces which handler
//! may write which field.

pub mod compactor;
pub mod extractor;
pub mod handlers;
pub mod prompts;
pub mod router;
pub mod session;
pub mod state;

pub use extractor::{Classification, ScoreExtractor};
pub use router::{PhaseRouter, Route, TurnOutcome, route_entry};
pub use session::{ScreeningSession, TurnReply};
pub use state::{ConversationState, HandlerKind, Phase, SharedEffect, StatePatch};
