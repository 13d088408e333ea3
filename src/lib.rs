//! PHQ Screen: conversational PHQ-9 depression screening with a live
//! clinician dashboard.

pub mod analysis;
pub mod config;
pub mod console;
pub mod dashboard;
pub mod error;
pub mod llm;
pub mod screening;
