//! Live dashboard channel.
//!
//! The dialogue process and the background analyzer write into one shared
//! JSON document; the dashboard polls it at a fixed interval and derives a
//! clinician-facing view. There is no push channel: readers only ever see
//! point-in-time snapshots.

pub mod model;
pub mod poller;
pub mod routes;
pub mod store;
pub mod view;

pub use model::{
    ExternalFactor, OrdinalScore, PatientInfo, RiskAlert, SharedState, SuicideRisk, Symptom,
};
pub use poller::spawn_poller;
pub use routes::{DashboardRouteState, dashboard_routes};
pub use store::SharedStateStore;
pub use view::{DashboardView, RiskTier};
