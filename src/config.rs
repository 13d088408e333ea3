//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::LlmBackend;

/// Screening runtime configuration.
#[derive(Debug, Clone)]
pub struct ScreeningConfig {
    /// Location of the shared dashboard document.
    pub state_path: PathBuf,
    /// History length above which the router compacts before dispatching.
    pub compaction_threshold: usize,
    /// Model-generated clarifications per question before falling back to
    /// the strict option picker.
    pub max_clarifications: u32,
    /// Whether the background emotion/risk analysis runs on each turn.
    pub analysis_enabled: bool,
    /// Dashboard poll interval.
    pub poll_interval: Duration,
    /// Port for the dashboard HTTP endpoint.
    pub dashboard_port: u16,
    /// LLM backend.
    pub backend: LlmBackend,
    /// LLM model name.
    pub model: String,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            state_path: std::env::temp_dir().join("dashboard_state.json"),
            compaction_threshold: 20,
            max_clarifications: 3,
            analysis_enabled: true,
            poll_interval: Duration::from_secs(2),
            dashboard_port: 7861,
            backend: LlmBackend::Anthropic,
            model: LlmBackend::Anthropic.default_model().to_string(),
        }
    }
}

impl ScreeningConfig {
    /// Build from `PHQ_SCREEN_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (lets tests avoid process env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("PHQ_SCREEN_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }
        if let Some(v) = lookup("PHQ_SCREEN_COMPACTION_THRESHOLD") {
            config.compaction_threshold = parse_number("PHQ_SCREEN_COMPACTION_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("PHQ_SCREEN_MAX_CLARIFICATIONS") {
            config.max_clarifications = parse_number("PHQ_SCREEN_MAX_CLARIFICATIONS", &v)?;
        }
        if let Some(v) = lookup("PHQ_SCREEN_POLL_INTERVAL_SECS") {
            let secs: u64 = parse_number("PHQ_SCREEN_POLL_INTERVAL_SECS", &v)?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "PHQ_SCREEN_POLL_INTERVAL_SECS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("PHQ_SCREEN_DASHBOARD_PORT") {
            config.dashboard_port = parse_number("PHQ_SCREEN_DASHBOARD_PORT", &v)?;
        }

        let disabled = ["PHQ_SCREEN_DISABLE_PIPELINES", "DISABLE_PIPELINES"]
            .iter()
            .filter_map(|key| lookup(key))
            .any(|v| is_truthy(&v));
        config.analysis_enabled = !disabled;

        if let Some(v) = lookup("PHQ_SCREEN_BACKEND") {
            config.backend = v.parse()?;
            config.model = config.backend.default_model().to_string();
        }
        if let Some(model) = lookup("PHQ_SCREEN_MODEL") {
            config.model = model;
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{value}': {e}"),
    })
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "" | "0" | "false" | "no" | "off")
}
