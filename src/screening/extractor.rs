//! Classifies a free-text questionnaire answer into a 0–3 score.
//!
//! The model is asked for a small JSON object. Output is scanned for the first
//! well-formed object, starting at each `{` in turn, so surrounding prose,
//! stray braces and markdown fences are skipped. A reply that yields nothing
//! usable is an `ExtractionError`, which the questionnaire turns into a fixed
//! clarification message.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::dashboard::model::OrdinalScore;
use crate::error::{Error, ExtractionError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::screening::prompts::{self, ANSWER_OPTIONS};

/// Model verdict on one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_relevant: bool,
    pub is_ambiguous: bool,
    pub score: Option<OrdinalScore>,
}

impl Classification {
    /// The score to record, if the answer is relevant, unambiguous and scored.
    pub fn accepted_score(&self) -> Option<OrdinalScore> {
        if self.is_relevant && !self.is_ambiguous {
            self.score
        } else {
            None
        }
    }
}

#[derive(Deserialize)]
struct RawClassification {
    #[serde(default)]
    is_relevant: bool,
    #[serde(default)]
    is_ambiguous: bool,
    #[serde(default)]
    score: Option<serde_json::Value>,
}

/// Parse a JSON object out of free-form model output.
///
/// Every `{` is tried as the start of a value; the first one that
/// deserializes wins and anything after it is ignored.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, ExtractionError> {
    let mut last_error = None;
    for (start, _) in text.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<T>();
        match values.next() {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) => last_error = Some(e),
            None => {}
        }
    }
    match last_error {
        Some(e) => Err(ExtractionError::Malformed(e.to_string())),
        None => Err(ExtractionError::NoStructuredBlock),
    }
}

/// Parse the scoring verdict. Scores given as strings or outside 0–3 count
/// as "not scored".
pub fn parse_classification(text: &str) -> Result<Classification, ExtractionError> {
    let raw: RawClassification = parse_structured(text)?;
    let score = raw.score.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    Ok(Classification {
        is_relevant: raw.is_relevant,
        is_ambiguous: raw.is_ambiguous,
        score: score.and_then(|s| OrdinalScore::try_from(s).ok()),
    })
}

/// Deterministic answer matching for the strict picker: a bare digit 0–3 or
/// an exact option phrase.
pub fn parse_option(text: &str) -> Option<OrdinalScore> {
    let normalized = text
        .trim()
        .trim_end_matches(['.', '!'])
        .trim()
        .to_lowercase();
    if let Ok(n) = normalized.parse::<u8>() {
        return OrdinalScore::new(n).ok();
    }
    ANSWER_OPTIONS
        .iter()
        .position(|option| option.to_lowercase() == normalized)
        .and_then(|i| OrdinalScore::new(i as u8).ok())
}

/// Model-backed scorer for questionnaire answers.
pub struct ScoreExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl ScoreExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify `reply` against `question`.
    ///
    /// Provider failures surface as `Error::Llm`; unusable output as
    /// `Error::Extraction`.
    pub async fn classify(&self, question: &str, reply: &str) -> Result<Classification, Error> {
        let request = CompletionRequest::new(vec![ChatMessage::system(prompts::scoring_prompt(
            question, reply,
        ))])
        .with_temperature(0.0)
        .with_max_tokens(200);

        let response = self.llm.complete(request).await?;
        let classification = parse_classification(&response.content).map_err(|e| {
            tracing::warn!(error = %e, raw = %response.content, "Unparseable scoring output");
            e
        })?;
        tracing::debug!(
            relevant = classification.is_relevant,
            ambiguous = classification.is_ambiguous,
            score = ?classification.score,
            "Answer classified"
        );
        Ok(classification)
    }

    /// Ask the model for a polite clarification of an unusable answer.
    pub async fn clarify(&self, question: &str, reply: &str) -> Result<String, Error> {
        let request = CompletionRequest::new(vec![ChatMessage::system(
            prompts::clarification_prompt(question, reply),
        )])
        .with_max_tokens(200);
        let response = self.llm.complete(request).await?;
        Ok(response.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedLlm;

    #[test]
    fn parses_bare_object() {
        let c = parse_classification(r#"{"is_relevant": true, "is_ambiguous": false, "score": 2}"#)
            .unwrap();
        assert_eq!(c.accepted_score(), Some(OrdinalScore::new(2).unwrap()));
    }

    #[test]
    fn parses_object_inside_prose_and_fences() {
        let text = "Sure, here it is:\n```json\n{\"is_relevant\": true, \"is_ambiguous\": false, \"score\": \"3\"}\n```";
        let c = parse_classification(text).unwrap();
        assert_eq!(c.score, Some(OrdinalScore::new(3).unwrap()));
    }

    #[test]
    fn fence_fallback_handles_nested_objects() {
        let text = "```json\n{\"is_relevant\": true, \"is_ambiguous\": false, \"score\": 1, \"meta\": {\"why\": \"x\"}}\n```";
        let c = parse_classification(text).unwrap();
        assert_eq!(c.score, Some(OrdinalScore::new(1).unwrap()));
    }

    #[test]
    fn skips_stray_braces_before_the_block() {
        let text = r#"Reasoning {brief}: {"is_relevant": true, "is_ambiguous": false, "score": 2}"#;
        let c = parse_classification(text).unwrap();
        assert_eq!(c.accepted_score(), Some(OrdinalScore::new(2).unwrap()));
    }

    #[test]
    fn nested_object_inside_prose() {
        let text = r#"Here you go: {"is_relevant": true, "is_ambiguous": false, "score": 1, "meta": {"why": "x"}} hope that helps"#;
        let c = parse_classification(text).unwrap();
        assert_eq!(c.score, Some(OrdinalScore::new(1).unwrap()));
    }

    #[test]
    fn out_of_range_score_is_not_accepted() {
        let c = parse_classification(r#"{"is_relevant": true, "is_ambiguous": false, "score": 7}"#)
            .unwrap();
        assert_eq!(c.score, None);
        assert_eq!(c.accepted_score(), None);
    }

    #[test]
    fn ambiguous_answer_is_not_accepted() {
        let c = parse_classification(r#"{"is_relevant": true, "is_ambiguous": true, "score": 1}"#)
            .unwrap();
        assert_eq!(c.accepted_score(), None);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            parse_classification("I cannot help with that."),
            Err(ExtractionError::NoStructuredBlock)
        ));
        assert!(matches!(
            parse_classification("{ not json"),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn strict_option_matching() {
        assert_eq!(parse_option(" 2 "), Some(OrdinalScore::new(2).unwrap()));
        assert_eq!(parse_option("Nearly every day."), Some(OrdinalScore::new(3).unwrap()));
        assert_eq!(parse_option("not at all"), Some(OrdinalScore::new(0).unwrap()));
        assert_eq!(parse_option("4"), None);
        assert_eq!(parse_option("kind of sometimes"), None);
    }

    #[tokio::test]
    async fn classify_reports_unparseable_output() {
        let llm = Arc::new(ScriptedLlm::fixed("no idea"));
        let extractor = ScoreExtractor::new(llm.clone());
        let err = extractor.classify("Q?", "hmm").await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert_eq!(llm.call_count(), 1);
    }
}
