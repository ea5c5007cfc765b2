//! LLM-enhanced theme labeling.
//!
//! Builds a prompt from sample reviews and the suggested categories and
//! cleans the completion into a short label. When the LLM fails the error
//! is returned (the consolidator substitutes "Theme N") unless
//! `fallback_to_keywords` asks for a keyword label instead.

use pulse_types::LabelingSettings;

use crate::error::ThemesError;
use crate::labeling::{truncate_label, KeywordLabeler, LabelRequest, ThemeLabel, ThemeLabeler};

/// Most sample reviews placed in a prompt.
const MAX_PROMPT_SAMPLES: usize = 10;

/// Characters kept from each sample review.
const MAX_SAMPLE_CHARS: usize = 200;

/// Trait for LLM completion.
///
/// Implement this trait to provide LLM-based label generation.
/// The implementation should handle API calls, rate limiting, and timeouts.
pub trait LlmClient: Send + Sync {
    /// Generate a completion for the given prompt.
    fn complete(&self, prompt: &str) -> Result<String, ThemesError>;
}

/// LLM-backed theme labeler.
pub struct LlmLabeler<L: LlmClient> {
    llm: Option<L>,
    keyword_fallback: KeywordLabeler,
    config: LabelingSettings,
}

impl<L: LlmClient> LlmLabeler<L> {
    /// Create a new LLM labeler with an optional client.
    pub fn new(llm: Option<L>, config: LabelingSettings) -> Self {
        let keyword_fallback = KeywordLabeler::new(config.clone());
        Self {
            llm,
            keyword_fallback,
            config,
        }
    }

    /// Create an LLM labeler with a client.
    pub fn with_llm(llm: L, config: LabelingSettings) -> Self {
        Self::new(Some(llm), config)
    }

    /// Create an LLM labeler without a client (keyword-only).
    pub fn without_llm(config: LabelingSettings) -> Self {
        Self::new(None, config)
    }

    /// Replace the keyword fallback (e.g. with one that has a corpus).
    pub fn with_keyword_fallback(mut self, keyword_fallback: KeywordLabeler) -> Self {
        self.keyword_fallback = keyword_fallback;
        self
    }

    /// Generate a prompt for the LLM.
    fn generate_prompt(&self, request: &LabelRequest) -> String {
        let reviews: Vec<String> = request
            .samples
            .iter()
            .take(MAX_PROMPT_SAMPLES)
            .map(|s| format!("- {}", s.chars().take(MAX_SAMPLE_CHARS).collect::<String>()))
            .collect();

        format!(
            r#"You are analyzing customer reviews for a mobile app.
Below are sample reviews from a cluster. Generate a concise, human-readable theme name (2-4 words) that captures the main topic.

Suggested categories: {}

Reviews:
{}

Theme name:"#,
            self.config.categories.join(", "),
            reviews.join("\n")
        )
    }

    /// Parse LLM response into a label.
    ///
    /// Keeps the first non-empty line, strips quotes and truncates at a
    /// word boundary.
    fn parse_response(&self, response: &str) -> String {
        let first_line = response
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();

        let cleaned = first_line
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
            .trim();

        truncate_label(cleaned, self.config.max_label_length)
    }

    /// Label using LLM.
    fn label_with_llm(&self, llm: &L, request: &LabelRequest) -> Result<ThemeLabel, ThemesError> {
        let prompt = self.generate_prompt(request);
        let response = llm.complete(&prompt)?;
        let label = self.parse_response(&response);

        if label.is_empty() {
            return Err(ThemesError::Labeling(
                "LLM returned an empty label".to_string(),
            ));
        }

        // Keywords are metadata only; an unlabelable sample set still keeps the LLM label
        let keywords = self
            .keyword_fallback
            .label_theme(request)
            .map(|k| k.keywords)
            .unwrap_or_default();

        Ok(ThemeLabel::new(label, keywords, 0.85))
    }
}

impl<L: LlmClient> ThemeLabeler for LlmLabeler<L> {
    fn label_theme(&self, request: &LabelRequest) -> Result<ThemeLabel, ThemesError> {
        let llm = match &self.llm {
            Some(llm) if self.config.use_llm => llm,
            _ => return self.keyword_fallback.label_theme(request),
        };

        match self.label_with_llm(llm, request) {
            Ok(label) => Ok(label),
            Err(e) => {
                tracing::warn!(
                    theme = request.theme_number,
                    error = %e,
                    "LLM labeling failed"
                );

                if self.config.fallback_to_keywords {
                    return self.keyword_fallback.label_theme(request);
                }

                Err(e)
            }
        }
    }
}

/// A no-op LLM client for testing and keyword-only mode.
///
/// Always returns an error.
pub struct NoOpLlmClient;

impl LlmClient for NoOpLlmClient {
    fn complete(&self, _prompt: &str) -> Result<String, ThemesError> {
        Err(ThemesError::Labeling("No LLM configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test LLM client that returns a fixed response.
    struct MockLlmClient {
        response: String,
        calls: AtomicUsize,
    }

    impl MockLlmClient {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl LlmClient for MockLlmClient {
        fn complete(&self, _prompt: &str) -> Result<String, ThemesError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    /// Test LLM client that always fails.
    struct FailingLlmClient;

    impl LlmClient for FailingLlmClient {
        fn complete(&self, _prompt: &str) -> Result<String, ThemesError> {
            Err(ThemesError::Labeling("LLM API error".to_string()))
        }
    }

    fn request(samples: &[&str]) -> LabelRequest {
        LabelRequest::new(
            2,
            vec![1.0, 0.0],
            samples.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_llm_labeler_with_mock() {
        let labeler =
            LlmLabeler::with_llm(MockLlmClient::new("Withdrawal Delays"), LabelingSettings::default());

        let result = labeler
            .label_theme(&request(&["withdrawal pending", "money stuck in withdrawal"]))
            .unwrap();
        assert_eq!(result.label, "Withdrawal Delays");
        assert!(result.confidence > 0.8);
        assert!(result.keywords.contains(&"withdrawal".to_string()));
    }

    #[test]
    fn test_llm_labeler_failure_without_fallback() {
        let labeler = LlmLabeler::with_llm(FailingLlmClient, LabelingSettings::default());
        let result = labeler.label_theme(&request(&["some text"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_llm_labeler_failure_with_keyword_fallback() {
        let config = LabelingSettings {
            fallback_to_keywords: true,
            ..Default::default()
        };
        let labeler = LlmLabeler::with_llm(FailingLlmClient, config);

        let result = labeler
            .label_theme(&request(&["kyc rejected again", "kyc documents rejected"]))
            .unwrap();
        assert!(result.label.contains("Kyc") || result.label.contains("Rejected"));
    }

    #[test]
    fn test_llm_labeler_without_llm_uses_keywords() {
        let labeler: LlmLabeler<NoOpLlmClient> =
            LlmLabeler::without_llm(LabelingSettings::default());
        let result = labeler.label_theme(&request(&["brokerage charges hidden"])).unwrap();
        assert!(!result.label.is_empty());
    }

    #[test]
    fn test_llm_labeler_disabled() {
        let config = LabelingSettings {
            use_llm: false,
            ..Default::default()
        };
        let mock = MockLlmClient::new("Should Not Use This");
        let labeler = LlmLabeler::with_llm(mock, config);

        let result = labeler.label_theme(&request(&["sip mandate failed"])).unwrap();
        assert_ne!(result.label, "Should Not Use This");
        assert_eq!(labeler.llm.as_ref().unwrap().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_response_is_an_error() {
        let labeler = LlmLabeler::with_llm(MockLlmClient::new("  \n  "), LabelingSettings::default());
        let result = labeler.label_theme(&request(&["otp not received"]));
        assert!(matches!(result, Err(ThemesError::Labeling(_))));
    }

    #[test]
    fn test_generate_prompt_limits_samples() {
        let labeler: LlmLabeler<NoOpLlmClient> =
            LlmLabeler::without_llm(LabelingSettings::default());

        let long = "x".repeat(500);
        let mut samples: Vec<&str> = vec![long.as_str()];
        samples.extend(std::iter::repeat("short review").take(15));

        let prompt = labeler.generate_prompt(&request(&samples));
        assert!(prompt.contains("Customer Service & Support"));
        assert!(prompt.contains(&format!("- {}\n", "x".repeat(200))));
        assert!(!prompt.contains(&"x".repeat(201)));
        assert_eq!(prompt.matches("- short review").count(), 9);
    }

    #[test]
    fn test_parse_response_clean() {
        let labeler: LlmLabeler<NoOpLlmClient> =
            LlmLabeler::without_llm(LabelingSettings::default());

        assert_eq!(labeler.parse_response("Login Issues"), "Login Issues");
        assert_eq!(labeler.parse_response("  Slow Updates  "), "Slow Updates");
        assert_eq!(labeler.parse_response("\"Quoted Label\""), "Quoted Label");
        assert_eq!(
            labeler.parse_response("\nPayment Failures\nBecause users mention UPI"),
            "Payment Failures"
        );
    }

    #[test]
    fn test_parse_response_truncate() {
        let config = LabelingSettings {
            max_label_length: 20,
            ..Default::default()
        };
        let labeler: LlmLabeler<NoOpLlmClient> = LlmLabeler::without_llm(config);

        let parsed = labeler.parse_response("This is a very long theme label that needs truncation");
        assert!(parsed.chars().count() <= 20);
    }

    #[test]
    fn test_noop_client() {
        assert!(NoOpLlmClient.complete("test prompt").is_err());
    }
}
