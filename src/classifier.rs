//! Question classifier.
//!
//! Decides whether a question suits a tarot reading, names its theme and
//! proposes a spread. Two strategies exist: asking the model
//! ([`AiClassifier`]) and keyword patterns ([`RuleClassifier`]). A failed
//! model call is a [`ClassifierError`], never an invalid judgment.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::llm::{generate_with_timeout, LlmError, StructuredLlm, StructuredRequest};
use crate::spread::SpreadType;

pub const DEFAULT_THEME: &str = "personal guidance";

const CLASSIFIER_INSTRUCTIONS: &str = "You are a wise and mystical guide providing spiritual insights. \
Your role is to validate questions for tarot readings and determine the appropriate spread type \
based on the question's theme. Select spreads from the provided list: single_card, \
three_card_spread, celtic_cross_spread, love_spread, career_path_spread, relationship_spread, \
horseshoe_spread. Ensure your theme and spread suggestions align with the question and are \
appropriate for the seeker. Additionally, return a boolean field 'is_valid' to indicate if the \
question is appropriate for a tarot reading. If the question is not valid, return a reason for \
the negative validation result.";

/// The classifier's verdict on a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionJudgment {
    pub is_valid: bool,
    /// Why the question was rejected; usually empty for valid questions.
    pub reason: Option<String>,
    pub theme: String,
    pub spread_type: Option<SpreadType>,
}

/// A judgment plus the tokens spent reaching it.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub judgment: QuestionJudgment,
    pub tokens_used: u64,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("question classification failed: {0}")]
    Llm(#[from] LlmError),
}

/// Which strategy judges questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierStrategy {
    #[default]
    Ai,
    Rules,
}

#[derive(Debug, Clone)]
pub enum QuestionClassifier {
    Ai(AiClassifier),
    Rules(RuleClassifier),
}

impl QuestionClassifier {
    pub async fn classify(&self, question: &str) -> Result<Classification, ClassifierError> {
        match self {
            QuestionClassifier::Ai(classifier) => classifier.classify(question).await,
            QuestionClassifier::Rules(classifier) => Ok(classifier.classify(question)),
        }
    }
}

// ---------------------------------------------------------------------------
// AI-backed
// ---------------------------------------------------------------------------

/// Sends the question to the model with a fixed instruction.
#[derive(Debug, Clone)]
pub struct AiClassifier {
    llm: Arc<dyn StructuredLlm>,
    timeout: Duration,
}

impl AiClassifier {
    pub fn new(llm: Arc<dyn StructuredLlm>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub fn request_for(question: &str) -> StructuredRequest {
        let spreads: Vec<&str> = SpreadType::ALL.iter().map(|s| s.as_str()).collect();
        StructuredRequest {
            system_prompt: CLASSIFIER_INSTRUCTIONS.to_string(),
            user_prompt: format!("Validate the question: '{}'", question),
            schema_name: "question_judgment".to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "is_valid": {"type": "boolean"},
                    "reason": {"type": ["string", "null"]},
                    "theme": {"type": "string"},
                    "spread_type": {"type": ["string", "null"], "enum": spreads_with_null(&spreads)},
                },
                "required": ["is_valid", "reason", "theme", "spread_type"],
                "additionalProperties": false,
            }),
        }
    }

    pub async fn classify(&self, question: &str) -> Result<Classification, ClassifierError> {
        let request = Self::request_for(question);
        let response = generate_with_timeout(self.llm.as_ref(), &request, self.timeout).await?;
        let judgment: QuestionJudgment = response.parse()?;
        Ok(Classification {
            judgment,
            tokens_used: response.usage.total_tokens,
        })
    }
}

fn spreads_with_null(spreads: &[&str]) -> serde_json::Value {
    let mut values: Vec<serde_json::Value> = spreads.iter().map(|s| json!(s)).collect();
    values.push(serde_json::Value::Null);
    serde_json::Value::Array(values)
}

// ---------------------------------------------------------------------------
// Rule-based
// ---------------------------------------------------------------------------

static VALIDITY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // personal
        r"should i|will i|am i|my future|my path|my destiny|my life",
        // decisions
        r"should i do|what choice|which path|which option|what should i decide",
        // guidance
        r"what does|how can|what can|why is|what is my purpose|how to",
        // emotional
        r"why do i feel|why am i|why can't i|why does this keep happening",
        // spiritual
        r"what does the universe|what do the cards|what is the energy|what is happening",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static THEME_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\b(love|relationships?|partner|romance|marriage|dating|soulmate)\b").unwrap(),
            "love and relationships",
        ),
        (
            Regex::new(r"\b(career|jobs?|work|promotion|business|profession)\b").unwrap(),
            "career and work",
        ),
        (
            Regex::new(r"\b(health|healing|illness|wellness|body)\b").unwrap(),
            "health and well-being",
        ),
        (
            Regex::new(r"\b(money|finances?|financial|wealth|debt|salary)\b").unwrap(),
            "money and finances",
        ),
    ]
});

const INVALID_REASON: &str = "Please ask a personal question about your path or future";

/// Pattern-matching classifier used when the model is unavailable or disabled.
#[derive(Debug, Clone, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, question: &str) -> Classification {
        let is_valid = is_valid_question(question);
        let judgment = QuestionJudgment {
            is_valid,
            reason: (!is_valid).then(|| INVALID_REASON.to_string()),
            theme: question_theme(question).to_string(),
            spread_type: Some(spread_for_question(question)),
        };
        Classification {
            judgment,
            tokens_used: 0,
        }
    }
}

/// Whether the question reads as personal, decision, guidance, emotional or
/// spiritual inquiry.
pub fn is_valid_question(question: &str) -> bool {
    let lowered = question.to_lowercase();
    VALIDITY_PATTERNS.iter().any(|p| p.is_match(&lowered))
}

/// Theme label from keyword categories, defaulting to [`DEFAULT_THEME`].
pub fn question_theme(question: &str) -> &'static str {
    let lowered = question.to_lowercase();
    THEME_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&lowered))
        .map(|(_, theme)| *theme)
        .unwrap_or(DEFAULT_THEME)
}

/// Spread from keyword categories using the thread-local RNG.
pub fn spread_for_question(question: &str) -> SpreadType {
    spread_for_question_with(question, &mut rand::thread_rng())
}

/// Spread from keyword categories.
///
/// love/relationship → love spread; career/job and money/finance → career
/// spread; future/guidance → three-card or horseshoe at random; anything else
/// a single card.
pub fn spread_for_question_with<R: Rng + ?Sized>(question: &str, rng: &mut R) -> SpreadType {
    let q = question.to_lowercase();
    if q.contains("love") || q.contains("relationship") {
        SpreadType::LoveSpread
    } else if q.contains("career") || q.contains("job") {
        SpreadType::CareerPathSpread
    } else if q.contains("future") || q.contains("guidance") {
        *[SpreadType::ThreeCardSpread, SpreadType::HorseshoeSpread]
            .choose(rng)
            .unwrap_or(&SpreadType::ThreeCardSpread)
    } else if q.contains("money") || q.contains("finance") {
        SpreadType::CareerPathSpread
    } else {
        SpreadType::SingleCard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_love_question_through_rules() {
        let classification = RuleClassifier::new().classify("Will I find love this year?");
        let judgment = classification.judgment;
        assert!(judgment.is_valid);
        assert!(judgment.reason.is_none());
        assert_eq!(judgment.theme, "love and relationships");
        assert_eq!(judgment.spread_type, Some(SpreadType::LoveSpread));
        assert_eq!(classification.tokens_used, 0);
    }

    #[test]
    fn test_rules_reject_impersonal_questions() {
        let judgment = RuleClassifier::new()
            .classify("Capital of France?")
            .judgment;
        assert!(!judgment.is_valid);
        assert_eq!(judgment.reason.as_deref(), Some(INVALID_REASON));
        assert_eq!(judgment.theme, DEFAULT_THEME);
    }

    #[test]
    fn test_validity_categories() {
        assert!(is_valid_question("Should I move abroad?"));
        assert!(is_valid_question("What choice leads to peace?"));
        assert!(is_valid_question("How can I heal?"));
        assert!(is_valid_question("Why do I feel stuck?"));
        assert!(is_valid_question("What do the cards say about today?"));
        assert!(!is_valid_question("2 + 2"));
    }

    #[test]
    fn test_themes() {
        assert_eq!(question_theme("Should I take the new job?"), "career and work");
        assert_eq!(question_theme("Will my health improve?"), "health and well-being");
        assert_eq!(question_theme("Will I pay off my debt?"), "money and finances");
        assert_eq!(question_theme("What is my purpose?"), DEFAULT_THEME);
    }

    #[test]
    fn test_spread_derivation() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            spread_for_question_with("Is my relationship healthy?", &mut rng),
            SpreadType::LoveSpread
        );
        assert_eq!(
            spread_for_question_with("Should I change my career?", &mut rng),
            SpreadType::CareerPathSpread
        );
        assert_eq!(
            spread_for_question_with("Will money come my way?", &mut rng),
            SpreadType::CareerPathSpread
        );
        assert_eq!(
            spread_for_question_with("Am I on the right road?", &mut rng),
            SpreadType::SingleCard
        );
        for _ in 0..20 {
            let spread = spread_for_question_with("What does my future hold?", &mut rng);
            assert!(matches!(
                spread,
                SpreadType::ThreeCardSpread | SpreadType::HorseshoeSpread
            ));
        }
    }

    #[tokio::test]
    async fn test_ai_classifier_parses_judgment() {
        let llm = Arc::new(ScriptedLlm::new("gpt-4-turbo"));
        llm.push_value(
            json!({
                "is_valid": true,
                "reason": null,
                "theme": "career",
                "spread_type": "career_path_spread"
            }),
            320,
        );
        let classifier = QuestionClassifier::Ai(AiClassifier::new(llm.clone(), Duration::from_secs(5)));

        let classification = classifier.classify("Should I quit?").await.unwrap();
        assert_eq!(classification.tokens_used, 320);
        assert_eq!(
            classification.judgment.spread_type,
            Some(SpreadType::CareerPathSpread)
        );

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].user_prompt.contains("Should I quit?"));
        assert_eq!(requests[0].system_prompt, CLASSIFIER_INSTRUCTIONS);
    }

    #[tokio::test]
    async fn test_ai_invalid_judgment_is_not_an_error() {
        let llm = Arc::new(ScriptedLlm::new("gpt-4-turbo"));
        llm.push_value(
            json!({
                "is_valid": false,
                "reason": "Not a question about the seeker",
                "theme": "trivia",
                "spread_type": null
            }),
            90,
        );
        let classifier = AiClassifier::new(llm, Duration::from_secs(5));
        let judgment = classifier.classify("Capital of France?").await.unwrap().judgment;
        assert!(!judgment.is_valid);
        assert_eq!(judgment.reason.as_deref(), Some("Not a question about the seeker"));
    }

    #[tokio::test]
    async fn test_ai_failures_are_errors() {
        let llm = Arc::new(ScriptedLlm::new("gpt-4-turbo"));
        llm.push_error(LlmError::Transport("connection reset".into()));
        llm.push_value(json!({"is_valid": true, "theme": "x", "spread_type": "tarot_wheel"}), 10);
        llm.push_value(serde_json::Value::Null, 10);
        let classifier = AiClassifier::new(llm, Duration::from_secs(5));

        for _ in 0..3 {
            assert!(classifier.classify("Will I?").await.is_err());
        }
    }
}
