//! Insight generator: narrative guidance plus a drawn card list for a question.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::llm::{generate_with_timeout, LlmError, StructuredLlm, StructuredRequest};
use crate::models::Orientation;
use crate::spread::SpreadType;

const INSIGHT_INSTRUCTIONS: &str = "You are a wise and mystical guide providing spiritual insights. \
For the given question and spread type, provide mystical guidance that is both profound and practical. \
Generate a textual insight and a list of cards (with their orientation and interpretation) \
that align with the spread type and the question's theme. \
Ensure the response is meaningful and resonates deeply with the seeker's intent.";

/// One card as named by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawnCard {
    pub name: String,
    pub orientation: Orientation,
    pub interpretation: String,
}

/// Structured result of an insight call, cards in layout order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CelestialInsight {
    pub text: String,
    pub cards: Vec<DrawnCard>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedInsight {
    pub insight: CelestialInsight,
    pub tokens_used: u64,
}

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("celestial insight generation failed: {0}")]
    Llm(#[from] LlmError),
}

#[derive(Debug, Clone)]
pub struct InsightGenerator {
    llm: Arc<dyn StructuredLlm>,
    timeout: Duration,
}

impl InsightGenerator {
    pub fn new(llm: Arc<dyn StructuredLlm>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub fn request_for(question: &str, spread: SpreadType) -> StructuredRequest {
        StructuredRequest {
            system_prompt: INSIGHT_INSTRUCTIONS.to_string(),
            user_prompt: format!(
                "Provide mystical guidance for the question: '{}' and create a card spread of type '{}' \
                 with exactly {} card(s), positions in order: {}.",
                question,
                spread.as_str(),
                spread.card_count(),
                spread.roles().join(", ")
            ),
            schema_name: "celestial_insight".to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "cards": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "orientation": {"type": "string", "enum": ["upright", "reversed"]},
                                "interpretation": {"type": "string"},
                            },
                            "required": ["name", "orientation", "interpretation"],
                            "additionalProperties": false,
                        },
                    },
                },
                "required": ["text", "cards"],
                "additionalProperties": false,
            }),
        }
    }

    /// Ask the model for guidance on `question` laid out as `spread`.
    ///
    /// The number of returned cards is not checked here.
    pub async fn generate(
        &self,
        question: &str,
        spread: SpreadType,
    ) -> Result<GeneratedInsight, InsightError> {
        let request = Self::request_for(question, spread);
        let response = generate_with_timeout(self.llm.as_ref(), &request, self.timeout).await?;
        let insight: CelestialInsight = response.parse()?;
        log::debug!(
            "{} returned {} card(s) for {}",
            self.llm.model(),
            insight.cards.len(),
            spread
        );
        Ok(GeneratedInsight {
            insight,
            tokens_used: response.usage.total_tokens,
        })
    }
}
