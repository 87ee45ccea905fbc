//! Structured-output language model clients.
//!
//! The reading workflow only needs one capability from a model: given a fixed
//! instruction, a user prompt and a JSON schema, return a JSON value matching
//! the schema plus the number of tokens the call consumed. [`StructuredLlm`]
//! is that seam; [`openai::OpenAiClient`] implements it over HTTP and tests
//! substitute a scripted fake.

pub mod openai;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use openai::OpenAiClient;

/// Errors from a model call. None of these mean "the model said no".
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not configured for model '{0}'")]
    MissingApiKey(String),

    /// Connection, TLS or body-read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status from the provider.
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// The response did not carry a value of the requested shape.
    #[error("malformed model response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// What went wrong, in words safe to show a caller. Never includes
    /// provider payloads.
    pub fn outcome(&self) -> &'static str {
        match self {
            LlmError::Timeout(_) => "timed out",
            LlmError::Malformed(_) => "returned an unusable answer",
            LlmError::MissingApiKey(_) | LlmError::Transport(_) | LlmError::Status { .. } => {
                "is unavailable"
            }
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}

/// Token accounting reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// One structured-output request.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRequest {
    /// Fixed instruction text for this kind of call.
    pub system_prompt: String,
    pub user_prompt: String,
    /// Name the provider attaches to the schema.
    pub schema_name: String,
    /// JSON Schema the result must satisfy.
    pub schema: Value,
}

/// Parsed result of a structured-output call.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredResponse {
    pub value: Value,
    pub usage: UsageMetrics,
}

impl StructuredResponse {
    /// Deserialize the value into the caller's result type.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, LlmError> {
        if self.value.is_null() {
            return Err(LlmError::Malformed("empty result".to_string()));
        }
        serde_json::from_value(self.value.clone()).map_err(|e| LlmError::Malformed(e.to_string()))
    }
}

/// A model that answers with JSON conforming to a schema.
#[async_trait]
pub trait StructuredLlm: Send + Sync + fmt::Debug {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Perform a single call. Implementations must not retry.
    async fn generate(&self, request: &StructuredRequest) -> Result<StructuredResponse, LlmError>;
}

/// Run `generate` with an upper bound on wall-clock time.
pub async fn generate_with_timeout(
    llm: &dyn StructuredLlm,
    request: &StructuredRequest,
    timeout: Duration,
) -> Result<StructuredResponse, LlmError> {
    match tokio::time::timeout(timeout, llm.generate(request)).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("{} call exceeded {:?}", llm.model(), timeout);
            Err(LlmError::Timeout(timeout))
        }
    }
}

/// Pull a JSON object out of model text that may wrap it in prose or fences.
pub fn extract_json(text: &str) -> Result<Value, LlmError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }
    Err(LlmError::Malformed(format!(
        "no JSON object in model output: {}",
        trimmed.chars().take(200).collect::<String>()
    )))
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedLlm;
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Shape {
        answer: String,
    }

    #[test]
    fn test_extract_json_from_fenced_text() {
        let value = extract_json("Sure!\n```json\n{\"answer\": \"yes\"}\n```").unwrap();
        assert_eq!(value["answer"], "yes");
        assert!(matches!(
            extract_json("the stars are silent"),
            Err(LlmError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_null_and_wrong_shape() {
        let empty = StructuredResponse {
            value: Value::Null,
            usage: UsageMetrics::default(),
        };
        assert!(matches!(empty.parse::<Shape>(), Err(LlmError::Malformed(_))));

        let wrong = StructuredResponse {
            value: serde_json::json!({"other": 1}),
            usage: UsageMetrics::default(),
        };
        assert!(wrong.parse::<Shape>().is_err());

        let right = StructuredResponse {
            value: serde_json::json!({"answer": "ok"}),
            usage: UsageMetrics::default(),
        };
        assert_eq!(right.parse::<Shape>().unwrap().answer, "ok");
    }

    #[tokio::test]
    async fn test_generate_with_timeout_expires() {
        let llm = ScriptedLlm::new("slow").with_delay(Duration::from_millis(200));
        llm.push_value(serde_json::json!({"answer": "late"}), 10);

        let request = StructuredRequest {
            system_prompt: String::new(),
            user_prompt: "hello".into(),
            schema_name: "shape".into(),
            schema: serde_json::json!({}),
        };
        let err = generate_with_timeout(&llm, &request, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
        assert_eq!(err.outcome(), "timed out");
    }

    #[test]
    fn test_outcome_hides_provider_body() {
        let err = LlmError::Status {
            status: 401,
            body: r#"{"error":{"message":"Incorrect API key","org":"org-SECRET"}}"#.into(),
        };
        assert!(err.to_string().contains("org-SECRET"));
        assert_eq!(err.outcome(), "is unavailable");
        assert_eq!(
            LlmError::Malformed("raw body".into()).outcome(),
            "returned an unusable answer"
        );
    }
}
