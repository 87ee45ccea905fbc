//! OpenAI Chat Completions client with JSON-schema structured output.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{extract_json, LlmError, StructuredLlm, StructuredRequest, StructuredResponse, UsageMetrics};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Direct integration with the OpenAI Chat Completions API via `reqwest`.
///
/// One HTTP request per [`StructuredLlm::generate`] call; failures are
/// reported, never retried.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    model: String,
    api_key: Option<String>,
    base_url: String,
    temperature: Option<f64>,
    http: reqwest::Client,
}

impl OpenAiClient {
    /// # Arguments
    ///
    /// * `model` - OpenAI model name (e.g. "gpt-4o").
    /// * `api_key` - Bearer token; calls fail with `MissingApiKey` without one.
    /// * `base_url` - Custom API root, defaults to the public endpoint.
    /// * `timeout` - Per-request timeout enforced by the HTTP client.
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature: None,
            http,
        })
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Chat Completions body requesting a strict JSON-schema response.
    pub fn build_request_body(&self, request: &StructuredRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                    "strict": true,
                },
            },
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

/// Extract the structured value and token usage from a completions response.
pub fn parse_completions_response(response: &Value) -> Result<StructuredResponse, LlmError> {
    let message = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| LlmError::Malformed("response has no choices".to_string()))?;

    if let Some(refusal) = message.get("refusal").and_then(|r| r.as_str()) {
        return Err(LlmError::Malformed(format!("model refused: {}", refusal)));
    }

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| LlmError::Malformed("message has no content".to_string()))?;

    let value = extract_json(content)?;

    let usage = response.get("usage");
    let count = |field: &str| {
        usage
            .and_then(|u| u.get(field))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    };
    let usage = UsageMetrics {
        prompt_tokens: count("prompt_tokens"),
        completion_tokens: count("completion_tokens"),
        total_tokens: count("total_tokens"),
    };

    log::debug!(
        "OpenAI token usage: prompt={}, completion={}, total={}",
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.total_tokens
    );

    Ok(StructuredResponse { value, usage })
}

#[async_trait]
impl StructuredLlm for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &StructuredRequest) -> Result<StructuredResponse, LlmError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::MissingApiKey(self.model.clone()))?;

        log::debug!(
            "OpenAiClient.generate: model={}, schema={}",
            self.model,
            request.schema_name
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&self.build_request_body(request))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| {
            LlmError::Malformed(format!(
                "failed to parse OpenAI response: {} - body: {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })?;

        parse_completions_response(&json)
    }
}
