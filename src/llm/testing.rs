//! Scripted model used by tests in place of a real provider.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{LlmError, StructuredLlm, StructuredRequest, StructuredResponse, UsageMetrics};

/// Replays queued responses in order and records every request it receives.
#[derive(Debug)]
pub struct ScriptedLlm {
    model: String,
    delay: Option<Duration>,
    responses: Mutex<VecDeque<Result<StructuredResponse, LlmError>>>,
    requests: Mutex<Vec<StructuredRequest>>,
}

impl ScriptedLlm {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            delay: None,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_value(&self, value: Value, total_tokens: u64) {
        self.responses.lock().unwrap().push_back(Ok(StructuredResponse {
            value,
            usage: UsageMetrics {
                prompt_tokens: total_tokens / 2,
                completion_tokens: total_tokens - total_tokens / 2,
                total_tokens,
            },
        }));
    }

    pub fn push_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl StructuredLlm for ScriptedLlm {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &StructuredRequest) -> Result<StructuredResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("no scripted response left".into())))
    }
}
