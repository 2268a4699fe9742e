mod client;
pub(crate) mod types;

use std::time::Duration;

use crate::error::AiError;

use client::ClaudeClient;
use types::*;

// =============================================================================
// Claude Agent
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    max_tokens: u32,
    temperature: f32,
    http: reqwest::Client,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            max_tokens: 1000,
            temperature: 0.0,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Install a transport-level timeout. Callers that enforce their own
    /// deadline around each call can leave this unset.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, AiError> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    /// Single-turn completion: optional system prompt plus one user message.
    pub async fn chat_completion(
        &self,
        system: Option<&str>,
        user: impl Into<String>,
    ) -> Result<String, AiError> {
        let mut request = ChatRequest::new(&self.model)
            .message(WireMessage::user(user))
            .max_tokens(self.max_tokens)
            .temperature(self.temperature);
        if let Some(system) = system {
            request = request.system(system);
        }

        let response = self.client().chat(&request).await?;

        response.text().ok_or(AiError::EmptyResponse)
    }
}
