//! LLM Client Abstraction
//!
//! Generic interface over the external text-completion service. Two wire
//! shapes are supported: the legacy completion endpoint (flat prompt, stop
//! sequences, `choices[0].text`) and the chat endpoint (role-tagged turns,
//! `choices[0].message.content`). A scripted fake client stands in for the
//! service in tests.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com".to_string(),
            model: "gpt-4".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

/// LLM errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("LLM returned empty response")]
    EmptyResponse,
}

/// Speaker of a conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Prompt in one of the two backend shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Legacy single-turn completion
    Flat(String),
    /// Conversational completion: system instruction then user turn
    Turns(Vec<Turn>),
}

impl Prompt {
    /// Text of the user-visible content, regardless of shape
    pub fn user_content(&self) -> &str {
        match self {
            Prompt::Flat(text) => text,
            Prompt::Turns(turns) => turns
                .iter()
                .rev()
                .find(|t| t.role == Role::User)
                .map(|t| t.content.as_str())
                .unwrap_or(""),
        }
    }

    pub fn system_content(&self) -> Option<&str> {
        match self {
            Prompt::Flat(_) => None,
            Prompt::Turns(turns) => turns
                .iter()
                .find(|t| t.role == Role::System)
                .map(|t| t.content.as_str()),
        }
    }

    /// Total characters across all turns
    pub fn char_len(&self) -> usize {
        match self {
            Prompt::Flat(text) => text.len(),
            Prompt::Turns(turns) => turns.iter().map(|t| t.content.len()).sum(),
        }
    }
}

/// A single request to the completion service
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: Prompt,
    pub max_tokens: u32,
    pub temperature: f32,
    pub frequency_penalty: f32,
    /// Only honoured by the legacy completion shape
    pub stop: Vec<String>,
}

/// Generic LLM client trait
pub trait LlmClient: Send + Sync {
    /// Send one request and return the raw text of the first candidate
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

impl<C: LlmClient + ?Sized> LlmClient for std::sync::Arc<C> {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        (**self).complete(request)
    }
}

/// Real LLM client implementation using HTTP
pub struct HttpLlmClient {
    config: LlmConfig,
    client: reqwest::blocking::Client,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { config, client })
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}{}", self.config.endpoint.trim_end_matches('/'), path);
        let mut request = self.client.post(&url).json(body);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.config.timeout_secs)
            } else {
                LlmError::HttpError(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(LlmError::HttpError(format!("HTTP {} from {}: {}", status, path, snippet)));
        }

        response
            .json()
            .map_err(|e| LlmError::InvalidJson(format!("Failed to parse response: {}", e)))
    }

    /// Legacy completion endpoint
    fn call_completion(&self, request: &CompletionRequest, prompt: &str) -> Result<String, LlmError> {
        let mut body = serde_json::json!({
            "model": request.model,
            "prompt": prompt,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "frequency_penalty": request.frequency_penalty,
        });
        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        let response_json = self.post("/v1/completions", &body)?;

        response_json
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("text"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(LlmError::EmptyResponse)
    }

    /// Chat completion endpoint
    fn call_chat(&self, request: &CompletionRequest, turns: &[Turn]) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": turns,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "frequency_penalty": request.frequency_penalty,
        });

        let response_json = self.post("/v1/chat/completions", &body)?;

        response_json
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(LlmError::EmptyResponse)
    }
}

impl LlmClient for HttpLlmClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        debug!(
            model = %request.model,
            max_tokens = request.max_tokens,
            prompt_chars = request.prompt.char_len(),
            "sending completion request"
        );
        match &request.prompt {
            Prompt::Flat(text) => self.call_completion(request, text),
            Prompt::Turns(turns) => self.call_chat(request, turns),
        }
    }
}

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// Fake LLM client for testing
pub struct FakeLlmClient {
    responses: Mutex<Vec<Result<String, LlmError>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeLlmClient {
    /// Create a fake client with pre-defined responses.
    /// The last remaining response is returned repeatedly.
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a fake client that always returns the same text
    pub fn always_valid(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    /// Create a fake client that always returns an error
    pub fn always_error(error: LlmError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Create a fake client that computes each response from the request
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responses: Mutex::new(Vec::new()),
            responder: Some(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Get the number of calls made
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every request received, in arrival order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LlmClient for FakeLlmClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if let Some(responder) = &self.responder {
            return responder(request);
        }

        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        match responses.len() {
            0 => Err(LlmError::EmptyResponse),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: Prompt) -> CompletionRequest {
        CompletionRequest {
            model: "test".to_string(),
            prompt,
            max_tokens: 16,
            temperature: 0.0,
            frequency_penalty: 0.0,
            stop: vec![],
        }
    }

    #[test]
    fn test_llm_config_default() {
        let config = LlmConfig::default();
        assert_eq!(config.endpoint, "https://api.openai.com");
        assert_eq!(config.model, "gpt-4");
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_fake_client_always_valid() {
        let client = FakeLlmClient::always_valid("hello");

        let result = client.complete(&request(Prompt::Flat("a".into())));
        assert_eq!(result.unwrap(), "hello");
        assert_eq!(client.call_count(), 1);

        // Call again, should return same response
        let result2 = client.complete(&request(Prompt::Flat("b".into())));
        assert_eq!(result2.unwrap(), "hello");
        assert_eq!(client.call_count(), 2);
        assert_eq!(client.requests()[1].prompt, Prompt::Flat("b".into()));
    }

    #[test]
    fn test_fake_client_multiple_responses() {
        let client = FakeLlmClient::new(vec![
            Ok("1".to_string()),
            Ok("2".to_string()),
            Err(LlmError::Timeout(30)),
        ]);
        let req = request(Prompt::Flat(String::new()));

        assert_eq!(client.complete(&req).unwrap(), "1");
        assert_eq!(client.complete(&req).unwrap(), "2");
        assert_eq!(client.complete(&req), Err(LlmError::Timeout(30)));
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn test_fake_client_responder() {
        let client = FakeLlmClient::with_responder(|req| Ok(req.prompt.user_content().to_uppercase()));
        let req = request(Prompt::Turns(vec![Turn::system("sys"), Turn::user("wash fork")]));
        assert_eq!(client.complete(&req).unwrap(), "WASH FORK");
    }

    #[test]
    fn test_prompt_accessors() {
        let turns = Prompt::Turns(vec![Turn::system("S"), Turn::user("U")]);
        assert_eq!(turns.system_content(), Some("S"));
        assert_eq!(turns.user_content(), "U");
        assert_eq!(turns.char_len(), 2);

        let flat = Prompt::Flat("F".into());
        assert_eq!(flat.system_content(), None);
        assert_eq!(flat.user_content(), "F");
    }

    #[test]
    fn test_turn_serializes_lowercase_role() {
        let json = serde_json::to_value(Turn::system("x")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "x"}));
    }
}
