//! Model Invocation Adapter
//!
//! One `invoke` contract over the two backend protocol shapes. The shape and
//! the instruction family are decided once, when the invoker is built from a
//! backend identifier; nothing downstream branches on the identifier again.

use crate::llm_client::{CompletionRequest, LlmClient, LlmError, Prompt, Turn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Backend family. Selects the wire shape and the system-instruction variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    /// Flat prompt completion models
    Legacy,
    /// Conversational models that need explicit, spelled-out instructions
    Standard,
    /// Conversational models that follow compact rule lists
    Advanced,
}

impl BackendFamily {
    /// Derive the family from a model identifier
    pub fn from_model_id(model: &str) -> Self {
        if model.contains("gpt-3.5") {
            BackendFamily::Standard
        } else if model.contains("gpt") {
            BackendFamily::Advanced
        } else {
            BackendFamily::Legacy
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "legacy" => Some(BackendFamily::Legacy),
            "standard" => Some(BackendFamily::Standard),
            "advanced" => Some(BackendFamily::Advanced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendFamily::Legacy => "legacy",
            BackendFamily::Standard => "standard",
            BackendFamily::Advanced => "advanced",
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            BackendFamily::Legacy => Strategy::LegacyCompletion,
            BackendFamily::Standard | BackendFamily::Advanced => Strategy::Conversational,
        }
    }
}

impl std::fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape used to talk to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Flat text in, optional stop sequences, first candidate's text out
    LegacyCompletion,
    /// Structured turns in, stop sequences ignored, assistant content out
    Conversational,
}

/// Identifier plus the family resolved from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub id: String,
    pub family: BackendFamily,
}

impl Backend {
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let family = BackendFamily::from_model_id(&id);
        Self { id, family }
    }

    /// Explicit family, overriding the identifier heuristic
    pub fn with_family(id: impl Into<String>, family: BackendFamily) -> Self {
        Self {
            id: id.into(),
            family,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.family.strategy()
    }
}

/// Per-call generation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub repetition_penalty: f32,
    pub stop: Vec<String>,
}

impl InvokeParams {
    pub fn new(max_tokens: u32, repetition_penalty: f32) -> Self {
        Self {
            max_tokens,
            temperature: 0.0,
            repetition_penalty,
            stop: Vec::new(),
        }
    }

    pub fn with_stop(mut self, stop: &[&str]) -> Self {
        self.stop = stop.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Uniform call interface over the backend strategies
#[derive(Clone)]
pub struct ModelInvoker {
    client: Arc<dyn LlmClient>,
    backend: Backend,
}

impl ModelInvoker {
    pub fn new(client: Arc<dyn LlmClient>, backend: Backend) -> Self {
        Self { client, backend }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn family(&self) -> BackendFamily {
        self.backend.family
    }

    /// Invoke the backend once. Errors propagate unmodified; no retry.
    pub fn invoke(&self, prompt: &Prompt, params: &InvokeParams) -> Result<String, LlmError> {
        let (prompt, stop) = match self.backend.strategy() {
            Strategy::LegacyCompletion => (Prompt::Flat(flatten(prompt)), params.stop.clone()),
            Strategy::Conversational => (as_turns(prompt), Vec::new()),
        };

        let request = CompletionRequest {
            model: self.backend.id.clone(),
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            frequency_penalty: params.repetition_penalty,
            stop,
        };

        let raw = self.client.complete(&request)?;
        debug!(backend = %self.backend.id, response_chars = raw.len(), "backend responded");
        Ok(raw.trim().to_string())
    }
}

fn flatten(prompt: &Prompt) -> String {
    match prompt {
        Prompt::Flat(text) => text.clone(),
        Prompt::Turns(turns) => turns
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn as_turns(prompt: &Prompt) -> Prompt {
    match prompt {
        Prompt::Flat(text) => Prompt::Turns(vec![Turn::user(text.clone())]),
        Prompt::Turns(_) => prompt.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{FakeLlmClient, Role};

    fn invoker(model: &str, client: Arc<FakeLlmClient>) -> ModelInvoker {
        ModelInvoker::new(client, Backend::from_id(model))
    }

    #[test]
    fn test_family_from_model_id() {
        assert_eq!(BackendFamily::from_model_id("gpt-3.5-turbo"), BackendFamily::Standard);
        assert_eq!(BackendFamily::from_model_id("gpt-3.5-turbo-16k"), BackendFamily::Standard);
        assert_eq!(BackendFamily::from_model_id("gpt-4"), BackendFamily::Advanced);
        assert_eq!(BackendFamily::from_model_id("text-davinci-003"), BackendFamily::Legacy);
        assert_eq!(BackendFamily::parse("Advanced"), Some(BackendFamily::Advanced));
        assert_eq!(BackendFamily::parse("other"), None);
    }

    #[test]
    fn test_legacy_sends_flat_prompt_with_stop() {
        let client = Arc::new(FakeLlmClient::always_valid("  plan text \n"));
        let inv = invoker("text-davinci-003", client.clone());
        let params = InvokeParams::new(1000, 0.15).with_stop(&["def"]);

        let out = inv
            .invoke(&Prompt::Turns(vec![Turn::system("S"), Turn::user("U")]), &params)
            .unwrap();
        assert_eq!(out, "plan text");

        let req = &client.requests()[0];
        assert_eq!(req.prompt, Prompt::Flat("S\n\nU".to_string()));
        assert_eq!(req.stop, vec!["def".to_string()]);
        assert_eq!(req.max_tokens, 1000);
        assert_eq!(req.frequency_penalty, 0.15);
        assert_eq!(req.model, "text-davinci-003");
    }

    #[test]
    fn test_conversational_ignores_stop() {
        let client = Arc::new(FakeLlmClient::always_valid("\nanswer\n"));
        let inv = invoker("gpt-4", client.clone());
        let params = InvokeParams::new(500, 0.69).with_stop(&["def"]);

        let out = inv.invoke(&Prompt::Flat("hello".into()), &params).unwrap();
        assert_eq!(out, "answer");

        let req = &client.requests()[0];
        assert!(req.stop.is_empty());
        match &req.prompt {
            Prompt::Turns(turns) => {
                assert_eq!(turns.len(), 1);
                assert_eq!(turns[0].role, Role::User);
                assert_eq!(turns[0].content, "hello");
            }
            other => panic!("expected turns, got {:?}", other),
        }
    }

    #[test]
    fn test_errors_propagate_unmodified() {
        let client = Arc::new(FakeLlmClient::always_error(LlmError::HttpError("HTTP 429".into())));
        let inv = invoker("gpt-4", client.clone());
        let err = inv
            .invoke(&Prompt::Flat("x".into()), &InvokeParams::new(10, 0.0))
            .unwrap_err();
        assert_eq!(err, LlmError::HttpError("HTTP 429".into()));
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn test_family_override() {
        let backend = Backend::with_family("my-local-chat", BackendFamily::Advanced);
        assert_eq!(backend.strategy(), Strategy::Conversational);
        assert_eq!(Backend::from_id("my-local-chat").strategy(), Strategy::LegacyCompletion);
    }
}
