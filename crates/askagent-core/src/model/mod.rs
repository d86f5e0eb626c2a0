//! Provider-agnostic model invocation.
//!
//! A [`ModelBackend`] performs exactly one completion call. [`ModelInvoker`]
//! adds timing, metrics and the normalisation the controller relies on: the
//! answer is always a string, and the raw provider payload rides along for
//! diagnostics.

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "openai")]
pub use openai::OpenAiBackend;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ModelInvocationError;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Structured "invoke capability X with arguments Y" emitted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, as produced by the model.
    pub arguments: String,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_call: Option<CapabilityCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant turn that requested a capability instead of answering.
    pub fn capability_request(call: CapabilityCall) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            capability_call: Some(call),
            call_id: None,
        }
    }

    /// Result of a capability, answering the call with `call_id`.
    pub fn capability_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            capability_call: None,
            call_id: Some(call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            capability_call: None,
            call_id: None,
        }
    }
}

/// Capability advertised to the model for function calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub capabilities: Vec<CapabilitySpec>,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system: system.into(),
            messages,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<CapabilitySpec>) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Tagged outcome of one completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    FinalAnswer(String),
    CapabilityRequest(CapabilityCall),
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub reply: ModelReply,
    pub raw: Value,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Executes a single completion request. Implementations must not retry.
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelInvocationError>;
}

pub type DynModelBackend = Arc<dyn ModelBackend>;

#[derive(Clone)]
pub struct ModelInvoker {
    backend: DynModelBackend,
}

impl ModelInvoker {
    pub fn new(backend: DynModelBackend) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// One system + user pair; returns the answer text and raw payload.
    pub async fn invoke(
        &self,
        system_instruction: &str,
        user_content: &str,
    ) -> Result<(String, Value), ModelInvocationError> {
        let request = ModelRequest::new(system_instruction, vec![ChatMessage::user(user_content)]);
        let response = self.converse(&request).await?;
        match response.reply {
            ModelReply::FinalAnswer(text) => Ok((text, response.raw)),
            ModelReply::CapabilityRequest(call) => Err(ModelInvocationError::MalformedResponse(
                format!("unexpected capability request `{}`", call.name),
            )),
        }
    }

    /// Full conversation call, possibly answered with a capability request.
    pub async fn converse(
        &self,
        request: &ModelRequest,
    ) -> Result<ModelResponse, ModelInvocationError> {
        let started = Instant::now();
        let result = self.backend.complete(request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                let kind = match &response.reply {
                    ModelReply::FinalAnswer(_) => "answer",
                    ModelReply::CapabilityRequest(_) => "capability_request",
                };
                debug!(
                    backend = self.backend.name(),
                    turns = request.messages.len(),
                    duration_ms,
                    kind,
                    "model call completed"
                );
                metrics::record_model_call("ok", duration_ms);
            }
            Err(err) => {
                warn!(
                    backend = self.backend.name(),
                    duration_ms,
                    error = %err,
                    "model call failed"
                );
                metrics::record_model_call("error", duration_ms);
            }
        }

        result
    }
}

impl std::fmt::Debug for ModelInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInvoker")
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<ModelRequest>>,
        reply: ModelReply,
    }

    #[async_trait]
    impl ModelBackend for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn complete(
            &self,
            request: &ModelRequest,
        ) -> Result<ModelResponse, ModelInvocationError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(ModelResponse {
                reply: self.reply.clone(),
                raw: json!({"id": "resp-1"}),
            })
        }
    }

    #[tokio::test]
    async fn invoke_sends_exactly_one_user_turn() {
        let backend = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            reply: ModelReply::FinalAnswer("hi".into()),
        });
        let invoker = ModelInvoker::new(backend.clone());

        let (answer, raw) = invoker.invoke("be brief", "hello").await.unwrap();
        assert_eq!(answer, "hi");
        assert_eq!(raw["id"], "resp-1");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].system, "be brief");
        assert_eq!(seen[0].messages, vec![ChatMessage::user("hello")]);
    }

    #[tokio::test]
    async fn invoke_rejects_capability_request() {
        let backend = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            reply: ModelReply::CapabilityRequest(CapabilityCall {
                id: "c1".into(),
                name: "web_search".into(),
                arguments: "{}".into(),
            }),
        });
        let err = ModelInvoker::new(backend)
            .invoke("s", "u")
            .await
            .unwrap_err();
        assert!(matches!(err, ModelInvocationError::MalformedResponse(_)));
    }
}
