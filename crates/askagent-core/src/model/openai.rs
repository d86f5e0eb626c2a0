//! `OpenAI`-compatible backend built on `async-openai`.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent, ChatCompletionTool,
    ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionResponse,
    FunctionCall, FunctionObject,
};
use async_trait::async_trait;
use serde_json::Value;

use super::{
    CapabilityCall, ChatMessage, ModelBackend, ModelReply, ModelRequest, ModelResponse, Role,
};
use crate::error::ModelInvocationError;
use crate::security::SecretValue;

pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: &SecretValue, model: impl Into<String>, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key.expose());
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }

    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
            Role::Assistant => {
                let tool_calls = msg.capability_call.as_ref().map(|call| {
                    vec![ChatCompletionMessageToolCall {
                        id: call.id.clone(),
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    }]
                });
                let content = if msg.content.is_empty() {
                    None
                } else {
                    Some(ChatCompletionRequestAssistantMessageContent::Text(
                        msg.content.clone(),
                    ))
                };

                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
            Role::Tool => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(msg.content.clone()),
                tool_call_id: msg.call_id.clone().unwrap_or_default(),
            }),
        }
    }

    fn build_request(&self, request: &ModelRequest) -> CreateChatCompletionRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(Self::convert_message(&ChatMessage::system(
            request.system.clone(),
        )));
        messages.extend(request.messages.iter().map(Self::convert_message));

        let tools = if request.capabilities.is_empty() {
            None
        } else {
            Some(
                request
                    .capabilities
                    .iter()
                    .map(|spec| ChatCompletionTool {
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionObject {
                            name: spec.name.clone(),
                            description: Some(spec.description.clone()),
                            parameters: Some(spec.parameters.clone()),
                            strict: None,
                        },
                    })
                    .collect(),
            )
        };

        CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            tools,
            ..Default::default()
        }
    }

    fn normalize(response: &CreateChatCompletionResponse) -> ModelReply {
        let Some(choice) = response.choices.first() else {
            return ModelReply::FinalAnswer(String::new());
        };

        if let Some(call) = choice
            .message
            .tool_calls
            .as_ref()
            .and_then(|calls| calls.first())
        {
            return ModelReply::CapabilityRequest(CapabilityCall {
                id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            });
        }

        ModelReply::FinalAnswer(choice.message.content.clone().unwrap_or_default())
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("model", &self.model)
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelInvocationError> {
        let response = self
            .client
            .chat()
            .create(self.build_request(request))
            .await
            .map_err(|err| ModelInvocationError::request(err.to_string()))?;

        let reply = Self::normalize(&response);
        let raw = serde_json::to_value(&response).unwrap_or(Value::Null);

        Ok(ModelResponse { reply, raw })
    }
}
