//! OpenAI-compatible gateway implementation.
//!
//! One [`OpenAiGateway`] serves any chat-completions-compatible endpoint via
//! a configurable base URL. Uses [`async_openai`] for type-safe
//! request/response handling: tool definitions map to function tools,
//! structured mode maps to `json_schema` response format. A structured
//! response the service could not shape into the schema comes back as
//! `value: None`, which callers treat as fatal.

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
    ChatCompletionMessageToolCalls, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequest, FunctionCall,
    FunctionObject, ResponseFormat, ResponseFormatJsonSchema,
};
use async_openai::Client;

use planweave_core::llm::LlmGateway;
use planweave_types::llm::{ChatOutcome, LlmError, StructuredOutcome, StructuredSpec, Usage};
use planweave_types::message::{Message, MessageRole};
use planweave_types::tool::{ToolCall, ToolDescriptor};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiGatewayConfig {
    pub gateway_name: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl OpenAiGatewayConfig {
    /// Defaults for the OpenAI API itself.
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self {
            gateway_name: "openai".to_string(),
            api_key: api_key.to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAiGateway
// ---------------------------------------------------------------------------

/// Gateway to any OpenAI-compatible chat-completions API.
///
/// Does NOT derive Debug to prevent accidental exposure of the API key held
/// inside the `async_openai::Client`.
pub struct OpenAiGateway {
    client: Client<OpenAIConfig>,
    gateway_name: String,
    model: String,
}

impl OpenAiGateway {
    pub fn new(config: OpenAiGatewayConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.base_url);
        Self {
            client: Client::with_config(openai_config),
            gateway_name: config.gateway_name,
            model: config.model,
        }
    }

    /// Map a conversation onto the wire message types, including the tool
    /// plumbing: assistant tool-call messages and tool-result messages keyed
    /// by correlation id.
    fn build_messages(conversation: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        conversation
            .iter()
            .map(|message| match message.role {
                MessageRole::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage {
                        content: ChatCompletionRequestSystemMessageContent::Text(
                            message.content.clone(),
                        ),
                        name: None,
                    },
                ),
                MessageRole::User => {
                    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                        content: ChatCompletionRequestUserMessageContent::Text(
                            message.content.clone(),
                        ),
                        name: None,
                    })
                }
                MessageRole::Assistant => {
                    let tool_calls = if message.tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            message
                                .tool_calls
                                .iter()
                                .map(|call| {
                                    ChatCompletionMessageToolCalls::Function(
                                        ChatCompletionMessageToolCall {
                                            id: call.id.clone(),
                                            function: FunctionCall {
                                                name: call.name.clone(),
                                                arguments: call.arguments.clone(),
                                            },
                                        },
                                    )
                                })
                                .collect(),
                        )
                    };
                    let content = if message.content.is_empty() {
                        None
                    } else {
                        Some(ChatCompletionRequestAssistantMessageContent::Text(
                            message.content.clone(),
                        ))
                    };
                    #[allow(deprecated)]
                    ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessage {
                            content,
                            refusal: None,
                            name: None,
                            audio: None,
                            tool_calls,
                            function_call: None,
                        },
                    )
                }
                MessageRole::Tool => {
                    ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                        content: ChatCompletionRequestToolMessageContent::Text(
                            message.content.clone(),
                        ),
                        tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
                    })
                }
            })
            .collect()
    }

    fn build_tools(descriptors: &[ToolDescriptor]) -> Vec<ChatCompletionTool> {
        descriptors
            .iter()
            .map(|descriptor| ChatCompletionTool {
                function: FunctionObject {
                    name: descriptor.name.clone(),
                    description: Some(descriptor.description.clone()),
                    parameters: Some(descriptor.parameters.clone()),
                    strict: None,
                },
            })
            .collect()
    }

    fn extract_usage(usage: Option<async_openai::types::chat::CompletionUsage>) -> Usage {
        usage
            .map(|usage| Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            })
            .unwrap_or_default()
    }
}

fn map_openai_error(error: OpenAIError) -> LlmError {
    match error {
        OpenAIError::ApiError(api_error) => LlmError::Provider {
            message: api_error.message,
        },
        OpenAIError::Reqwest(e) => LlmError::Provider {
            message: e.to_string(),
        },
        OpenAIError::JSONDeserialize(e, _) => LlmError::Deserialization(e.to_string()),
        OpenAIError::InvalidArgument(message) => LlmError::InvalidRequest(message),
        other => LlmError::Provider {
            message: other.to_string(),
        },
    }
}

impl LlmGateway for OpenAiGateway {
    fn name(&self) -> &str {
        &self.gateway_name
    }

    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ChatOutcome, LlmError> {
        let mut request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages: Self::build_messages(conversation),
            ..Default::default()
        };
        if !tools.is_empty() {
            request.tools = Some(
                Self::build_tools(tools)
                    .into_iter()
                    .map(ChatCompletionTools::Function)
                    .collect(),
            );
        }

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        let choice = response.choices.into_iter().next();
        let content = choice.as_ref().and_then(|c| c.message.content.clone());
        let tool_calls = choice
            .and_then(|c| c.message.tool_calls)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|call| match call {
                ChatCompletionMessageToolCalls::Function(call) => Some(ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                }),
                _ => None,
            })
            .collect();

        Ok(ChatOutcome {
            content,
            tool_calls,
            usage: Self::extract_usage(response.usage),
        })
    }

    async fn complete_structured(
        &self,
        conversation: &[Message],
        spec: &StructuredSpec,
    ) -> Result<StructuredOutcome, LlmError> {
        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages: Self::build_messages(conversation),
            response_format: Some(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: spec.name.clone(),
                    schema: Some(spec.schema.clone()),
                    strict: None,
                },
            }),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        let usage = Self::extract_usage(response.usage);
        // Unparseable structured output surfaces as `None`; the caller
        // decides that it is fatal.
        let value = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .and_then(|text| serde_json::from_str(&text).ok());

        Ok(StructuredOutcome { value, usage })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_messages_maps_tool_plumbing() {
        let conversation = vec![
            Message::system("sys"),
            Message::user("q"),
            Message::assistant_tool_calls(vec![ToolCall {
                id: "call_1".to_string(),
                name: "search".to_string(),
                arguments: "{}".to_string(),
            }]),
            Message::tool_result("call_1", "[]"),
        ];
        let messages = OpenAiGateway::build_messages(&conversation);
        assert_eq!(messages.len(), 4);
        assert!(matches!(
            messages[2],
            ChatCompletionRequestMessage::Assistant(_)
        ));
        match &messages[3] {
            ChatCompletionRequestMessage::Tool(tool) => {
                assert_eq!(tool.tool_call_id, "call_1");
            }
            other => panic!("expected tool message, got {other:?}"),
        }
    }

    #[test]
    fn test_build_tools_carries_schema() {
        let descriptors = vec![ToolDescriptor {
            name: "search".to_string(),
            description: "Search the index".to_string(),
            parameters: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        }];
        let tools = OpenAiGateway::build_tools(&descriptors);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "search");
        assert!(tools[0].function.parameters.is_some());
    }

    #[test]
    fn test_config_defaults() {
        let config = OpenAiGatewayConfig::openai("sk-test", "gpt-4o-mini");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o-mini");
    }
}
