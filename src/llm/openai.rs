//! OpenAI-compatible chat completions client
//!
//! Works against any provider exposing `/chat/completions` with function
//! tools. Uses a long-lived reqwest::Client for connection pooling.

use crate::config::ModelEndpoint;
use crate::error::AgentError;
use crate::llm::{ChatModel, ModelResponse, ModelTurn, SYSTEM_PROMPT};
use crate::memory::ConversationState;
use crate::models::{Message, RequestUsage, ToolCallRequest};
use crate::tools::ToolSpec;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

pub struct OpenAiChatModel {
    client: Client,
    endpoint: ModelEndpoint,
}

impl OpenAiChatModel {
    pub fn new(endpoint: ModelEndpoint, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, endpoint })
    }
}

/// History as chat messages. Consecutive tool calls share one assistant
/// message; tool results are correlated by `tool_call_id`.
fn render_messages(history: &ConversationState) -> Vec<Value> {
    let mut out = Vec::with_capacity(history.len() + 1);
    out.push(json!({ "role": "system", "content": SYSTEM_PROMPT }));

    for message in history.messages() {
        match message {
            Message::UserPrompt { content, .. } => {
                out.push(json!({ "role": "user", "content": content }));
            }
            Message::AssistantFinal { content, .. } => {
                out.push(json!({ "role": "assistant", "content": content }));
            }
            Message::AssistantText { content, .. } => {
                out.push(json!({ "role": "assistant", "content": content, "tool_calls": [] }));
            }
            Message::ToolCall {
                tool_name,
                args,
                tool_call_id,
                ..
            } => {
                let call = json!({
                    "id": tool_call_id,
                    "type": "function",
                    "function": { "name": tool_name, "arguments": args.to_string() },
                });

                let open_calls = out
                    .last_mut()
                    .filter(|last| last["role"] == "assistant")
                    .and_then(|last| last.get_mut("tool_calls"))
                    .and_then(Value::as_array_mut);

                match open_calls {
                    Some(calls) => calls.push(call),
                    None => out.push(json!({
                        "role": "assistant",
                        "content": Value::Null,
                        "tool_calls": [call],
                    })),
                }
            }
            Message::ToolReturn {
                result,
                tool_call_id,
                ..
            } => {
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": result.to_string(),
                }));
            }
        }
    }

    out
}

fn render_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|spec| {
            let mut parameters = spec.parameters.clone();
            if let Some(obj) = parameters.as_object_mut() {
                obj.remove("$schema");
            }
            json!({
                "type": "function",
                "function": {
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": parameters,
                },
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Server errors and rate limiting are transient and worth a retry;
/// anything else means the request itself was rejected.
fn error_for_status(status: StatusCode, body: String) -> AgentError {
    let message = format!("chat model returned {}: {}", status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AgentError::UpstreamUnavailable(message)
    } else {
        AgentError::InvalidModelResponse(message)
    }
}

fn parse_turn(response: ChatCompletionResponse) -> Result<ModelTurn> {
    let usage = response
        .usage
        .map(|u| RequestUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::InvalidModelResponse("no choices in response".to_string()))?
        .message;

    let tool_calls = message.tool_calls.unwrap_or_default();
    let content = message.content.filter(|c| !c.trim().is_empty());

    if tool_calls.is_empty() {
        let answer = content.ok_or_else(|| {
            AgentError::InvalidModelResponse("response has neither content nor tool calls".to_string())
        })?;
        return Ok(ModelTurn {
            response: ModelResponse::Final(answer),
            usage,
        });
    }

    let calls = tool_calls
        .into_iter()
        .map(|call| {
            let args = if call.function.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    AgentError::InvalidModelResponse(format!(
                        "arguments for '{}' are not JSON: {}",
                        call.function.name, e
                    ))
                })?
            };
            Ok(ToolCallRequest {
                id: call.id,
                name: call.function.name,
                args,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelTurn {
        response: ModelResponse::ToolCalls {
            note: content,
            calls,
        },
        usage,
    })
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.endpoint.model_name
    }

    async fn generate(&self, history: &ConversationState, tools: &[ToolSpec]) -> Result<ModelTurn> {
        let url = format!("{}/chat/completions", self.endpoint.base_url);

        let mut body = json!({
            "model": self.endpoint.model_name,
            "messages": render_messages(history),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(render_tools(tools));
        }

        debug!(model = %self.endpoint.model_name, messages = history.len(), "Calling chat model");

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            error!("Chat model request failed: {}", e);
            if e.is_timeout() {
                AgentError::Timeout(format!("chat model: {}", e))
            } else {
                AgentError::UpstreamUnavailable(format!("chat model: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Chat model error response: {}", error_text);

            return Err(error_for_status(status, error_text));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            AgentError::InvalidModelResponse(format!("chat model parse error: {}", e))
        })?;

        parse_turn(parsed)
    }
}
