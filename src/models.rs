//! Core data models for the catalog agent

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

//
// ================= Catalog =================
//

/// One product in the fixed corpus. Identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub text: String,
    #[serde(default, rename = "meta")]
    pub metadata: Map<String, Value>,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A retrieval hit. `score` is the cosine similarity in [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ScoredMatch {
    pub id: String,
    pub text: String,
    #[serde(rename = "meta")]
    pub metadata: Map<String, Value>,
    pub score: f32,
}

//
// ================= Conversation =================
//

/// One entry of the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Message {
    UserPrompt {
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// Text the model emitted alongside tool calls. Kept in history, never traced.
    AssistantText {
        content: String,
        timestamp: DateTime<Utc>,
    },
    AssistantFinal {
        content: String,
        timestamp: DateTime<Utc>,
    },
    ToolCall {
        tool_name: String,
        args: Value,
        tool_call_id: String,
        timestamp: DateTime<Utc>,
    },
    ToolReturn {
        tool_name: String,
        result: Value,
        tool_call_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl Message {
    pub fn user_prompt(content: impl Into<String>) -> Self {
        Message::UserPrompt {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Message::AssistantText {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant_final(content: impl Into<String>) -> Self {
        Message::AssistantFinal {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_call(call: &ToolCallRequest) -> Self {
        Message::ToolCall {
            tool_name: call.name.clone(),
            args: call.args.clone(),
            tool_call_id: call.id.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_return(call: &ToolCallRequest, result: Value) -> Self {
        Message::ToolReturn {
            tool_name: call.name.clone(),
            result,
            tool_call_id: call.id.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_user_prompt(&self) -> bool {
        matches!(self, Message::UserPrompt { .. })
    }

    /// Approximate token count, same heuristic as the context window accounting.
    pub fn token_estimate(&self) -> usize {
        let chars = match self {
            Message::UserPrompt { content, .. }
            | Message::AssistantText { content, .. }
            | Message::AssistantFinal { content, .. } => content.len(),
            Message::ToolCall { tool_name, args, .. } => tool_name.len() + args.to_string().len(),
            Message::ToolReturn {
                tool_name, result, ..
            } => tool_name.len() + result.to_string().len(),
        };
        (chars + 3) / 4
    }
}

/// A tool invocation requested by the generation model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }
}

//
// ================= Trace =================
//

/// Redacted projection of a query's new messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TraceEntry {
    UserPrompt {
        content: String,
        timestamp: DateTime<Utc>,
    },
    ToolCall {
        tool_name: String,
        args: Value,
        tool_call_id: String,
    },
    ToolReturn {
        tool_name: String,
        result: Value,
        tool_call_id: String,
    },
}

impl TraceEntry {
    /// Assistant messages have no trace projection.
    pub fn from_message(message: &Message) -> Option<Self> {
        match message {
            Message::UserPrompt { content, timestamp } => Some(TraceEntry::UserPrompt {
                content: content.clone(),
                timestamp: *timestamp,
            }),
            Message::ToolCall {
                tool_name,
                args,
                tool_call_id,
                ..
            } => Some(TraceEntry::ToolCall {
                tool_name: tool_name.clone(),
                args: args.clone(),
                tool_call_id: tool_call_id.clone(),
            }),
            Message::ToolReturn {
                tool_name,
                result,
                tool_call_id,
                ..
            } => Some(TraceEntry::ToolReturn {
                tool_name: tool_name.clone(),
                result: result.clone(),
                tool_call_id: tool_call_id.clone(),
            }),
            Message::AssistantText { .. } | Message::AssistantFinal { .. } => None,
        }
    }
}

//
// ================= Usage =================
//

/// Usage reported by a single generation call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Usage accumulated over the whole tool-calling loop of one query.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageCounters {
    pub requests: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub tool_calls: u32,
}

impl UsageCounters {
    pub fn record_request(&mut self, usage: RequestUsage) {
        self.requests += 1;
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.total_tokens = self.input_tokens + self.output_tokens;
    }

    pub fn record_tool_calls(&mut self, count: usize) {
        self.tool_calls += count as u32;
    }
}

//
// ================= Query I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            session_id: None,
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub query_id: Uuid,
    pub session_id: String,
    pub answer: String,
    pub trace: Vec<TraceEntry>,
    pub usage: UsageCounters,
}

//
// ================= Tool results =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct SalesData {
    pub year: i64,
    pub month: i64,
    pub sales: i64,
}
