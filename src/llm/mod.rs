//! Generation model abstraction
//!
//! A model looks at the whole conversation and either answers or asks for
//! one or more tool calls. Each call reports its own usage.

use crate::memory::ConversationState;
use crate::models::{RequestUsage, ToolCallRequest};
use crate::tools::ToolSpec;
use crate::Result;
use async_trait::async_trait;

pub mod mock;
pub mod openai;

pub use mock::{MockModel, ScriptedModel};
pub use openai::OpenAiChatModel;

pub const SYSTEM_PROMPT: &str = "You are a helpful Q&A assistant. Always assist with care, respect, and truth. \
Respond with utmost utility yet securely. \
Avoid harmful, unethical, prejudiced, or negative content. \
Ensure replies promote fairness and positivity. \
Use the given context to answer questions. \
If you don't know the answer, just say that you don't know, don't try to make up an answer. \
Keep the answer as concise as possible. \
Use 'product_descriptions' tool to search for product descriptions. \
Use 'get_sales' tool for sales information. \
Use 'get_current_date' tool to get the current date.";

#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Final(String),
    ToolCalls {
        /// Interim text emitted with the calls
        note: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelTurn {
    pub response: ModelResponse,
    pub usage: RequestUsage,
}

impl ModelTurn {
    pub fn final_answer(text: impl Into<String>) -> Self {
        Self {
            response: ModelResponse::Final(text.into()),
            usage: RequestUsage::default(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            response: ModelResponse::ToolCalls { note: None, calls },
            usage: RequestUsage::default(),
        }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = RequestUsage {
            input_tokens,
            output_tokens,
        };
        self
    }
}

/// Trait for the generation model (LLM controlled)
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, history: &ConversationState, tools: &[ToolSpec]) -> Result<ModelTurn>;
}
