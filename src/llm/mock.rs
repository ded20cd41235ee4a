//! Offline models for development & testing
//!
//! Keep the system functional without a provider.

use crate::error::AgentError;
use crate::llm::{ChatModel, ModelTurn};
use crate::memory::ConversationState;
use crate::models::{Message, ToolCallRequest};
use crate::tools::{ToolSpec, GET_CURRENT_DATE, GET_SALES, PRODUCT_DESCRIPTIONS};
use crate::Result;
use async_trait::async_trait;
use chrono::{Datelike, Local};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

/// Keyword router: one tool call per question, then an answer built from
/// the tool results.
#[derive(Debug, Default)]
pub struct MockModel;

fn estimate_tokens(text: &str) -> u64 {
    ((text.len() + 3) / 4) as u64
}

/// Year and month mentioned in a question, if any.
fn extract_period(question: &str) -> (Option<i64>, Option<i64>) {
    let lowered = question.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let year = words
        .iter()
        .filter_map(|w| w.parse::<i64>().ok())
        .find(|n| (1900..=2100).contains(n));

    let month = words
        .iter()
        .find_map(|w| MONTHS.iter().position(|m| m == w || (w.len() >= 3 && m.starts_with(*w))))
        .map(|i| i as i64 + 1)
        .or_else(|| {
            words
                .iter()
                .filter_map(|w| w.parse::<i64>().ok())
                .find(|n| (1..=12).contains(n))
        });

    (year, month)
}

fn plan_tool_call(question: &str, tools: &[ToolSpec]) -> Option<ToolCallRequest> {
    let lowered = question.to_lowercase();
    let available = |name: &str| tools.iter().any(|t| t.name == name);
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    if has_any(&["sales", "revenue", "sold"]) && available(GET_SALES) {
        let today = Local::now().date_naive();
        let (year, month) = extract_period(question);
        return Some(ToolCallRequest::new(
            GET_SALES,
            json!({
                "year": year.unwrap_or(today.year() as i64),
                "month": month.unwrap_or(today.month() as i64),
            }),
        ));
    }

    if has_any(&["date", "today", "what day"]) && available(GET_CURRENT_DATE) {
        return Some(ToolCallRequest::new(GET_CURRENT_DATE, json!({})));
    }

    if available(PRODUCT_DESCRIPTIONS) {
        return Some(ToolCallRequest::new(
            PRODUCT_DESCRIPTIONS,
            json!({ "query": question, "top_k": 3 }),
        ));
    }

    None
}

fn describe_result(tool_name: &str, result: &Value) -> String {
    match tool_name {
        GET_SALES => format!(
            "Sales for {}-{:02} were {}.",
            result["year"], result["month"].as_i64().unwrap_or_default(), result["sales"]
        ),
        GET_CURRENT_DATE => format!("Today is {}.", result.as_str().unwrap_or("unknown")),
        PRODUCT_DESCRIPTIONS => {
            let texts: Vec<&str> = result
                .as_array()
                .map(|hits| hits.iter().filter_map(|h| h["text"].as_str()).collect())
                .unwrap_or_default();
            if texts.is_empty() {
                "I couldn't find any matching products.".to_string()
            } else {
                format!("Matching products: {}", texts.join(" | "))
            }
        }
        other => format!("{} returned {}.", other, result),
    }
}

#[async_trait]
impl ChatModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, history: &ConversationState, tools: &[ToolSpec]) -> Result<ModelTurn> {
        let start = history.last_exchange_start().ok_or_else(|| {
            AgentError::InvalidModelResponse("history has no user prompt".to_string())
        })?;

        let mut question = "";
        let mut findings = Vec::new();
        for message in history.messages_since(start) {
            match message {
                Message::UserPrompt { content, .. } => question = content.as_str(),
                Message::ToolReturn {
                    tool_name, result, ..
                } => findings.push(describe_result(tool_name, result)),
                _ => {}
            }
        }

        let input_tokens = history.total_tokens() as u64;

        if findings.is_empty() {
            if let Some(call) = plan_tool_call(question, tools) {
                let output_tokens = estimate_tokens(&call.args.to_string());
                return Ok(ModelTurn::tool_calls(vec![call]).with_usage(input_tokens, output_tokens));
            }
            let answer = "I don't know.";
            return Ok(ModelTurn::final_answer(answer)
                .with_usage(input_tokens, estimate_tokens(answer)));
        }

        let answer = findings.join(" ");
        let output_tokens = estimate_tokens(&answer);
        Ok(ModelTurn::final_answer(answer).with_usage(input_tokens, output_tokens))
    }
}

/// Replays a fixed queue of turns, one per `generate` call.
pub struct ScriptedModel {
    turns: Mutex<VecDeque<Result<ModelTurn>>>,
    requests: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<ModelTurn>) -> Self {
        Self::from_results(turns.into_iter().map(Ok).collect())
    }

    /// Script that can also fail at chosen points.
    pub fn from_results(turns: Vec<Result<ModelTurn>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `generate` has been called.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _history: &ConversationState, _tools: &[ToolSpec]) -> Result<ModelTurn> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.turns.lock().await.pop_front().unwrap_or_else(|| {
            Err(AgentError::InvalidModelResponse(
                "scripted model has no turns left".to_string(),
            ))
        })
    }
}
