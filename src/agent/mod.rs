//! Main orchestrator - the tool-calling loop
//!
//! INPUT → GENERATE → (TOOL CALLS → TOOL RETURNS → GENERATE)* → FINAL → COMMIT
//!
//! A query works on a private copy of its session's history. The copy
//! replaces the stored history only once the model has produced a final
//! answer; any error, timeout or cancellation leaves the session as it was.

use crate::audit::{compute_trace_hash, AuditLog, QueryRecord};
use crate::config::AgentConfig;
use crate::embedding::{EmbeddingProvider, HashingEmbedder, OpenAiEmbedder};
use crate::error::AgentError;
use crate::execution::ToolExecutor;
use crate::index::{default_catalog, VectorIndex};
use crate::llm::{ChatModel, MockModel, ModelResponse, ModelTurn, OpenAiChatModel};
use crate::memory::{ConversationState, HistoryPolicy};
use crate::models::{AgentReply, Message, QueryRequest, TraceEntry, UsageCounters};
use crate::session::{SessionStore, DEFAULT_SESSION};
use crate::tools::{create_default_registry, ToolSpec};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bounds on one query's generation loop
#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub max_iterations: u32,
    pub model_timeout: Duration,
    pub model_max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            model_timeout: Duration::from_secs(60),
            model_max_retries: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl LoopOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_tool_iterations,
            model_timeout: config.model_timeout,
            model_max_retries: config.model_max_retries,
            retry_backoff: config.retry_backoff,
        }
    }
}

/// Result of a loop that reached a final answer, not yet committed.
struct LoopOutcome {
    working: ConversationState,
    first_new: usize,
    answer: String,
    usage: UsageCounters,
}

/// Coordinates the model, the tools and the per-session history
pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    executor: ToolExecutor,
    sessions: SessionStore,
    audit_log: AuditLog,
    history_policy: HistoryPolicy,
    options: LoopOptions,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn ChatModel>, executor: ToolExecutor, options: LoopOptions) -> Self {
        Self {
            model,
            executor,
            sessions: SessionStore::new(),
            audit_log: AuditLog::new(),
            history_policy: HistoryPolicy::default(),
            options,
        }
    }

    /// Wire up providers, the built-in catalog and the default tools.
    /// Falls back to the offline embedder and model when no endpoint is set.
    pub async fn from_config(config: &AgentConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = match &config.embedding {
            Some(endpoint) => Arc::new(OpenAiEmbedder::new(endpoint.clone(), config.embedding_dim)?),
            None => Arc::new(HashingEmbedder::new(config.embedding_dim)),
        };

        let model: Arc<dyn ChatModel> = match &config.model {
            Some(endpoint) => Arc::new(OpenAiChatModel::new(endpoint.clone(), config.model_timeout)?),
            None => {
                warn!("No chat model configured - using offline mock model");
                Arc::new(MockModel)
            }
        };

        let index = VectorIndex::build(default_catalog(), embedder).await?;
        info!(products = index.len(), dimension = index.dimension(), "Catalog index built");

        let registry = create_default_registry(Arc::new(index))?;
        let executor = ToolExecutor::new(registry, config.tool_timeout);

        Ok(Self::new(model, executor, LoopOptions::from_config(config))
            .with_history_policy(HistoryPolicy::new(config.history_max_messages))
            .with_audit_log(AuditLog::with_capacity(config.audit_max_records)))
    }

    pub fn with_audit_log(mut self, audit_log: AuditLog) -> Self {
        self.audit_log = audit_log;
        self
    }

    pub fn with_history_policy(mut self, history_policy: HistoryPolicy) -> Self {
        self.history_policy = history_policy;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn run(&self, request: QueryRequest) -> Result<AgentReply> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run one query. Cancelling the token aborts the in-flight model or
    /// tool call and returns `Cancelled` without touching the session.
    pub async fn run_with_cancel(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<AgentReply> {
        if request.question.trim().is_empty() {
            return Err(AgentError::InvalidInput("question is empty".to_string()));
        }

        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION.to_string());
        let query_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start_time = Instant::now();

        info!(
            query_id = %query_id,
            session_id = %session_id,
            model = self.model.name(),
            "Orchestrator: starting query"
        );

        let handle = self.sessions.get_or_create(&session_id).await;

        // Held until commit: one query at a time per session.
        let mut committed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            guard = handle.lock() => guard,
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            outcome = self.drive(&committed, &request.question) => outcome,
        };

        let LoopOutcome {
            mut working,
            first_new,
            answer,
            usage,
        } = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    query_id = %query_id,
                    session_id = %session_id,
                    error = %e,
                    "Query failed - session history unchanged"
                );
                return Err(e);
            }
        };

        let trace: Vec<TraceEntry> = working
            .messages_since(first_new)
            .filter_map(TraceEntry::from_message)
            .collect();

        self.history_policy.enforce(&mut working);
        *committed = working;
        drop(committed);

        let record = QueryRecord {
            query_id,
            session_id: session_id.clone(),
            question: request.question,
            answer: answer.clone(),
            trace_hash: compute_trace_hash(&trace),
            trace: Arc::new(trace.clone()),
            usage,
            started_at,
            created_at: Utc::now(),
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        };
        self.audit_log.record(record).await?;

        info!(
            query_id = %query_id,
            session_id = %session_id,
            requests = usage.requests,
            tool_calls = usage.tool_calls,
            total_tokens = usage.total_tokens,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Orchestrator: query complete"
        );

        Ok(AgentReply {
            query_id,
            session_id,
            answer,
            trace,
            usage,
        })
    }

    /// The generate ↔ tool loop over a private copy of `prior`.
    async fn drive(&self, prior: &ConversationState, question: &str) -> Result<LoopOutcome> {
        let mut working = prior.clone();
        let first_new = working.len();
        working.push(Message::user_prompt(question));

        let tools = self.executor.specs();
        let mut usage = UsageCounters::default();

        for iteration in 1..=self.options.max_iterations {
            let turn = self.generate(&working, &tools).await?;
            usage.record_request(turn.usage);

            match turn.response {
                ModelResponse::Final(answer) => {
                    debug!(iteration, "Model produced final answer");
                    working.push(Message::assistant_final(answer.clone()));
                    return Ok(LoopOutcome {
                        working,
                        first_new,
                        answer,
                        usage,
                    });
                }
                ModelResponse::ToolCalls { note, calls } => {
                    if calls.is_empty() {
                        return Err(AgentError::InvalidModelResponse(
                            "tool-call response without any calls".to_string(),
                        ));
                    }

                    debug!(
                        iteration,
                        tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                        "Model requested tools"
                    );

                    if let Some(note) = note {
                        working.push(Message::assistant_text(note));
                    }
                    for call in &calls {
                        working.push(Message::tool_call(call));
                    }

                    let results = self.executor.execute_batch(&calls).await?;
                    usage.record_tool_calls(calls.len());

                    for (call, result) in calls.iter().zip(results) {
                        working.push(Message::tool_return(call, result));
                    }
                }
            }
        }

        Err(AgentError::LoopNonTermination(self.options.max_iterations))
    }

    /// One generation call with a timeout, retrying transient failures
    /// with exponential backoff.
    async fn generate(&self, history: &ConversationState, tools: &[ToolSpec]) -> Result<ModelTurn> {
        let mut attempt: u32 = 0;

        loop {
            let result =
                match tokio::time::timeout(self.options.model_timeout, self.model.generate(history, tools))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::Timeout(format!(
                        "model '{}' exceeded {} ms",
                        self.model.name(),
                        self.options.model_timeout.as_millis()
                    ))),
                };

            match result {
                Ok(turn) => return Ok(turn),
                Err(e) if e.is_retryable() && attempt < self.options.model_max_retries => {
                    let delay = self
                        .options
                        .retry_backoff
                        .saturating_mul(1u32 << attempt.min(16));
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.options.model_max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Model call failed - retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
