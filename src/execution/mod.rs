//! Tool execution for one model step
//!
//! All requested calls are resolved before any of them runs, then executed
//! concurrently. Results come back in call order regardless of which call
//! finishes first.

use crate::models::ToolCallRequest;
use crate::error::AgentError;
use crate::tools::{Tool, ToolRegistry, ToolSpec};
use crate::Result;
use futures_util::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    /// Execute a batch of calls (fail-fast on the first unknown name).
    pub async fn execute_batch(&self, calls: &[ToolCallRequest]) -> Result<Vec<Value>> {
        let tools = calls
            .iter()
            .map(|call| self.registry.resolve(&call.name))
            .collect::<Result<Vec<_>>>()?;

        let pending = calls
            .iter()
            .zip(tools)
            .map(|(call, tool)| self.execute_one(call, tool));

        join_all(pending).await.into_iter().collect()
    }

    async fn execute_one(&self, call: &ToolCallRequest, tool: Arc<dyn Tool>) -> Result<Value> {
        let start = Instant::now();

        let outcome = tokio::time::timeout(self.timeout, tool.execute(&call.args))
            .await
            .map_err(|_| {
                AgentError::Timeout(format!(
                    "tool '{}' exceeded {} ms",
                    call.name,
                    self.timeout.as_millis()
                ))
            })?;

        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => debug!(
                tool = %call.name,
                tool_call_id = %call.id,
                elapsed_ms,
                "Tool call succeeded"
            ),
            Err(e) => warn!(
                tool = %call.name,
                tool_call_id = %call.id,
                error = %e,
                "Tool call failed"
            ),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps for `args.ms` then echoes `args.tag`.
    struct SleepTool {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &'static str {
            "sleep"
        }

        fn description(&self) -> &'static str {
            "Sleep then echo"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }

        fn returns(&self) -> Value {
            json!({})
        }

        async fn execute(&self, args: &Value) -> Result<Value> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let ms = args["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(args["tag"].clone())
        }
    }

    fn executor(timeout: Duration) -> (ToolExecutor, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(SleepTool { runs: runs.clone() }))
            .unwrap();
        (ToolExecutor::new(registry, timeout), runs)
    }

    #[tokio::test]
    async fn test_results_follow_call_order() {
        let (executor, _) = executor(Duration::from_secs(5));
        let calls = vec![
            ToolCallRequest::new("sleep", json!({"ms": 80, "tag": "slow"})),
            ToolCallRequest::new("sleep", json!({"ms": 0, "tag": "fast"})),
        ];

        let results = executor.execute_batch(&calls).await.unwrap();
        assert_eq!(results, vec![json!("slow"), json!("fast")]);
    }

    #[tokio::test]
    async fn test_calls_run_concurrently() {
        let (executor, _) = executor(Duration::from_secs(5));
        let calls: Vec<_> = (0..4)
            .map(|i| ToolCallRequest::new("sleep", json!({"ms": 100, "tag": i})))
            .collect();

        let start = Instant::now();
        executor.execute_batch(&calls).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_before_anything_runs() {
        let (executor, runs) = executor(Duration::from_secs(5));
        let calls = vec![
            ToolCallRequest::new("sleep", json!({"ms": 0, "tag": "a"})),
            ToolCallRequest::new("launch_rockets", json!({})),
        ];

        let err = executor.execute_batch(&calls).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "launch_rockets"));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_tool_times_out() {
        let (executor, _) = executor(Duration::from_millis(20));
        let calls = vec![ToolCallRequest::new("sleep", json!({"ms": 500, "tag": "late"}))];

        let err = executor.execute_batch(&calls).await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
    }
}
