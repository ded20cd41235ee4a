//! End-to-end flows through the public API with scripted models and the
//! offline embedder.

use catalog_agent::audit::AuditLog;
use catalog_agent::embedding::HashingEmbedder;
use catalog_agent::execution::ToolExecutor;
use catalog_agent::index::{default_catalog, VectorIndex};
use catalog_agent::llm::{ChatModel, ModelResponse, ModelTurn, ScriptedModel};
use catalog_agent::memory::HistoryPolicy;
use catalog_agent::session::DEFAULT_SESSION;
use catalog_agent::tools::{create_default_registry, Tool, GET_SALES, PRODUCT_DESCRIPTIONS};
use catalog_agent::{
    AgentError, LoopOptions, Message, Orchestrator, QueryRequest, ToolCallRequest, TraceEntry,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

async fn catalog_index() -> Arc<VectorIndex> {
    let index = VectorIndex::build(default_catalog(), Arc::new(HashingEmbedder::default()))
        .await
        .unwrap();
    Arc::new(index)
}

async fn agent_with(model: Arc<dyn ChatModel>, options: LoopOptions) -> Orchestrator {
    let registry = create_default_registry(catalog_index().await).unwrap();
    Orchestrator::new(
        model,
        ToolExecutor::new(registry, Duration::from_secs(5)),
        options,
    )
}

async fn agent(model: Arc<dyn ChatModel>) -> Orchestrator {
    agent_with(model, LoopOptions::default()).await
}

fn sales_call(month: i64) -> ModelTurn {
    ModelTurn::tool_calls(vec![ToolCallRequest::new(
        GET_SALES,
        json!({"year": 2024, "month": month}),
    )])
}

#[tokio::test]
async fn single_entry_corpus_matches_related_query() {
    let corpus = json!([{"id": "1", "text": "wireless headphones with noise cancelling"}]);
    let index = VectorIndex::from_json(&corpus, Arc::new(HashingEmbedder::default()))
        .await
        .unwrap();

    let hits = index.search("noise cancelling headphones", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "1");
    assert!(hits[0].score > 0.0);
}

#[tokio::test]
async fn sales_tool_returns_synthetic_figure() {
    let registry = create_default_registry(catalog_index().await).unwrap();
    let sales = registry.resolve(GET_SALES).unwrap();

    let result = sales.execute(&json!({"year": 2024, "month": 3})).await.unwrap();
    assert_eq!(result, json!({"year": 2024, "month": 3, "sales": 607200}));
}

#[tokio::test]
async fn product_search_trace_has_no_assistant_entries() {
    let model = ScriptedModel::new(vec![
        ModelTurn::tool_calls(vec![ToolCallRequest::new(
            PRODUCT_DESCRIPTIONS,
            json!({"query": "noise cancelling headphones", "top_k": 5}),
        )]),
        ModelTurn::final_answer("We stock noise cancelling headphones."),
    ]);
    let agent = agent(Arc::new(model)).await;

    let reply = agent
        .run(QueryRequest::new("Do you have noise cancelling headphones?"))
        .await
        .unwrap();

    assert_eq!(reply.answer, "We stock noise cancelling headphones.");
    assert_eq!(reply.trace.len(), 3);
    assert!(matches!(&reply.trace[0], TraceEntry::UserPrompt { .. }));
    match (&reply.trace[1], &reply.trace[2]) {
        (
            TraceEntry::ToolCall {
                tool_name: call_name,
                tool_call_id: call_id,
                ..
            },
            TraceEntry::ToolReturn {
                tool_name: return_name,
                tool_call_id: return_id,
                result,
            },
        ) => {
            assert_eq!(call_name, PRODUCT_DESCRIPTIONS);
            assert_eq!(return_name, PRODUCT_DESCRIPTIONS);
            assert_eq!(call_id, return_id);
            assert_eq!(result.as_array().unwrap().len(), 5);
        }
        other => panic!("unexpected trace shape: {:?}", other),
    }

    // The stored history keeps the final answer the trace leaves out.
    let history = agent.sessions().snapshot(DEFAULT_SESSION).await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(matches!(history.last(), Some(Message::AssistantFinal { .. })));
}

#[tokio::test]
async fn usage_accumulates_over_the_loop() {
    let model = ScriptedModel::new(vec![
        sales_call(3).with_usage(10, 5),
        ModelTurn::final_answer("607200").with_usage(20, 7),
    ]);
    let agent = agent(Arc::new(model)).await;

    let reply = agent.run(QueryRequest::new("March sales?")).await.unwrap();
    assert_eq!(reply.usage.requests, 2);
    assert_eq!(reply.usage.input_tokens, 30);
    assert_eq!(reply.usage.output_tokens, 12);
    assert_eq!(reply.usage.total_tokens, 42);
    assert_eq!(reply.usage.tool_calls, 1);
}

#[tokio::test]
async fn second_query_sees_previous_history() {
    let model = ScriptedModel::new(vec![
        ModelTurn::final_answer("first"),
        ModelTurn::final_answer("second"),
    ]);
    let agent = agent(Arc::new(model)).await;

    assert_ok!(agent.run(QueryRequest::new("one")).await);
    let reply = agent.run(QueryRequest::new("two")).await.unwrap();

    // Only the new exchange is traced.
    assert_eq!(reply.trace.len(), 1);
    assert_eq!(
        agent.sessions().snapshot(DEFAULT_SESSION).await.unwrap().len(),
        4
    );
}

#[tokio::test]
async fn unknown_tool_fails_and_leaves_history_untouched() {
    let model = ScriptedModel::new(vec![
        ModelTurn::final_answer("hello"),
        ModelTurn::tool_calls(vec![ToolCallRequest::new("launch_rockets", json!({}))]),
    ]);
    let agent = agent(Arc::new(model)).await;

    assert_ok!(agent.run(QueryRequest::new("hi")).await);
    let before = agent.sessions().snapshot(DEFAULT_SESSION).await.unwrap();

    let result = agent.run(QueryRequest::new("do something odd")).await;
    assert!(matches!(result, Err(AgentError::UnknownTool(name)) if name == "launch_rockets"));

    let after = agent.sessions().snapshot(DEFAULT_SESSION).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(agent.audit_log().len().await, 1);
}

#[tokio::test]
async fn endless_tool_calls_hit_the_iteration_cap() {
    let model = Arc::new(ScriptedModel::new((1..=5).map(sales_call).collect()));
    let options = LoopOptions {
        max_iterations: 3,
        ..LoopOptions::default()
    };
    let agent = agent_with(model.clone(), options).await;

    let result = agent.run(QueryRequest::new("keep going")).await;
    assert!(matches!(result, Err(AgentError::LoopNonTermination(3))));
    assert_eq!(model.requests(), 3);
    assert!(agent
        .sessions()
        .snapshot(DEFAULT_SESSION)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn concurrent_queries_on_one_session_do_not_interleave() {
    let model = ScriptedModel::new(vec![
        sales_call(1),
        ModelTurn::final_answer("a"),
        sales_call(2),
        ModelTurn::final_answer("b"),
    ])
    .with_delay(Duration::from_millis(20));
    let agent = agent(Arc::new(model)).await;

    let (first, second) = tokio::join!(
        agent.run(QueryRequest::new("first")),
        agent.run(QueryRequest::new("second")),
    );
    assert_ok!(first);
    assert_ok!(second);

    let history = agent.sessions().snapshot(DEFAULT_SESSION).await.unwrap();
    let kinds: Vec<&str> = history
        .messages()
        .map(|m| match m {
            Message::UserPrompt { .. } => "user",
            Message::ToolCall { .. } => "call",
            Message::ToolReturn { .. } => "return",
            Message::AssistantText { .. } => "text",
            Message::AssistantFinal { .. } => "final",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["user", "call", "return", "final", "user", "call", "return", "final"]
    );

    // Each exchange carries its own sales figure.
    let returns: Vec<i64> = history
        .messages()
        .filter_map(|m| match m {
            Message::ToolReturn { result, .. } => result["sales"].as_i64(),
            _ => None,
        })
        .collect();
    assert_eq!(returns, vec![202400, 404800]);
}

#[tokio::test]
async fn separate_sessions_keep_separate_histories() {
    let model = ScriptedModel::new(vec![
        ModelTurn::final_answer("a"),
        ModelTurn::final_answer("b"),
    ]);
    let agent = agent(Arc::new(model)).await;

    let a = agent
        .run(QueryRequest::new("hi").in_session("alice"))
        .await
        .unwrap();
    agent
        .run(QueryRequest::new("hi").in_session("bob"))
        .await
        .unwrap();

    assert_eq!(a.session_id, "alice");
    assert_eq!(agent.sessions().snapshot("alice").await.unwrap().len(), 2);
    assert_eq!(agent.sessions().snapshot("bob").await.unwrap().len(), 2);
    assert!(agent.sessions().snapshot(DEFAULT_SESSION).await.is_none());
    assert_eq!(
        agent.audit_log().list_for_session("alice").await.unwrap(),
        vec![a.query_id]
    );
}

#[tokio::test]
async fn cancellation_commits_nothing() {
    let model = ScriptedModel::new(vec![ModelTurn::final_answer("too slow")])
        .with_delay(Duration::from_millis(500));
    let agent = agent(Arc::new(model)).await;
    let token = CancellationToken::new();

    let (result, _) = tokio::join!(
        agent.run_with_cancel(QueryRequest::new("hello"), token.clone()),
        async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
        }
    );

    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert!(agent
        .sessions()
        .snapshot(DEFAULT_SESSION)
        .await
        .unwrap()
        .is_empty());
    assert!(agent.audit_log().is_empty().await);
}

#[tokio::test]
async fn hung_model_times_out() {
    let model = ScriptedModel::new(vec![ModelTurn::final_answer("too slow")])
        .with_delay(Duration::from_millis(300));
    let options = LoopOptions {
        model_timeout: Duration::from_millis(20),
        model_max_retries: 0,
        ..LoopOptions::default()
    };
    let agent = agent_with(Arc::new(model), options).await;

    let result = agent.run(QueryRequest::new("hello")).await;
    assert_err!(&result);
    assert!(matches!(result, Err(AgentError::Timeout(_))));
}

#[tokio::test]
async fn history_cap_evicts_old_exchanges() {
    let model = ScriptedModel::new(
        (0..4)
            .map(|i| ModelTurn::final_answer(format!("answer {}", i)))
            .collect(),
    );
    let agent = agent(Arc::new(model))
        .await
        .with_history_policy(HistoryPolicy::new(4));

    for i in 0..4 {
        agent
            .run(QueryRequest::new(format!("question {}", i)))
            .await
            .unwrap();
    }

    let history = agent.sessions().snapshot(DEFAULT_SESSION).await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(matches!(
        history.front(),
        Some(Message::UserPrompt { content, .. }) if content == "question 2"
    ));
}

#[tokio::test]
async fn tool_call_note_does_not_reach_the_trace() {
    let model = ScriptedModel::new(vec![
        ModelTurn {
            response: ModelResponse::ToolCalls {
                note: Some("Checking the catalog.".to_string()),
                calls: vec![ToolCallRequest::new(
                    PRODUCT_DESCRIPTIONS,
                    json!({"query": "laptop"}),
                )],
            },
            usage: Default::default(),
        },
        ModelTurn::final_answer("Here you go."),
    ]);
    let agent = agent(Arc::new(model)).await;

    let reply = agent.run(QueryRequest::new("laptops?")).await.unwrap();
    let kinds: Vec<String> = reply
        .trace
        .iter()
        .map(|entry| serde_json::to_value(entry).unwrap()["kind"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["user-prompt", "tool-call", "tool-return"]);
}

#[tokio::test]
async fn audit_log_stays_within_its_cap() {
    let model = ScriptedModel::new(
        (0..50)
            .map(|i| ModelTurn::final_answer(format!("answer {}", i)))
            .collect(),
    );
    let agent = agent(Arc::new(model))
        .await
        .with_history_policy(HistoryPolicy::new(4))
        .with_audit_log(AuditLog::with_capacity(10));

    let mut last = None;
    for i in 0..50 {
        let reply = agent
            .run(QueryRequest::new(format!("question {}", i)))
            .await
            .unwrap();
        last = Some(reply.query_id);
    }

    assert_eq!(agent.audit_log().len().await, 10);
    assert_eq!(
        agent.sessions().snapshot(DEFAULT_SESSION).await.unwrap().len(),
        4
    );
    assert!(agent.audit_log().get(last.unwrap()).await.unwrap().is_some());
}

#[tokio::test]
async fn cleared_sessions_are_released() {
    let model = ScriptedModel::new(
        (0..20)
            .map(|i| ModelTurn::final_answer(format!("answer {}", i)))
            .collect(),
    );
    let agent = agent(Arc::new(model)).await;

    for i in 0..20 {
        let session_id = format!("visitor-{}", i);
        agent
            .run(QueryRequest::new("hi").in_session(session_id.clone()))
            .await
            .unwrap();
        assert!(agent.sessions().clear(&session_id).await);
    }

    assert!(agent.sessions().is_empty().await);
}
