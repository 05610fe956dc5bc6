//! Conversation loop behaviour against scripted model and tool servers.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{MockProvider, MockSession};
use cora::agent_loop::{ConversationLoop, LoopEvent, LoopEventPayload, TurnOutcome};
use cora::error::CoraError;
use cora::mcp::{Catalog, ServerRegistry, SharedSession, TransportKind};
use cora::types::{ModelMessage, Role};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn shared(session: MockSession) -> SharedSession {
    Arc::new(tokio::sync::Mutex::new(Box::new(session)))
}

async fn catalog_of(sessions: Vec<(&str, MockSession)>) -> Catalog {
    let mut registry = ServerRegistry::default();
    for (id, session) in sessions {
        registry
            .register(id, TransportKind::Stdio, shared(session))
            .await
            .expect("register should succeed");
    }
    registry.snapshot()
}

fn opening() -> Vec<ModelMessage> {
    vec![
        ModelMessage::system("You are Cora."),
        ModelMessage::user("I need to hang a heavy shelf on drywall"),
    ]
}

#[tokio::test]
async fn tool_call_then_answer_takes_two_round_trips() {
    let catalog_session = MockSession::new().tool("search_products", r#"[{"name":"Heavy-Duty Wall Anchor Kit"}]"#);
    let calls = catalog_session.calls();
    let catalog = catalog_of(vec![("zava-customer-sales", catalog_session)]).await;

    let provider = Arc::new(MockProvider::new("gpt-4o"));
    provider.queue_tool_call("call_1", "search_products", json!({"query": "drywall anchor"}));
    provider.queue_response("Try the Heavy-Duty Wall Anchor Kit.");

    let runner = ConversationLoop::new(provider.clone()).with_max_iterations(5);
    let report = runner
        .run(&catalog, opening(), &CancellationToken::new())
        .await
        .expect("turn should complete");

    assert_eq!(
        report.outcome,
        TurnOutcome::Answer {
            text: "Try the Heavy-Duty Wall Anchor Kit.".into()
        }
    );
    assert_eq!(report.round_trips, 2);
    assert_eq!(provider.request_count(), 2);
    assert_eq!(report.usage.total_tokens, 45);

    let recorded = calls.lock().unwrap().clone();
    assert_eq!(
        recorded,
        vec![("search_products".to_string(), json!({"query": "drywall anchor"}))]
    );

    let roles: Vec<Role> = report.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    let tool_result = report.messages[3].as_tool_result().expect("tool result");
    assert_eq!(tool_result.tool_call_id, "call_1");
    assert!(tool_result.content.contains("Wall Anchor"));

    let second = &provider.requests()[1];
    assert_eq!(second.messages.len(), 4);
    assert_eq!(second.tools.len(), 1);
    assert_eq!(second.tools[0].name, "search_products");
}

#[tokio::test]
async fn plain_answer_needs_one_round_trip() {
    let catalog = catalog_of(vec![("sales", MockSession::new().tool("get_sales", "[]"))]).await;
    let provider = Arc::new(MockProvider::new("gpt-4o"));
    provider.queue_response("Hello! What are you building?");

    let report = ConversationLoop::new(provider.clone())
        .run(&catalog, opening(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.answer(), Some("Hello! What are you building?"));
    assert_eq!(report.round_trips, 1);
    assert_eq!(report.messages.len(), 3);
}

#[tokio::test]
async fn unknown_tool_is_reported_to_model_and_loop_continues() {
    let catalog = catalog_of(vec![("sales", MockSession::new().tool("get_sales", "[]"))]).await;
    let provider = Arc::new(MockProvider::new("gpt-4o"));
    provider.queue_tool_call("call_x", "delete_everything", json!({}));
    provider.queue_response("Sorry, I can't do that.");

    let report = ConversationLoop::new(provider.clone())
        .run(&catalog, opening(), &CancellationToken::new())
        .await
        .expect("unknown tool must not abort the turn");

    assert_eq!(report.answer(), Some("Sorry, I can't do that."));
    let result = report.messages[3].as_tool_result().unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("delete_everything"));
    assert!(result.content.contains("get_sales"));
}

#[tokio::test]
async fn tool_failure_is_fed_back_as_error_result() {
    let session = MockSession::new().tool_with("get_sales", |_| {
        Err(CoraError::tool_execution("get_sales", "database offline"))
    });
    let catalog = catalog_of(vec![("sales", session)]).await;
    let provider = Arc::new(MockProvider::new("gpt-4o"));
    provider.queue_tool_call("c1", "get_sales", json!({}));
    provider.queue_response("The sales database is unavailable right now.");

    let report = ConversationLoop::new(provider.clone())
        .run(&catalog, opening(), &CancellationToken::new())
        .await
        .unwrap();

    let result = report.messages[3].as_tool_result().unwrap();
    assert!(result.is_error);
    assert_eq!(result.content, "Error: database offline");
    assert_eq!(report.round_trips, 2);
}

#[tokio::test]
async fn results_follow_emission_order_across_servers() {
    let catalog = catalog_of(vec![
        ("a", MockSession::new().tool("first", "one")),
        ("b", MockSession::new().tool("second", "two")),
    ])
    .await;
    let provider = Arc::new(MockProvider::new("gpt-4o"));
    provider.queue_tool_calls(vec![
        ("c2", "second", json!({})),
        ("c1", "first", json!({})),
    ]);
    provider.queue_response("done");

    let report = ConversationLoop::new(provider.clone())
        .run(&catalog, opening(), &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<_> = report
        .messages
        .iter()
        .filter_map(|m| m.as_tool_result())
        .map(|r| (r.tool_call_id.as_str(), r.content.as_str()))
        .collect();
    assert_eq!(ids, vec![("c2", "two"), ("c1", "one")]);
}

#[tokio::test]
async fn iteration_cap_stops_an_endless_tool_loop() {
    let session = MockSession::new().tool("get_sales", "[]");
    let calls = session.calls();
    let catalog = catalog_of(vec![("sales", session)]).await;
    let provider = Arc::new(MockProvider::new("gpt-4o"));
    for i in 0..10 {
        provider.queue_tool_call(&format!("c{i}"), "get_sales", json!({}));
    }

    let report = ConversationLoop::new(provider.clone())
        .with_max_iterations(3)
        .run(&catalog, opening(), &CancellationToken::new())
        .await
        .expect("cap is an outcome, not an error");

    assert_eq!(report.outcome, TurnOutcome::IterationLimitReached);
    assert_eq!(report.round_trips, 3);
    assert_eq!(provider.request_count(), 3);

    // Calls from the final round trip are dropped, not executed.
    assert_eq!(calls.lock().unwrap().len(), 2);
    let last = report.messages.last().expect("transcript");
    assert_eq!(last.role, Role::Assistant);
    assert!(last.as_tool_result().is_none());
}

#[tokio::test]
async fn empty_registry_fails_before_contacting_model() {
    let provider = Arc::new(MockProvider::new("gpt-4o"));
    let err = ConversationLoop::new(provider.clone())
        .run(&Catalog::default(), opening(), &CancellationToken::new())
        .await
        .expect_err("no providers");

    assert!(matches!(err, CoraError::NoProviders));
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn model_failure_ends_turn_with_inference_error() {
    let catalog = catalog_of(vec![("sales", MockSession::new().tool("get_sales", "[]"))]).await;
    let provider = Arc::new(MockProvider::new("gpt-4o"));
    provider.queue_error(CoraError::api(500, "upstream exploded"));

    let err = ConversationLoop::new(provider.clone())
        .run(&catalog, opening(), &CancellationToken::new())
        .await
        .expect_err("model failure is fatal");
    assert!(matches!(err, CoraError::ModelInference(msg) if msg.contains("upstream exploded")));
}

#[tokio::test(start_paused = true)]
async fn slow_model_times_out_as_inference_error() {
    let catalog = catalog_of(vec![("sales", MockSession::new().tool("get_sales", "[]"))]).await;
    let provider = Arc::new(MockProvider::new("gpt-4o").with_delay(Duration::from_secs(600)));

    let err = ConversationLoop::new(provider)
        .with_model_timeout(Duration::from_secs(5))
        .run(&catalog, opening(), &CancellationToken::new())
        .await
        .expect_err("timeout");
    assert!(matches!(err, CoraError::ModelInference(msg) if msg.contains("Timeout")));
}

#[tokio::test(start_paused = true)]
async fn cancellation_yields_cancelled_outcome() {
    let catalog = catalog_of(vec![("sales", MockSession::new().tool("get_sales", "[]"))]).await;
    let provider = Arc::new(MockProvider::new("gpt-4o").with_delay(Duration::from_secs(60)));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let report = ConversationLoop::new(provider)
        .run(&catalog, opening(), &cancel)
        .await
        .expect("cancellation is an outcome");
    assert_eq!(report.outcome, TurnOutcome::Cancelled);
    assert_eq!(report.round_trips, 1);
}

#[tokio::test]
async fn events_trace_the_turn() {
    let catalog = catalog_of(vec![("sales", MockSession::new().tool("get_sales", "42"))]).await;
    let provider = Arc::new(MockProvider::new("gpt-4o"));
    provider.queue_tool_call("c1", "get_sales", json!({}));
    provider.queue_response("Sales are 42.");

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let sink = Arc::new(move |event: LoopEvent| {
        let label = match event.payload {
            LoopEventPayload::ModelRequested { round_trip, .. } => format!("model:{round_trip}"),
            LoopEventPayload::ToolCallStarted { call } => format!("start:{}", call.name),
            LoopEventPayload::ToolCallFinished { result } => format!("done:{}", result.tool_call_id),
            LoopEventPayload::FinalAnswer { text } => format!("answer:{text}"),
        };
        sink_events.lock().unwrap().push(label);
    });

    ConversationLoop::new(provider)
        .with_event_sink(sink)
        .run(&catalog, opening(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "model:1",
            "start:get_sales",
            "done:c1",
            "model:2",
            "answer:Sales are 42.",
        ]
    );
}
