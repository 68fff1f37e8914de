//! Agent loop integration tests
//!
//! Drives `run_agent_loop` against the scripted `MockProvider` and checks the
//! emitted chunks together with the conversation each model turn received.

use agent_runtime::mock::MockProvider;
use agent_runtime::{
    AbortSignal, AgentOptions, ChunkStream, CompletionOptions, CompletionResult, ContentPart,
    Error, Hooks, Message, MessageContent, MessageRole, Result, StreamChunk, ToolRegistry, Usage,
    run_agent_loop, tool, wrap_with_completion,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn calculator_registry() -> Arc<ToolRegistry> {
    let add = tool("add", "Add two integers")
        .param("a", "integer")
        .param("b", "integer")
        .build(|args| async move {
            let a = args["a"].as_i64().unwrap_or_default();
            let b = args["b"].as_i64().unwrap_or_default();
            Ok(json!(a + b))
        });

    let step = tool("step", "Advance one step")
        .build(|_args| async move { Ok(json!("ok")) });

    Arc::new(ToolRegistry::new().with_tool(add).with_tool(step))
}

async fn collect(stream: ChunkStream) -> Vec<Result<StreamChunk>> {
    stream.collect().await
}

fn ok_chunks(items: Vec<Result<StreamChunk>>) -> Vec<StreamChunk> {
    items
        .into_iter()
        .map(|item| item.expect("unexpected stream error"))
        .collect()
}

/// Scenario: the model calls `add(2, 3)`, then answers with the sum.
/// Expected: `tool_result{callId:"1",result:5}` and a tool message in the next turn.
#[tokio::test]
async fn test_tool_call_result_is_fed_back() {
    let provider = Arc::new(MockProvider::new());
    provider
        .queue_stream(vec![
            StreamChunk::tool_call("1", "add", json!({"a": 2, "b": 3})),
            StreamChunk::done("tool_calls", true, Usage::new(12, 8)),
        ])
        .queue_stream(vec![
            StreamChunk::text("The answer is 5."),
            StreamChunk::done("stop", false, Usage::new(30, 5)),
        ]);

    let messages = vec![Message::user("What is 2 + 3?")];
    let chunks = ok_chunks(
        collect(run_agent_loop(
            &messages,
            calculator_registry(),
            provider.clone(),
            AgentOptions::default(),
        ))
        .await,
    );

    assert_eq!(chunks.len(), 5);
    assert_eq!(chunks[2], StreamChunk::tool_result("1", json!(5)));
    assert_eq!(chunks[3], StreamChunk::text("The answer is 5."));

    let calls = provider.recorded_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].tools.len(), 2);

    let second_turn = &calls[1].messages;
    assert_eq!(second_turn.len(), 3);
    assert_eq!(second_turn[1].role, MessageRole::Assistant);
    assert_eq!(
        second_turn[1].content,
        MessageContent::Parts(vec![ContentPart::ToolUse {
            id: "1".into(),
            name: "add".into(),
            input: json!({"a": 2, "b": 3}),
        }])
    );
    assert_eq!(second_turn[2].role, MessageRole::Tool);
    assert_eq!(second_turn[2].tool_call_id.as_deref(), Some("1"));
    assert_eq!(second_turn[2].name.as_deref(), Some("add"));
    assert_eq!(second_turn[2].content.text(), "5");
}

/// Scenario: the model requests a tool that was never registered.
/// Expected: a `tool_error` chunk, and the run continues to the next turn.
#[tokio::test]
async fn test_unknown_tool_becomes_tool_error() {
    let provider = Arc::new(MockProvider::new());
    provider
        .queue_stream(vec![
            StreamChunk::tool_call("7", "subtract", json!({"a": 5, "b": 3})),
            StreamChunk::done("tool_calls", true, Usage::default()),
        ])
        .queue_stream(vec![
            StreamChunk::text("I cannot subtract."),
            StreamChunk::done("stop", false, Usage::default()),
        ]);

    let chunks = ok_chunks(
        collect(run_agent_loop(
            &[Message::user("5 - 3?")],
            calculator_registry(),
            provider.clone(),
            AgentOptions::default(),
        ))
        .await,
    );

    assert_eq!(chunks[2], StreamChunk::tool_error("7", "Unknown tool: subtract"));
    let fed_back = &provider.recorded_calls()[1].messages[2];
    assert_eq!(fed_back.content.text(), r#"{"error":"Unknown tool: subtract"}"#);
}

#[tokio::test]
async fn test_invalid_arguments_become_tool_error() {
    let provider = Arc::new(MockProvider::new());
    provider
        .queue_stream(vec![
            StreamChunk::tool_call("1", "add", json!({"a": 2})),
            StreamChunk::done("tool_calls", true, Usage::default()),
        ])
        .queue_stream(vec![StreamChunk::done("stop", false, Usage::default())]);

    let chunks = ok_chunks(
        collect(run_agent_loop(
            &[Message::user("2 + ?")],
            calculator_registry(),
            provider,
            AgentOptions::default(),
        ))
        .await,
    );

    match &chunks[2] {
        StreamChunk::ToolError { call_id, error } => {
            assert_eq!(call_id, "1");
            assert!(error.contains(r#""b" is a required property"#), "got: {}", error);
        }
        other => panic!("expected tool_error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_multiple_calls_run_in_arrival_order() {
    let provider = Arc::new(MockProvider::new());
    provider
        .queue_stream(vec![
            StreamChunk::text("Let me check."),
            StreamChunk::tool_call("a", "add", json!({"a": 1, "b": 1})),
            StreamChunk::tool_call("b", "add", json!({"a": 2, "b": 2})),
            StreamChunk::done("tool_calls", true, Usage::default()),
        ])
        .queue_stream(vec![StreamChunk::done("stop", false, Usage::default())]);

    let chunks = ok_chunks(
        collect(run_agent_loop(
            &[Message::user("1+1 and 2+2")],
            calculator_registry(),
            provider.clone(),
            AgentOptions::default(),
        ))
        .await,
    );

    let outcomes: Vec<_> = chunks.iter().filter(|c| c.is_tool_outcome()).collect();
    assert_eq!(
        outcomes,
        vec![
            &StreamChunk::tool_result("a", json!(2)),
            &StreamChunk::tool_result("b", json!(4)),
        ]
    );

    let second_turn = &provider.recorded_calls()[1].messages;
    match &second_turn[1].content {
        MessageContent::Parts(parts) => {
            assert_eq!(parts.len(), 3);
            assert_eq!(parts[0], ContentPart::text("Let me check."));
        }
        other => panic!("expected parts, got {:?}", other),
    }
    assert_eq!(second_turn[2].tool_call_id.as_deref(), Some("a"));
    assert_eq!(second_turn[3].tool_call_id.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_iteration_cap_stops_the_loop() {
    let provider = Arc::new(MockProvider::new());
    for i in 0..3 {
        provider.queue_stream(vec![
            StreamChunk::tool_call(i.to_string(), "step", json!({})),
            StreamChunk::done("tool_calls", true, Usage::new(1, 1)),
        ]);
    }

    let options = AgentOptions::builder().max_iterations(2).build().unwrap();
    let chunks = ok_chunks(
        collect(run_agent_loop(
            &[Message::user("loop forever")],
            calculator_registry(),
            provider.clone(),
            options,
        ))
        .await,
    );

    assert_eq!(provider.call_count(), 2);
    assert_eq!(provider.remaining(), 1);
    assert_eq!(chunks.iter().filter(|c| c.is_tool_outcome()).count(), 2);
    assert!(matches!(chunks.last(), Some(StreamChunk::ToolResult { .. })));
}

#[tokio::test]
async fn test_provider_open_failure_is_yielded_and_ends_stream() {
    let provider = Arc::new(MockProvider::new());
    provider.queue_open_error("model unavailable");

    let items = collect(run_agent_loop(
        &[Message::user("hi")],
        calculator_registry(),
        provider,
        AgentOptions::default(),
    ))
    .await;

    assert_eq!(items.len(), 1);
    assert!(matches!(&items[0], Err(Error::Provider(msg)) if msg == "model unavailable"));
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_earlier_chunks() {
    let provider = Arc::new(MockProvider::new());
    provider.queue_failing_stream(vec![StreamChunk::text("Hel")], "connection reset");

    let items = collect(run_agent_loop(
        &[Message::user("hi")],
        calculator_registry(),
        provider.clone(),
        AgentOptions::default(),
    ))
    .await;

    assert_eq!(items.len(), 2);
    assert_eq!(*items[0].as_ref().unwrap(), StreamChunk::text("Hel"));
    assert!(items[1].is_err());
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_caller_messages_are_not_modified() {
    let provider = Arc::new(MockProvider::new());
    provider
        .queue_stream(vec![
            StreamChunk::tool_call("1", "add", json!({"a": 2, "b": 3})),
            StreamChunk::done("tool_calls", true, Usage::default()),
        ])
        .queue_stream(vec![StreamChunk::done("stop", false, Usage::default())]);

    let messages = vec![Message::system("Be brief."), Message::user("2 + 3?")];
    let snapshot = messages.clone();

    let _ = collect(run_agent_loop(
        &messages,
        calculator_registry(),
        provider,
        AgentOptions::default(),
    ))
    .await;

    assert_eq!(messages, snapshot);
}

#[tokio::test]
async fn test_abort_before_start_yields_nothing() {
    let provider = Arc::new(MockProvider::new());
    provider.queue_stream(vec![StreamChunk::text("never seen")]);

    let abort = AbortSignal::new();
    abort.cancel();
    let options = AgentOptions::builder().abort_signal(abort).build().unwrap();

    let items = collect(run_agent_loop(
        &[Message::user("hi")],
        calculator_registry(),
        provider.clone(),
        options,
    ))
    .await;

    assert!(items.is_empty());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_abort_interrupts_stalled_provider() {
    let provider = Arc::new(MockProvider::new());
    provider.queue_stalled_stream(vec![StreamChunk::text("thinking")]);

    let abort = AbortSignal::new();
    let options = AgentOptions::builder()
        .abort_signal(abort.clone())
        .build()
        .unwrap();

    let trigger = abort.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let items = tokio::time::timeout(
        Duration::from_secs(5),
        collect(run_agent_loop(
            &[Message::user("hi")],
            calculator_registry(),
            provider,
            options,
        )),
    )
    .await
    .expect("abort did not stop the loop");

    assert_eq!(ok_chunks(items), vec![StreamChunk::text("thinking")]);
}

/// Scenario: a five-step tool conversation is aborted after the second step.
/// Expected: results for the first two steps only, and an aborted completion.
#[tokio::test]
async fn test_abort_between_iterations_reports_partial_result() {
    let provider = Arc::new(MockProvider::new());
    for i in 1..=5 {
        provider.queue_stream(vec![
            StreamChunk::tool_call(format!("call_{}", i), "step", json!({})),
            StreamChunk::done("tool_calls", true, Usage::new(10, 2)),
        ]);
    }

    let abort = AbortSignal::new();
    let trigger = abort.clone();
    let hooks = Hooks::new().add_tool_end(move |event| {
        let trigger = trigger.clone();
        async move {
            if event.iteration == 1 {
                trigger.cancel();
            }
        }
    });

    let options = AgentOptions::builder()
        .max_iterations(10)
        .hooks(hooks)
        .abort_signal(abort.clone())
        .build()
        .unwrap();

    let captured: Arc<Mutex<Option<CompletionResult>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&captured);

    let wrapped = wrap_with_completion(
        run_agent_loop(
            &[Message::user("run all steps")],
            calculator_registry(),
            provider.clone(),
            options,
        ),
        CompletionOptions::new()
            .abort_signal(abort)
            .on_complete(move |result| {
                *sink.lock().unwrap() = Some(result);
                Ok(())
            }),
    );
    let _: Vec<_> = wrapped.collect().await;

    let result = captured.lock().unwrap().take().expect("completion not fired");
    assert!(result.aborted);
    assert_eq!(result.finish_reason, "abort");
    assert_eq!(result.tool_results.len(), 2);
    assert_eq!(result.tool_results[1].call_id, "call_2");
    assert_eq!(result.tool_results[1].name.as_deref(), Some("step"));
    assert_eq!(result.usage, Usage::new(20, 4));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_abort_interrupts_hung_tool_hook() {
    let provider = Arc::new(MockProvider::new());
    provider.queue_stream(vec![
        StreamChunk::tool_call("1", "add", json!({"a": 2, "b": 3})),
        StreamChunk::done("tool_calls", true, Usage::default()),
    ]);

    let hooks = Hooks::new().add_tool_start(|_event| futures::future::pending::<()>());
    let abort = AbortSignal::new();
    let options = AgentOptions::builder()
        .hooks(hooks)
        .abort_signal(abort.clone())
        .build()
        .unwrap();

    let trigger = abort.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let items = tokio::time::timeout(
        Duration::from_secs(2),
        collect(run_agent_loop(
            &[Message::user("2 + 3?")],
            calculator_registry(),
            provider.clone(),
            options,
        )),
    )
    .await
    .expect("abort did not stop the loop while a hook was pending");

    let chunks = ok_chunks(items);
    assert_eq!(chunks.len(), 2);
    assert!(!chunks.iter().any(|c| matches!(c, StreamChunk::ToolResult { .. })));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_hooks_observe_each_tool_execution() {
    let provider = Arc::new(MockProvider::new());
    provider
        .queue_stream(vec![
            StreamChunk::tool_call("1", "add", json!({"a": 2, "b": 3})),
            StreamChunk::tool_call("2", "subtract", json!({})),
            StreamChunk::done("tool_calls", true, Usage::default()),
        ])
        .queue_stream(vec![StreamChunk::done("stop", false, Usage::default())]);

    let log = Arc::new(Mutex::new(Vec::new()));
    let start_log = Arc::clone(&log);
    let end_log = Arc::clone(&log);
    let hooks = Hooks::new()
        .add_tool_start(move |event| {
            let log = Arc::clone(&start_log);
            async move {
                log.lock().unwrap().push(format!("start:{}", event.call.name));
            }
        })
        .add_tool_end(move |event| {
            let log = Arc::clone(&end_log);
            async move {
                log.lock()
                    .unwrap()
                    .push(format!("end:{}:{}", event.call.name, event.outcome.is_success()));
            }
        });

    let options = AgentOptions::builder().hooks(hooks).build().unwrap();
    let _ = collect(run_agent_loop(
        &[Message::user("go")],
        calculator_registry(),
        provider,
        options,
    ))
    .await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["start:add", "end:add:true", "start:subtract", "end:subtract:false"]
    );
}

#[tokio::test]
async fn test_concurrent_loops_share_registry_and_provider() {
    let provider = Arc::new(MockProvider::new());
    for _ in 0..2 {
        provider.queue_stream(vec![
            StreamChunk::text("hi"),
            StreamChunk::done("stop", false, Usage::default()),
        ]);
    }
    let registry = calculator_registry();

    let first = run_agent_loop(
        &[Message::user("one")],
        registry.clone(),
        provider.clone(),
        AgentOptions::default(),
    );
    let second = run_agent_loop(
        &[Message::user("two")],
        registry,
        provider.clone(),
        AgentOptions::default(),
    );

    let (a, b) = tokio::join!(collect(first), collect(second));
    assert_eq!(a.len(), 2);
    assert_eq!(b.len(), 2);
    assert_eq!(provider.call_count(), 2);
}
