mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{
    collect_turn, content, finished, kinds, options, tool_call, usage, Step, StubCore,
};
use convoy::agent::{AgentState, ConfirmRequest, ConversationAgent, TurnOutcome, UiPayload};
use convoy::error::quota::QUOTA_HINT;
use convoy::error::ConvoyError;
use convoy::scheduler::{SchedulerEvent, SchedulerEventSender, ToolScheduler};
use convoy::tools::{
    cancelled_response, success_response, AgentTool, ToolArguments, ToolExecutionContext,
    ToolParameters, ToolRegistry,
};
use convoy::types::{
    ConfirmationOutcome, Part, PartUnion, ToolCall, ToolCallRequest, ToolCallStatus,
};

fn list_directory() -> AgentTool {
    AgentTool::new(
        "list_directory",
        "List files",
        ToolParameters::empty(),
        |_args: ToolArguments, _ctx: ToolExecutionContext| async move {
            Ok::<_, ConvoyError>(json!(["a.txt", "b.txt"]))
        },
    )
}

fn recording_write_file(seen: Arc<Mutex<Vec<String>>>) -> AgentTool {
    AgentTool::new(
        "write_file",
        "Write a file",
        ToolParameters::empty(),
        move |args: ToolArguments, _ctx: ToolExecutionContext| {
            let seen = Arc::clone(&seen);
            async move {
                let path = args.get_str("file_path")?.to_string();
                seen.lock().unwrap().push(path);
                Ok::<_, ConvoyError>(json!("written"))
            }
        },
    )
}

/// Finishes a batch after 400ms, or 200ms after it is aborted.
struct LaggingScheduler {
    events: SchedulerEventSender,
}

#[async_trait]
impl ToolScheduler for LaggingScheduler {
    async fn schedule(
        &self,
        requests: Vec<ToolCallRequest>,
        cancel: CancellationToken,
    ) -> convoy::error::Result<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            let calls: Vec<ToolCall> = requests
                .into_iter()
                .map(|request| ToolCall::new(request, ToolCallStatus::Executing))
                .collect();
            let _ = events.send(SchedulerEvent::ToolCallsUpdate(calls.clone()));
            let aborted = tokio::select! {
                _ = cancel.cancelled() => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    true
                }
                _ = tokio::time::sleep(Duration::from_millis(400)) => false,
            };
            let done = calls
                .into_iter()
                .map(|mut call| {
                    if aborted {
                        call.status = ToolCallStatus::Cancelled;
                        call.response = cancelled_response(&call.request, "aborted");
                    } else {
                        call.status = ToolCallStatus::Success;
                        call.response = success_response(&call.request, json!("ok"));
                    }
                    call
                })
                .collect();
            let _ = events.send(SchedulerEvent::AllToolCallsComplete(done));
        });
        Ok(())
    }

    async fn handle_confirmation(
        &self,
        _call_id: &str,
        _outcome: ConfirmationOutcome,
    ) -> convoy::error::Result<()> {
        Ok(())
    }
}

fn function_response_ids(parts: &[PartUnion]) -> Vec<String> {
    parts
        .iter()
        .filter_map(|part| match part {
            PartUnion::Part(Part {
                function_response: Some(response),
                ..
            }) => response.id.clone(),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn tool_results_are_resubmitted_under_the_same_prompt() {
    let core = Arc::new(
        StubCore::new(ToolRegistry::new().with_tool(list_directory()))
            .script(vec![tool_call("c1", "list_directory", json!({})), finished()])
            .script(vec![content("here are your files"), finished()]),
    );
    let agent = ConversationAgent::new(options("conv-a"), core.clone());
    let mut events = agent.subscribe();

    let turn = agent.send("list files", "m1").unwrap();
    let seen = collect_turn(&mut events, "m1").await;
    assert_eq!(turn.wait().await.unwrap(), TurnOutcome::Completed { usage: Some(usage(20)) });

    let kinds = kinds(&seen);
    assert_eq!(kinds.first(), Some(&"start"));
    assert_eq!(kinds.last(), Some(&"finish"));
    let first_group = kinds.iter().position(|k| *k == "tool_group").unwrap();
    let content_at = kinds.iter().position(|k| *k == "content").unwrap();
    assert!(first_group < content_at);
    assert!(matches!(&seen.last().unwrap().payload, UiPayload::Finish(Some(_))));

    let calls = core.stream_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].prompt_id, calls[1].prompt_id);
    assert_eq!(function_response_ids(&calls[1].parts), vec!["c1".to_string()]);

    assert!(agent.protected_call_ids().is_empty());
    let tracked = agent.tracked_calls();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].call.status, ToolCallStatus::Success);
    assert!(tracked[0].response_submitted);
    assert_eq!(agent.state(), AgentState::Ready);
}

#[tokio::test(start_paused = true)]
async fn invalid_stream_is_retried_with_a_single_notice() {
    let core = Arc::new(
        StubCore::new(ToolRegistry::new())
            .script(vec![Step::Fail(ConvoyError::InvalidStream("empty response".into()))])
            .script(vec![content("recovered"), finished()]),
    );
    let agent = ConversationAgent::new(options("conv-b"), core.clone());
    let mut events = agent.subscribe();

    let turn = agent.send("hello", "m1").unwrap();
    let seen = collect_turn(&mut events, "m1").await;

    assert_eq!(kinds(&seen), vec!["start", "error", "content", "finish"]);
    assert!(matches!(turn.wait().await.unwrap(), TurnOutcome::Completed { .. }));
    let calls = core.stream_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].prompt_id, calls[1].prompt_id);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_never_exceeded() {
    let invalid = || vec![Step::Fail(ConvoyError::InvalidStream("truncated".into()))];
    let core = Arc::new(
        StubCore::new(ToolRegistry::new())
            .script(invalid())
            .script(invalid())
            .script(invalid())
            .script(vec![content("should never be requested"), finished()]),
    );
    let agent = ConversationAgent::new(options("conv-p7"), core.clone());
    let mut events = agent.subscribe();

    let turn = agent.send("hello", "m1").unwrap();
    let seen = collect_turn(&mut events, "m1").await;

    assert_eq!(core.stream_calls().len(), 3);
    assert_eq!(kinds(&seen), vec!["start", "error", "error", "error", "finish"]);
    assert!(matches!(&seen.last().unwrap().payload, UiPayload::Finish(None)));
    assert!(matches!(turn.wait().await.unwrap(), TurnOutcome::Failed { .. }));
}

#[tokio::test(start_paused = true)]
async fn calls_from_an_invalid_stream_are_discarded_on_retry() {
    let written = Arc::new(Mutex::new(Vec::new()));
    let core = Arc::new(
        StubCore::new(ToolRegistry::new().with_tool(recording_write_file(Arc::clone(&written))))
            .script(vec![
                tool_call("c1", "write_file", json!({"file_path": "a.txt"})),
                Step::Fail(ConvoyError::InvalidStream("cut off".into())),
            ])
            // The retried response repeats the call under a new id.
            .script(vec![
                tool_call("c2", "write_file", json!({"file_path": "a.txt"})),
                finished(),
            ])
            .script(vec![content("done"), finished()]),
    );
    let mut opts = options("conv-carry");
    opts.yolo_mode = true;
    let agent = ConversationAgent::new(opts, core.clone());
    let mut events = agent.subscribe();

    agent.send("write", "m1").unwrap();
    collect_turn(&mut events, "m1").await;

    assert_eq!(*written.lock().unwrap(), vec!["a.txt".to_string()]);
    let calls = core.stream_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(function_response_ids(&calls[2].parts), vec!["c2".to_string()]);
    assert!(agent.protected_call_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn an_aborted_batch_does_not_complete_the_next_turn() {
    let core = Arc::new(
        StubCore::new(ToolRegistry::new())
            .with_scheduler(|events| Arc::new(LaggingScheduler { events }) as Arc<dyn ToolScheduler>)
            .script(vec![tool_call("c1", "list_directory", json!({})), finished()])
            .script(vec![tool_call("c2", "list_directory", json!({})), finished()])
            .script(vec![content("done"), finished()]),
    );
    let agent = ConversationAgent::new(options("conv-stale"), core.clone());
    let mut events = agent.subscribe();

    let first = agent.send("one", "m1").unwrap();
    loop {
        let event = events.recv().await.unwrap();
        if event.msg_id == "m1" && event.kind() == "tool_group" {
            break;
        }
    }
    assert!(agent.stop());
    assert_eq!(first.wait().await.unwrap(), TurnOutcome::Cancelled);

    let second = agent.send("two", "m2").unwrap();
    collect_turn(&mut events, "m2").await;
    assert!(matches!(second.wait().await.unwrap(), TurnOutcome::Completed { .. }));

    let calls = core.stream_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(function_response_ids(&calls[2].parts), vec!["c2".to_string()]);
    assert!(core.history.lock().unwrap().is_empty());
}

#[tokio::test]
async fn stop_silences_the_turn_except_for_finish() {
    let core = Arc::new(
        StubCore::new(ToolRegistry::new()).script(vec![content("partial"), Step::Hang]),
    );
    let agent = ConversationAgent::new(options("conv-c"), core);
    let mut events = agent.subscribe();

    let turn = agent.send("write an essay", "m1").unwrap();
    loop {
        let event = events.recv().await.unwrap();
        if event.kind() == "content" {
            break;
        }
    }
    assert!(agent.stop());
    assert_eq!(turn.wait().await.unwrap(), TurnOutcome::Cancelled);

    let mut after = Vec::new();
    while let Ok(event) = events.try_recv() {
        after.push(event);
    }
    assert_eq!(kinds(&after), vec!["finish"]);
    assert_eq!(agent.state(), AgentState::Stopped);
    assert!(!agent.stop());
}

#[tokio::test]
async fn yolo_mode_auto_approves_file_changes() {
    let written = Arc::new(Mutex::new(Vec::new()));
    let core = Arc::new(
        StubCore::new(ToolRegistry::new().with_tool(recording_write_file(Arc::clone(&written))))
            .script(vec![
                tool_call("c1", "write_file", json!({"path": "notes.txt", "content": "x"})),
                finished(),
            ])
            .script(vec![content("saved"), finished()]),
    );
    let mut opts = options("conv-yolo");
    opts.yolo_mode = true;
    let agent = ConversationAgent::new(opts, core);
    let mut events = agent.subscribe();

    let turn = agent.send("save my notes", "m1").unwrap();
    collect_turn(&mut events, "m1").await;

    assert!(matches!(turn.wait().await.unwrap(), TurnOutcome::Completed { .. }));
    // `path` was normalized to `file_path` before the tool saw it.
    assert_eq!(*written.lock().unwrap(), vec!["notes.txt".to_string()]);
}

#[tokio::test]
async fn confirmations_are_relayed_to_the_scheduler() {
    let written = Arc::new(Mutex::new(Vec::new()));
    let core = Arc::new(
        StubCore::new(ToolRegistry::new().with_tool(recording_write_file(Arc::clone(&written))))
            .script(vec![
                tool_call("c1", "write_file", json!({"file_path": "a.txt"})),
                finished(),
            ])
            .script(vec![content("ok"), finished()]),
    );
    let agent = ConversationAgent::new(options("conv-confirm"), core);
    let mut events = agent.subscribe();

    let turn = agent.send("write it", "m1").unwrap();
    loop {
        let event = events.recv().await.unwrap();
        if let UiPayload::ToolGroup(items) = &event.payload {
            if items
                .iter()
                .any(|i| i.status == ToolCallStatus::AwaitingApproval && i.confirmation.is_some())
            {
                break;
            }
        }
    }
    assert!(written.lock().unwrap().is_empty());

    agent
        .confirm_message(ConfirmRequest {
            confirm_key: "proceed_once".into(),
            msg_id: "m1".into(),
            call_id: "c1".into(),
        })
        .await
        .unwrap();
    assert!(matches!(turn.wait().await.unwrap(), TurnOutcome::Completed { .. }));
    assert_eq!(*written.lock().unwrap(), vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn history_prefix_is_sent_exactly_once() {
    let core = Arc::new(StubCore::new(ToolRegistry::new()));
    let mut opts = options("conv-prefix");
    opts.history_prefix = Some("Earlier we discussed the build.".into());
    let agent = ConversationAgent::new(opts, core.clone());

    agent.send("first", "m1").unwrap().wait().await.unwrap();
    agent.send("second", "m2").unwrap().wait().await.unwrap();

    let calls = core.stream_calls();
    assert_eq!(
        calls[0].parts,
        vec![
            PartUnion::Text("Earlier we discussed the build.".into()),
            PartUnion::Text("first".into())
        ]
    );
    assert_eq!(calls[1].parts, vec![PartUnion::Text("second".into())]);
}

#[tokio::test]
async fn provider_failure_is_reported_then_finished() {
    let core = Arc::new(
        StubCore::new(ToolRegistry::new().with_tool(list_directory())).script(vec![
            tool_call("c1", "list_directory", json!({})),
            Step::Fail(ConvoyError::QuotaExhausted("daily quota exceeded".into())),
        ]),
    );
    let agent = ConversationAgent::new(options("conv-err"), core);
    let mut events = agent.subscribe();

    agent.send("hello", "m1").unwrap();
    let seen = collect_turn(&mut events, "m1").await;

    assert_eq!(kinds(&seen), vec!["start", "error", "finish"]);
    let UiPayload::Error(message) = &seen[1].payload else {
        panic!("expected an error event");
    };
    assert!(message.contains("daily quota exceeded"));
    assert!(message.contains("Status: 429"));
    assert!(message.contains(QUOTA_HINT));
    assert!(agent.protected_call_ids().is_empty());
}

#[tokio::test]
async fn failure_in_a_continuation_fails_the_turn() {
    let core = Arc::new(
        StubCore::new(ToolRegistry::new().with_tool(list_directory()))
            .script(vec![tool_call("c1", "list_directory", json!({})), finished()])
            .script(vec![Step::Fail(ConvoyError::Stream(
                "429 RESOURCE_EXHAUSTED quota".into(),
            ))]),
    );
    let agent = ConversationAgent::new(options("conv-cont-err"), core.clone());
    let mut events = agent.subscribe();

    let turn = agent.send("hello", "m1").unwrap();
    let seen = collect_turn(&mut events, "m1").await;

    let outcome = turn.wait().await.unwrap();
    assert!(
        matches!(&outcome, TurnOutcome::Failed { error } if error.contains("RESOURCE_EXHAUSTED")),
        "unexpected outcome: {outcome:?}"
    );
    let kinds = kinds(&seen);
    assert_eq!(&kinds[kinds.len() - 2..], &["error", "finish"]);
    assert_eq!(kinds.iter().filter(|k| **k == "error").count(), 1);
    assert!(matches!(seen.last().unwrap().payload, UiPayload::Finish(None)));
    assert_eq!(core.stream_calls().len(), 2);
}

#[tokio::test]
async fn bootstrap_failure_still_finishes_the_turn() {
    let agent = ConversationAgent::new(
        options("conv-boot"),
        Arc::new(StubCore::failing_initialize()),
    );
    let mut events = agent.subscribe();

    let turn = agent.send("hello", "m1").unwrap();
    let seen = collect_turn(&mut events, "m1").await;

    assert_eq!(kinds(&seen), vec!["error", "finish"]);
    assert!(matches!(turn.wait().await.unwrap(), TurnOutcome::Failed { .. }));
    assert!(agent.ready().await.is_err());
}

#[tokio::test]
async fn client_tools_run_outside_the_model_loop() {
    let core = Arc::new(StubCore::new(ToolRegistry::new().with_tool(list_directory())));
    let agent = ConversationAgent::new(options("conv-client"), core.clone());
    let mut events = agent.subscribe();

    let requests = vec![
        ToolCallRequest::new("u1", "list_directory", Default::default(), "p"),
        ToolCallRequest::new("u2", "list_directory", Default::default(), "p"),
    ];
    let responses = agent.invoke_client_tools("m9", requests).await.unwrap();

    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|r| r.error.is_none()));
    assert!(core.stream_calls().is_empty());

    let mut groups = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let UiPayload::ToolGroup(items) = event.payload {
            groups.push(items);
        }
    }
    // u1 is reported finished before u2 starts.
    let statuses: Vec<Vec<ToolCallStatus>> = groups
        .iter()
        .map(|items| items.iter().map(|i| i.status).collect())
        .collect();
    assert_eq!(
        statuses,
        vec![
            vec![ToolCallStatus::Executing],
            vec![ToolCallStatus::Success],
            vec![ToolCallStatus::Success, ToolCallStatus::Executing],
            vec![ToolCallStatus::Success, ToolCallStatus::Success],
        ]
    );
}

#[tokio::test]
async fn shutdown_rejects_further_messages() {
    let agent = ConversationAgent::new(
        options("conv-shutdown"),
        Arc::new(StubCore::new(ToolRegistry::new())),
    );
    agent.ready().await.unwrap();
    agent.shutdown();

    assert_eq!(agent.state(), AgentState::Stopped);
    assert!(matches!(agent.send("hi", "m1"), Err(ConvoyError::InvalidState(_))));
}

#[tokio::test]
async fn fallback_handler_is_registered_during_bootstrap() {
    let core = Arc::new(StubCore::new(ToolRegistry::new()));
    let agent = ConversationAgent::new(options("conv-fallback"), core.clone());
    agent.ready().await.unwrap();
    assert!(core.fallback.lock().unwrap().is_some());
}
