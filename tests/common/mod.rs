#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use convoy::agent::{AgentOptions, UiEvent};
use convoy::core::{
    AgentCore, ConversationHistory, FallbackHandler, MemoryLoad, ToolExecutor,
};
use convoy::error::{ConvoyError, Result};
use convoy::models::ModelSelection;
use convoy::scheduler::{LocalScheduler, SchedulerEventSender, ToolScheduler};
use convoy::tools::ToolRegistry;
use convoy::types::{
    Content, FinishedInfo, ModelEventStream, PartUnion, StreamEvent, ToolArgs, ToolCallRequest,
    UsageMetadata,
};
use convoy::util::retry::StreamRetryPolicy;

type SchedulerFactory = Box<dyn Fn(SchedulerEventSender) -> Arc<dyn ToolScheduler> + Send + Sync>;

/// One step of a scripted model response.
pub enum Step {
    Event(StreamEvent),
    Fail(ConvoyError),
    /// Stop yielding without ending the stream.
    Hang,
}

/// A recorded `send_message_stream` call.
#[derive(Debug, Clone)]
pub struct StreamCall {
    pub parts: Vec<PartUnion>,
    pub prompt_id: String,
}

/// Agent-core double: scripted streams, a real tool registry, recorded history.
pub struct StubCore {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    registry: Arc<ToolRegistry>,
    pub calls: Mutex<Vec<StreamCall>>,
    pub history: Mutex<Vec<Content>>,
    pub memory_loads: AtomicUsize,
    pub fallback: Mutex<Option<FallbackHandler>>,
    fail_initialize: bool,
    scheduler: Option<SchedulerFactory>,
}

impl StubCore {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            registry: Arc::new(registry),
            calls: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            memory_loads: AtomicUsize::new(0),
            fallback: Mutex::new(None),
            fail_initialize: false,
            scheduler: None,
        }
    }

    pub fn failing_initialize() -> Self {
        Self {
            fail_initialize: true,
            ..Self::new(ToolRegistry::new())
        }
    }

    pub fn script(self, steps: Vec<Step>) -> Self {
        self.scripts.lock().unwrap().push_back(steps);
        self
    }

    /// Replace the default `LocalScheduler`.
    pub fn with_scheduler<F>(mut self, factory: F) -> Self
    where
        F: Fn(SchedulerEventSender) -> Arc<dyn ToolScheduler> + Send + Sync + 'static,
    {
        self.scheduler = Some(Box::new(factory));
        self
    }

    pub fn stream_calls(&self) -> Vec<StreamCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationHistory for StubCore {
    async fn add_history(&self, content: Content) -> Result<()> {
        self.history.lock().unwrap().push(content);
        Ok(())
    }
}

#[async_trait]
impl AgentCore for StubCore {
    fn session_id(&self) -> &str {
        "stub-session"
    }

    async fn initialize(&self) -> Result<()> {
        if self.fail_initialize {
            return Err(ConvoyError::Configuration("no tools available".into()));
        }
        Ok(())
    }

    async fn refresh_auth(&self, _auth_type: convoy::auth::AuthType) -> Result<()> {
        Ok(())
    }

    async fn load_memory(&self) -> Result<MemoryLoad> {
        self.memory_loads.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryLoad {
            memory_content: String::new(),
            file_count: 0,
        })
    }

    fn create_scheduler(&self, events: SchedulerEventSender) -> Arc<dyn ToolScheduler> {
        match &self.scheduler {
            Some(factory) => factory(events),
            None => Arc::new(LocalScheduler::new(Arc::clone(&self.registry), events)),
        }
    }

    async fn send_message_stream(
        &self,
        parts: Vec<PartUnion>,
        prompt_id: &str,
        _cancel: CancellationToken,
    ) -> Result<ModelEventStream> {
        let echo = parts.iter().rev().find_map(|part| match part {
            PartUnion::Text(text) => Some(text.clone()),
            PartUnion::Part(part) => part.text.clone(),
        });
        self.calls.lock().unwrap().push(StreamCall {
            parts,
            prompt_id: prompt_id.to_string(),
        });

        let steps = self.scripts.lock().unwrap().pop_front().unwrap_or_else(|| {
            vec![
                Step::Event(StreamEvent::Content(format!(
                    "echo: {}",
                    echo.unwrap_or_default()
                ))),
                finished(),
            ]
        });

        let mut items = Vec::new();
        let mut hang = false;
        for step in steps {
            match step {
                Step::Event(event) => items.push(Ok(event)),
                Step::Fail(err) => items.push(Err(err)),
                Step::Hang => {
                    hang = true;
                    break;
                }
            }
        }
        let stream = futures::stream::iter(items);
        if hang {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }

    fn set_fallback_handler(&self, handler: FallbackHandler) {
        *self.fallback.lock().unwrap() = Some(handler);
    }

    fn tool_executor(&self) -> Arc<dyn ToolExecutor> {
        Arc::clone(&self.registry) as Arc<dyn ToolExecutor>
    }
}

pub fn usage(total: u32) -> UsageMetadata {
    UsageMetadata {
        prompt_token_count: total / 2,
        candidates_token_count: total - total / 2,
        total_token_count: total,
        cached_content_token_count: 0,
    }
}

pub fn finished() -> Step {
    Step::Event(StreamEvent::Finished(FinishedInfo {
        reason: Some("STOP".into()),
        usage_metadata: Some(usage(10)),
    }))
}

pub fn content(text: &str) -> Step {
    Step::Event(StreamEvent::Content(text.into()))
}

pub fn tool_call(call_id: &str, name: &str, args: serde_json::Value) -> Step {
    Step::Event(StreamEvent::ToolCallRequest(ToolCallRequest::new(
        call_id,
        name,
        object(args),
        "stub-prompt",
    )))
}

pub fn object(value: serde_json::Value) -> ToolArgs {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn options(conversation_id: &str) -> AgentOptions {
    AgentOptions::builder()
        .conversation_id(conversation_id)
        .model(ModelSelection::new("gemini", "gemini-2.5-pro"))
        .retry(StreamRetryPolicy {
            max_retries: 2,
            delay_ms: 1000,
        })
        .build()
}

/// Collect events for one message until its `finish`.
pub async fn collect_turn(events: &mut broadcast::Receiver<UiEvent>, msg_id: &str) -> Vec<UiEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("turn did not finish")
            .expect("event channel closed");
        if event.msg_id != msg_id {
            continue;
        }
        let done = event.is_finish();
        seen.push(event);
        if done {
            return seen;
        }
    }
}

pub fn kinds(events: &[UiEvent]) -> Vec<&'static str> {
    events.iter().map(UiEvent::kind).collect()
}
