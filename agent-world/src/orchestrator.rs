//! LLM Streaming Orchestrator: stream a provider response,
//! fan out SSE events, detect and execute tool calls, and loop until a
//! tool-free turn is produced or the iteration cap is hit.
//!
//! Grounded on the teacher's `graph::Runtime` turn loop (begin/step/end with
//! a guaranteed-release activity scope) and `stream::StreamWriter`'s
//! emit-as-you-go shape, generalized to the spec's provider-agnostic
//! `LlmClient::stream` and the tool round-trip it introduces.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use world_protocol::{QueueStatus, SseEventType, UsageWire, WorldSseEvent};

use crate::activity::ActivityTracker;
use crate::bus::WorldBus;
use crate::error::WorldError;
use crate::llm::{LlmClient, LlmRequest, LlmUsage, StreamChunk, ToolChoiceMode};
use crate::message::{AgentMessage, Role, ToolCall};
use crate::tools::{ToolCallContext, ToolExecutor};
use crate::util::{determine_sender_type, SenderType};

const DEFAULT_TOOL_ITERATION_CAP: u32 = 8;
const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Everything `stream_agent_response` needs about the agent and the turn it
/// is driving, decoupled from `RuntimeWorld`/`WorldManager` so this module
/// never depends on `world.rs` (only the reverse).
pub struct StreamAgentRequest {
    pub agent_id: String,
    pub agent_name: String,
    pub chat_id: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    /// The last N memory entries, oldest first, including the current turn.
    pub history: Vec<AgentMessage>,
    /// Sender of the message that triggered this turn.
    pub trigger_sender: String,
    pub client: Arc<dyn LlmClient>,
    pub tool_executor: Arc<ToolExecutor>,
    pub bus: Arc<WorldBus>,
    pub activity: Arc<ActivityTracker>,
    /// Aborts this turn when canceled: stops stream consumption, emits
    /// `sse{type:error, error:"canceled"}`, and is threaded into tool
    /// execution so long-running tools can honor it too (spec §5).
    pub cancellation: CancellationToken,
}

/// A message to publish back into the world bus once the turn is done
/// (either the agent's own reply, or the pass-command substitute).
#[derive(Clone, Debug)]
pub struct PublishIntent {
    pub content: String,
    pub sender: String,
}

pub struct StreamAgentOutcome {
    pub assistant_message: AgentMessage,
    pub publish: Option<PublishIntent>,
    pub usage: Option<LlmUsage>,
}

/// Process-wide semaphore over concurrent provider calls.
pub struct LlmQueue {
    semaphore: Arc<Semaphore>,
    capacity: u32,
    queued: AtomicU32,
    running: AtomicU32,
}

impl LlmQueue {
    pub fn new(capacity: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            queued: AtomicU32::new(0),
            running: AtomicU32::new(0),
        }
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            queued: self.queued.load(Ordering::SeqCst),
            running: self.running.load(Ordering::SeqCst),
            capacity: self.capacity,
        }
    }

    /// Waits for a slot, tracking `queued` while waiting and `running` while held.
    async fn acquire(&self) -> LlmQueueGuard {
        self.queued.fetch_add(1, Ordering::SeqCst);
        let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore never closed");
        self.queued.fetch_sub(1, Ordering::SeqCst);
        self.running.fetch_add(1, Ordering::SeqCst);
        LlmQueueGuard {
            _permit: permit,
            running: &self.running,
        }
    }
}

struct LlmQueueGuard<'a> {
    _permit: tokio::sync::OwnedSemaphorePermit,
    running: &'a AtomicU32,
}

impl Drop for LlmQueueGuard<'_> {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Case-insensitive check for the literal pass-command tag: hand
/// rolled rather than reaching for `regex`, matching this crate's existing
/// mention-parsing style (`util::extract_mentions`).
fn contains_pass_command(content: &str) -> bool {
    content.to_lowercase().contains("<world>pass</world>")
}

fn contains_mention_of(content: &str, name: &str) -> bool {
    let needle = format!("@{}", name.to_lowercase());
    content.to_lowercase().contains(&needle)
}

pub struct Orchestrator {
    queue: LlmQueue,
    tool_iteration_cap: u32,
    history_window: usize,
}

impl Orchestrator {
    pub fn new(queue_capacity: u32) -> Self {
        Self {
            queue: LlmQueue::new(queue_capacity),
            tool_iteration_cap: DEFAULT_TOOL_ITERATION_CAP,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_tool_iteration_cap(mut self, cap: u32) -> Self {
        self.tool_iteration_cap = cap;
        self
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Drives one full agent turn: composes the prompt, opens an activity
    /// scope, streams the provider response, round-trips tool calls, and
    /// guarantees the activity scope is released on every exit path (spec
    /// §4.5 step 8).
    pub async fn stream_agent_response(&self, request: StreamAgentRequest) -> Result<StreamAgentOutcome, WorldError> {
        let activity = request.activity.clone();
        let mut scope = activity
            .begin(self.queue.status(), Some(format!("agent:{}", request.agent_id)), None)
            .await;

        let result = self.run_turn(&request).await;

        scope.end().await;
        result
    }

    async fn run_turn(&self, request: &StreamAgentRequest) -> Result<StreamAgentOutcome, WorldError> {
        let mut conversation = Vec::new();
        if let Some(system_prompt) = &request.system_prompt {
            conversation.push(AgentMessage::system(system_prompt.clone()));
        }
        let start = request.history.len().saturating_sub(self.history_window);
        conversation.extend(request.history[start..].iter().cloned());

        let tool_specs = request.tool_executor.specs();
        let tool_choice = if tool_specs.is_empty() {
            ToolChoiceMode::None
        } else {
            ToolChoiceMode::Auto
        };

        for _ in 0..self.tool_iteration_cap {
            if request.cancellation.is_cancelled() {
                return self.canceled(request, Uuid::new_v4().to_string()).await;
            }

            let message_id = Uuid::new_v4().to_string();
            request
                .bus
                .publish_sse_event(WorldSseEvent {
                    agent_name: request.agent_id.clone(),
                    kind: SseEventType::Start,
                    content: None,
                    error: None,
                    message_id: message_id.clone(),
                    usage: None,
                })
                .await;

            let llm_request = LlmRequest {
                messages: conversation.clone(),
                model: request.model.clone(),
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                tool_choice: tool_choice.clone(),
            };

            let _permit = self.queue.acquire().await;
            let (tx, mut rx) = mpsc::channel(32);
            let stream_task = request.client.stream(&llm_request, tx);

            let mut accumulated_text = String::new();
            let mut tool_deltas: HashMap<usize, (Option<String>, Option<String>, String)> = HashMap::new();
            let mut usage = None;

            let drain = async {
                while let Some(chunk) = rx.recv().await {
                    match chunk {
                        StreamChunk::TextDelta(delta) => {
                            accumulated_text.push_str(&delta);
                            request
                                .bus
                                .publish_sse_event(WorldSseEvent {
                                    agent_name: request.agent_id.clone(),
                                    kind: SseEventType::Chunk,
                                    content: Some(delta),
                                    error: None,
                                    message_id: message_id.clone(),
                                    usage: None,
                                })
                                .await;
                        }
                        StreamChunk::ToolCallDelta(delta) => {
                            let entry = tool_deltas.entry(delta.index).or_insert((None, None, String::new()));
                            if delta.id.is_some() {
                                entry.0 = delta.id;
                            }
                            if delta.name.is_some() {
                                entry.1 = delta.name;
                            }
                            entry.2.push_str(&delta.arguments_delta);
                        }
                        StreamChunk::Usage(u) => usage = Some(u),
                    }
                }
            };
            let joined = async { tokio::join!(stream_task, drain).0 };
            tokio::pin!(joined);
            let response = tokio::select! {
                biased;
                _ = request.cancellation.cancelled() => {
                    return self.canceled(request, message_id).await;
                }
                stream_result = &mut joined => match stream_result {
                    Ok(response) => response,
                    Err(err) => {
                        request
                            .bus
                            .publish_sse_event(WorldSseEvent {
                                agent_name: request.agent_id.clone(),
                                kind: SseEventType::Error,
                                content: None,
                                error: Some(err.to_string()),
                                message_id: message_id.clone(),
                                usage: None,
                            })
                            .await;
                        return Err(err);
                    }
                },
            };
            if usage.is_none() {
                usage = response.usage.clone();
            }

            // Providers return the fully assembled tool calls in the terminal
            // `LlmResponse` even when streaming; `tool_deltas` above exists
            // only to let callers observe incremental deltas via `StreamChunk`.
            let _ = &tool_deltas;
            let tool_calls: Vec<ToolCall> = response.tool_calls.clone();

            if tool_calls.is_empty() {
                let usage_wire = usage.clone().map(to_usage_wire);
                request
                    .bus
                    .publish_sse_event(WorldSseEvent {
                        agent_name: request.agent_id.clone(),
                        kind: SseEventType::End,
                        content: None,
                        error: None,
                        message_id: message_id.clone(),
                        usage: usage_wire,
                    })
                    .await;

                let content = if accumulated_text.is_empty() { response.content } else { accumulated_text };
                return Ok(self.finalize(request, content, usage));
            }

            let ctx = ToolCallContext {
                chat_id: request.chat_id.clone(),
                agent_id: Some(request.agent_id.clone()),
                cancellation: request.cancellation.clone(),
            };
            let (valid_calls, mut tool_messages) = request.tool_executor.validate(&tool_calls);
            for invalid in tool_calls.iter().filter(|c| c.name.trim().is_empty()) {
                request
                    .bus
                    .publish_sse_event(WorldSseEvent {
                        agent_name: request.agent_id.clone(),
                        kind: SseEventType::ToolError,
                        content: Some(format!("empty tool name from LLM (call id {})", invalid.id)),
                        error: Some("empty tool name from LLM".to_string()),
                        message_id: message_id.clone(),
                        usage: None,
                    })
                    .await;
            }

            for call in &valid_calls {
                if request.cancellation.is_cancelled() {
                    return self.canceled(request, message_id).await;
                }
                request
                    .bus
                    .publish_sse_event(WorldSseEvent {
                        agent_name: request.agent_id.clone(),
                        kind: SseEventType::ToolStart,
                        content: Some(call.name.clone()),
                        error: None,
                        message_id: message_id.clone(),
                        usage: None,
                    })
                    .await;
                let result = request.tool_executor.execute(call, &ctx).await;
                request
                    .bus
                    .publish_sse_event(WorldSseEvent {
                        agent_name: request.agent_id.clone(),
                        kind: SseEventType::ToolEnd,
                        content: Some(call.name.clone()),
                        error: None,
                        message_id: message_id.clone(),
                        usage: None,
                    })
                    .await;
                tool_messages.push(result);
            }

            let mut assistant_with_calls = AgentMessage::assistant(accumulated_text, request.agent_id.clone());
            assistant_with_calls.tool_calls = tool_calls;
            conversation.push(assistant_with_calls);
            conversation.extend(tool_messages);
        }

        request
            .bus
            .publish_sse_event(WorldSseEvent {
                agent_name: request.agent_id.clone(),
                kind: SseEventType::Error,
                content: None,
                error: Some("tool-call loop exceeded".to_string()),
                message_id: Uuid::new_v4().to_string(),
                usage: None,
            })
            .await;

        let last_content = conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(self.finalize(request, last_content, None))
    }

    /// Emits `sse{type:error, error:"canceled"}` for a turn aborted via
    /// `request.cancellation` and unwinds with `WorldError::Canceled`; the
    /// activity scope is released by `stream_agent_response`'s caller on
    /// every exit path, including this one (spec §5).
    async fn canceled(&self, request: &StreamAgentRequest, message_id: String) -> Result<StreamAgentOutcome, WorldError> {
        request
            .bus
            .publish_sse_event(WorldSseEvent {
                agent_name: request.agent_id.clone(),
                kind: SseEventType::Error,
                content: None,
                error: Some("canceled".to_string()),
                message_id,
                usage: None,
            })
            .await;
        Err(WorldError::Canceled)
    }

    /// Applies the pass-command substitution and auto @-prefix rules (spec
    /// §6) to the final assistant text and decides what gets published.
    fn finalize(&self, request: &StreamAgentRequest, content: String, usage: Option<LlmUsage>) -> StreamAgentOutcome {
        let assistant_message = AgentMessage::assistant(content.clone(), request.agent_id.clone());

        if contains_pass_command(&content) {
            return StreamAgentOutcome {
                assistant_message,
                publish: Some(PublishIntent {
                    content: format!("@human {} is passing control to you", request.agent_id),
                    sender: "system".to_string(),
                }),
                usage,
            };
        }

        let trigger_is_agent = matches!(determine_sender_type(&request.trigger_sender), SenderType::Agent);
        let published_content = if trigger_is_agent && !contains_mention_of(&content, &request.trigger_sender) {
            format!("@{} {}", request.trigger_sender, content)
        } else {
            content
        };

        StreamAgentOutcome {
            assistant_message,
            publish: Some(PublishIntent {
                content: published_content,
                sender: request.agent_id.clone(),
            }),
            usage,
        }
    }
}

fn to_usage_wire(usage: LlmUsage) -> UsageWire {
    UsageWire {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusEvent, Topic};
    use crate::llm::MockLlmClient;
    use crate::tools::hitl::AutoTimeoutResponder;
    use crate::tools::ToolExecutor;

    fn test_request(bus: Arc<WorldBus>, activity: Arc<ActivityTracker>, client: Arc<dyn LlmClient>) -> StreamAgentRequest {
        StreamAgentRequest {
            agent_id: "alice".to_string(),
            agent_name: "alice".to_string(),
            chat_id: Some("chat-1".to_string()),
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            max_tokens: None,
            system_prompt: Some("be helpful".to_string()),
            history: vec![AgentMessage::user("hello", "human")],
            trigger_sender: "human".to_string(),
            client,
            tool_executor: Arc::new(ToolExecutor::new(Arc::new(AutoTimeoutResponder))),
            bus,
            activity,
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn text_only_turn_publishes_and_releases_activity() {
        let bus = Arc::new(WorldBus::new());
        let activity = Arc::new(ActivityTracker::new(bus.clone()));
        let client: Arc<dyn LlmClient> = Arc::new(MockLlmClient::fixed("hi there"));
        let orchestrator = Orchestrator::new(4);

        let outcome = orchestrator
            .stream_agent_response(test_request(bus, activity.clone(), client))
            .await
            .unwrap();

        assert_eq!(outcome.assistant_message.content, "hi there");
        assert!(!activity.is_processing());
    }

    #[tokio::test]
    async fn canceled_before_start_emits_error_sse_and_releases_activity() {
        let bus = Arc::new(WorldBus::new());
        let activity = Arc::new(ActivityTracker::new(bus.clone()));
        let errors = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        bus.subscribe(Topic::Sse, move |event| {
            let errors = errors_clone.clone();
            Box::pin(async move {
                if let BusEvent::Sse(e) = event {
                    if e.kind == SseEventType::Error {
                        errors.lock().await.push(e.error);
                    }
                }
            })
        })
        .await;

        let client: Arc<dyn LlmClient> = Arc::new(MockLlmClient::fixed("should not be reached"));
        let orchestrator = Orchestrator::new(4);
        let mut request = test_request(bus, activity.clone(), client);
        request.cancellation.cancel();

        let result = orchestrator.stream_agent_response(request).await;

        assert!(matches!(result, Err(WorldError::Canceled)));
        assert!(!activity.is_processing());
        assert_eq!(errors.lock().await.clone(), vec![Some("canceled".to_string())]);
    }

    #[tokio::test]
    async fn pass_command_suppresses_reply_and_publishes_system_message() {
        let bus = Arc::new(WorldBus::new());
        let activity = Arc::new(ActivityTracker::new(bus.clone()));
        let client: Arc<dyn LlmClient> = Arc::new(MockLlmClient::fixed("I think <world>pass</world> is right."));
        let orchestrator = Orchestrator::new(4);

        let outcome = orchestrator
            .stream_agent_response(test_request(bus, activity, client))
            .await
            .unwrap();

        let publish = outcome.publish.unwrap();
        assert_eq!(publish.sender, "system");
        assert!(publish.content.contains("alice is passing control to you"));
    }

    #[tokio::test]
    async fn reply_to_agent_gets_auto_mention_prefix() {
        let bus = Arc::new(WorldBus::new());
        let activity = Arc::new(ActivityTracker::new(bus.clone()));
        let client: Arc<dyn LlmClient> = Arc::new(MockLlmClient::fixed("sounds good"));
        let orchestrator = Orchestrator::new(4);

        let mut request = test_request(bus, activity, client);
        request.trigger_sender = "bob".to_string();

        let outcome = orchestrator.stream_agent_response(request).await.unwrap();
        assert_eq!(outcome.publish.unwrap().content, "@bob sounds good");
    }
}
