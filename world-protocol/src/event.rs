//! Wire shapes for the three event families a world emits (spec §3): chat
//! messages, LLM streaming (SSE) events, and activity lifecycle events.
//!
//! These are plain serializable structs rather than a single `Value`-carrying
//! enum — unlike a generic graph-state protocol, every field here has a fixed
//! shape the whole system (bus, orchestrator, activity tracker) agrees on.

use serde::{Deserialize, Serialize};

/// `WorldMessageEvent` (spec §3): one message published on a world's `message` topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldMessageEvent {
    pub content: String,
    pub sender: String,
    pub timestamp: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
}

/// Event type of a `WorldSseEvent` (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SseEventType {
    Start,
    Chunk,
    End,
    Error,
    ToolError,
    ToolStart,
    ToolEnd,
}

/// Token usage carried on the terminal SSE event when the provider reports it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UsageWire {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// `WorldSSEEvent` (spec §3): one LLM-streaming event fanned out on a world's
/// `sse` topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldSseEvent {
    pub agent_name: String,
    #[serde(rename = "type")]
    pub kind: SseEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageWire>,
}

/// Event type of a `WorldActivityEvent` (spec §3 / §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityEventType {
    ResponseStart,
    ResponseEnd,
    Idle,
}

/// Global LLM queue status (spec §5), attached to every activity event.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queued: u32,
    pub running: u32,
    pub capacity: u32,
}

/// `WorldActivityEvent` (spec §3 / §4.2): a lifecycle transition of the
/// per-world Activity Tracker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldActivityEvent {
    #[serde(rename = "type")]
    pub kind: ActivityEventType,
    pub pending_operations: u32,
    pub activity_id: u64,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub active_sources: Vec<String>,
    pub queue: QueueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Tagged union of the three event families, for a transport that needs a
/// single envelope type (e.g. one SSE/WebSocket connection multiplexing all
/// three channels).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ProtocolEvent {
    Message(WorldMessageEvent),
    Sse(WorldSseEvent),
    Activity(WorldActivityEvent),
}

impl ProtocolEvent {
    /// Serializes this event to a JSON object (channel tag + payload, no envelope).
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
