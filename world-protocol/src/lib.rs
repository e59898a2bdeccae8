//! Wire protocol for Agent-World: the three event families a world emits
//! (chat messages, SSE streaming events, activity lifecycle events) plus the
//! envelope that stamps missing ids without overwriting caller-supplied ones.
//!
//! This crate has no dependency on `agent-world`; the runtime crate depends
//! on this one and builds these event structs directly.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::{
    ActivityEventType, ProtocolEvent, QueueStatus, SseEventType, UsageWire, WorldActivityEvent,
    WorldMessageEvent, WorldSseEvent,
};
