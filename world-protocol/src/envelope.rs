//! Envelope injection: fill in a missing `message_id` (and, for activity
//! events, a monotonic `activity_id`) without overwriting a value the caller
//! already set.
//!
//! Mirrors the "inject missing keys, never overwrite" discipline the wire
//! protocol needs to satisfy spec §4.1 (`publishMessage`/`publishSSE` stamp an
//! id only when the caller hasn't already supplied one) and §5(c) (activity
//! events are strictly monotonic in `activity_id` per world).

use serde_json::Value;

/// Fills in `message_id` on a JSON event object if and only if the key is
/// absent or null.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    pub message_id: Option<String>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Merges `message_id` into the given JSON object (top-level only). Does
    /// not overwrite an existing non-null value.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(map) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.message_id {
            let needs_fill = map
                .get("message_id")
                .map(|v| v.is_null())
                .unwrap_or(true);
            if needs_fill {
                map.insert("message_id".to_string(), Value::String(id.clone()));
            }
        }
    }
}

/// Per-world monotonic id allocator for `activity_id` (spec §5(c): "Activity
/// events are strictly monotonic per world in activityId").
#[derive(Debug, Default)]
pub struct EnvelopeState {
    next_activity_id: u64,
}

impl EnvelopeState {
    pub fn new() -> Self {
        Self { next_activity_id: 0 }
    }

    /// Allocates and returns the next `activity_id`, advancing the sequence.
    pub fn next_activity_id(&mut self) -> u64 {
        self.next_activity_id += 1;
        self.next_activity_id
    }
}

/// Converts a protocol event to JSON and fills in a missing `message_id`
/// using `envelope`. Returns the final value.
pub fn to_json(
    event: &crate::event::ProtocolEvent,
    envelope: &Envelope,
) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    envelope.inject_into(&mut value);
    Ok(value)
}
