//! Activity Tracker: a refcounted "is-processing" lifecycle per
//! world that emits `response-start`/`response-end`/`idle` transitions.
//!
//! Grounded on the teacher's `graph::Runtime` builder-then-finish style and
//! its logging-on-lifecycle-transition convention (`log_graph_start`/
//! `log_graph_complete`).

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::bus::WorldBus;
use world_protocol::{ActivityEventType, QueueStatus, WorldActivityEvent};

/// Per-world refcounted lifecycle state.
pub struct ActivityTracker {
    bus: Arc<WorldBus>,
    pending_operations: AtomicU64,
    last_activity_id: AtomicU64,
    active_sources: Mutex<HashMap<String, u64>>,
    is_processing: AtomicBool,
}

impl ActivityTracker {
    pub fn new(bus: Arc<WorldBus>) -> Self {
        Self {
            bus,
            pending_operations: AtomicU64::new(0),
            last_activity_id: AtomicU64::new(0),
            active_sources: Mutex::new(HashMap::new()),
            is_processing: AtomicBool::new(false),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    pub fn pending_operations(&self) -> u64 {
        self.pending_operations.load(Ordering::SeqCst)
    }

    /// Opens an activity scope: increments the refcount, bumps
    /// `lastActivityId` only on the 0→1 transition, increments the
    /// per-source counter, and emits `response-start`. Returns a single-shot
    /// guard whose `end()` performs the matching release.
    pub async fn begin(
        self: &Arc<Self>,
        queue: QueueStatus,
        source: Option<String>,
        message_id: Option<String>,
    ) -> ActivityScope {
        let prev = self.pending_operations.fetch_add(1, Ordering::SeqCst);
        if prev == 0 {
            self.last_activity_id.fetch_add(1, Ordering::SeqCst);
            self.is_processing.store(true, Ordering::SeqCst);
        }
        if let Some(ref s) = source {
            let mut sources = self.active_sources.lock().await;
            *sources.entry(s.clone()).or_insert(0) += 1;
        }

        self.emit(ActivityEventType::ResponseStart, queue.clone(), source.clone(), message_id.clone())
            .await;

        ActivityScope {
            tracker: self.clone(),
            source,
            queue,
            message_id,
            released: false,
        }
    }

    /// Scoped-acquisition wrapper: guarantees
    /// `end()` runs even if `op` fails, and propagates the error.
    pub async fn track_activity<F, Fut, T, E>(
        self: &Arc<Self>,
        queue: QueueStatus,
        source: Option<String>,
        message_id: Option<String>,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut scope = self.begin(queue, source, message_id).await;
        let result = op().await;
        scope.end().await;
        result
    }

    async fn release(&self, source: Option<String>) -> bool {
        if let Some(ref s) = source {
            let mut sources = self.active_sources.lock().await;
            if let Some(count) = sources.get_mut(s) {
                *count -= 1;
                if *count == 0 {
                    sources.remove(s);
                }
            }
        }
        let remaining = self.pending_operations.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.is_processing.store(false, Ordering::SeqCst);
        }
        remaining == 0
    }

    async fn active_source_list(&self) -> Vec<String> {
        self.active_sources.lock().await.keys().cloned().collect()
    }

    async fn emit(
        &self,
        kind: ActivityEventType,
        queue: QueueStatus,
        source: Option<String>,
        message_id: Option<String>,
    ) {
        let event = WorldActivityEvent {
            kind,
            pending_operations: self.pending_operations.load(Ordering::SeqCst) as u32,
            activity_id: self.last_activity_id.load(Ordering::SeqCst),
            timestamp: Utc::now().to_rfc3339(),
            source,
            active_sources: self.active_source_list().await,
            queue,
            message_id,
        };
        self.bus.publish_activity_event(event).await;
    }
}

/// Single-shot guard returned by `ActivityTracker::begin`. Calling `end()`
/// more than once is a no-op, handled defensively rather than by making it
/// uncallable, since the guard must still be droppable without panicking.
pub struct ActivityScope {
    tracker: Arc<ActivityTracker>,
    source: Option<String>,
    queue: QueueStatus,
    message_id: Option<String>,
    released: bool,
}

impl ActivityScope {
    /// Releases this scope. On the refcount reaching 0, emits `idle` and
    /// clears `isProcessing`; otherwise emits `response-end`.
    pub async fn end(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let reached_zero = self.tracker.release(self.source.clone()).await;
        let kind = if reached_zero {
            ActivityEventType::Idle
        } else {
            ActivityEventType::ResponseEnd
        };
        self.tracker
            .emit(kind, self.queue.clone(), self.source.clone(), self.message_id.clone())
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusEvent, Topic};
    use std::sync::Mutex as StdMutex;

    fn queue() -> QueueStatus {
        QueueStatus {
            queued: 0,
            running: 1,
            capacity: 4,
        }
    }

    #[tokio::test]
    async fn begin_then_end_transitions_to_idle() {
        let bus = Arc::new(WorldBus::new());
        let events: Arc<StdMutex<Vec<ActivityEventType>>> = Arc::new(StdMutex::new(Vec::new()));
        let events_clone = events.clone();
        bus.subscribe(Topic::World, move |event| {
            let events = events_clone.clone();
            Box::pin(async move {
                if let BusEvent::Activity(a) = event {
                    events.lock().unwrap().push(a.kind);
                }
            })
        })
        .await;

        let tracker = Arc::new(ActivityTracker::new(bus));
        let mut scope = tracker.begin(queue(), Some("agent:alice".into()), None).await;
        assert!(tracker.is_processing());
        assert_eq!(tracker.pending_operations(), 1);
        scope.end().await;
        assert!(!tracker.is_processing());
        assert_eq!(tracker.pending_operations(), 0);

        let seen = events.lock().unwrap().clone();
        assert_eq!(seen, vec![ActivityEventType::ResponseStart, ActivityEventType::Idle]);
    }

    #[tokio::test]
    async fn nested_begins_emit_response_end_before_idle() {
        let bus = Arc::new(WorldBus::new());
        let tracker = Arc::new(ActivityTracker::new(bus));

        let mut outer = tracker.begin(queue(), Some("agent:alice".into()), None).await;
        let mut inner = tracker.begin(queue(), Some("agent:bob".into()), None).await;
        assert_eq!(tracker.pending_operations(), 2);

        inner.end().await;
        assert!(tracker.is_processing(), "still one pending operation");
        assert_eq!(tracker.pending_operations(), 1);

        outer.end().await;
        assert!(!tracker.is_processing());
    }

    #[tokio::test]
    async fn double_end_is_a_no_op() {
        let bus = Arc::new(WorldBus::new());
        let tracker = Arc::new(ActivityTracker::new(bus));
        let mut scope = tracker.begin(queue(), None, None).await;
        scope.end().await;
        scope.end().await;
        assert_eq!(tracker.pending_operations(), 0);
    }

    #[tokio::test]
    async fn track_activity_releases_scope_even_on_error() {
        let bus = Arc::new(WorldBus::new());
        let tracker = Arc::new(ActivityTracker::new(bus));
        let result: Result<(), &str> = tracker
            .track_activity(queue(), None, None, || async { Err("boom") })
            .await;
        assert!(result.is_err());
        assert_eq!(tracker.pending_operations(), 0);
        assert!(!tracker.is_processing());
    }
}
