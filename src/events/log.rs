//! Per-device append-only event log with bounded retention
//!
//! Events are fanned out to arbitrarily many subscriptions through cursors
//! into this log rather than per-subscription copies, which bounds memory
//! even when a pull subscription never polls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{futures::Notified, Mutex, Notify};
use uuid::Uuid;

use super::subscription::TopicFilter;

/// Payload of one event occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// Boolean condition state (motion active, door open, ...)
    Boolean(bool),
    /// Free-form property value
    Property(String),
}

impl EventPayload {
    /// Wire representation of the value ("true"/"false" or the raw string)
    pub fn value_string(&self) -> String {
        match self {
            EventPayload::Boolean(b) => b.to_string(),
            EventPayload::Property(s) => s.clone(),
        }
    }

    /// The payload a timed trigger reverts to after its duration elapses
    ///
    /// Only boolean conditions have a natural inverse; property values return
    /// `None` and are not auto-reverted.
    pub fn reverted(&self) -> Option<EventPayload> {
        match self {
            EventPayload::Boolean(b) => Some(EventPayload::Boolean(!b)),
            EventPayload::Property(_) => None,
        }
    }
}

/// One occurrence of a device condition
///
/// Immutable once created. The sequence number is monotonically increasing
/// per device and defines delivery order for every subscription on the
/// device.
#[derive(Debug, Clone)]
pub struct EventInstance {
    /// Per-device monotonic sequence number (starts at 1)
    pub seq: u64,
    /// Owning device
    pub device_id: Uuid,
    /// Short topic name ("motion", "tamper", ...)
    pub topic: String,
    /// Occurrence timestamp
    pub timestamp: DateTime<Utc>,
    /// Condition state or property value
    pub payload: EventPayload,
}

struct LogInner {
    entries: VecDeque<Arc<EventInstance>>,
    next_seq: u64,
}

/// Append-only event log for a single device
pub struct EventLog {
    inner: Mutex<LogInner>,
    notify: Notify,
    max_entries: usize,
}

impl EventLog {
    /// Create an empty log retaining at most `max_entries` events
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                entries: VecDeque::new(),
                next_seq: 1,
            }),
            notify: Notify::new(),
            max_entries,
        }
    }

    /// Append an event and wake all parked pull waiters
    pub async fn append(
        &self,
        device_id: Uuid,
        topic: impl Into<String>,
        payload: EventPayload,
    ) -> Arc<EventInstance> {
        let mut inner = self.inner.lock().await;

        let event = Arc::new(EventInstance {
            seq: inner.next_seq,
            device_id,
            topic: topic.into(),
            timestamp: Utc::now(),
            payload,
        });
        inner.next_seq += 1;
        inner.entries.push_back(Arc::clone(&event));

        while inner.entries.len() > self.max_entries {
            inner.entries.pop_front();
        }
        drop(inner);

        self.notify.notify_waiters();
        event
    }

    /// Collect events after `cursor` that match the filter, oldest first
    ///
    /// Returns the matching events (at most `max`) and the cursor value the
    /// caller should store. The cursor advances past non-matching events so a
    /// narrow filter does not rescan the log forever.
    pub async fn collect_after(
        &self,
        cursor: u64,
        filter: &TopicFilter,
        max: usize,
    ) -> (Vec<Arc<EventInstance>>, u64) {
        let inner = self.inner.lock().await;

        let mut batch = Vec::new();
        let mut new_cursor = cursor;

        for event in inner.entries.iter() {
            if event.seq <= cursor {
                continue;
            }
            if filter.matches(&event.topic) {
                if batch.len() == max {
                    break;
                }
                batch.push(Arc::clone(event));
            }
            new_cursor = event.seq;
        }

        (batch, new_cursor)
    }

    /// Highest sequence number assigned so far (0 if none)
    ///
    /// New subscriptions start their cursor here so they only observe events
    /// created after Subscribe.
    pub async fn last_seq(&self) -> u64 {
        self.inner.lock().await.next_seq - 1
    }

    /// Wait condition released on the next append
    ///
    /// The returned future must be enabled (polled) before re-checking the
    /// log, otherwise an append between check and park is lost.
    pub fn changed(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Wake all parked waiters without appending (used on teardown)
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }

    /// Drop retained events older than `age`
    pub async fn prune_older_than(&self, age: Duration) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::seconds(60));
        let mut inner = self.inner.lock().await;

        while inner
            .entries
            .front()
            .map(|e| e.timestamp < cutoff)
            .unwrap_or(false)
        {
            inner.entries.pop_front();
        }
    }

    /// Number of retained events
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Whether the log holds no retained events
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
