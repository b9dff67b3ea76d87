//! Subscription state and topic filters

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::message::onvif_topic;

/// How events reach the subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Client polls with PullMessages
    Pull,
    /// Broker posts Notify envelopes to the consumer address
    Push {
        /// Consumer reference address, always non-empty
        address: String,
    },
}

/// Topic filter negotiated at Subscribe time
///
/// Expressions are matched against a device's short topic names, accepting
/// either the short name ("motion") or the full ONVIF topic string
/// ("tns1:VideoSource/MotionAlarm").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    expressions: Option<Vec<String>>,
}

impl TopicFilter {
    /// Match every topic
    pub fn all() -> Self {
        Self { expressions: None }
    }

    /// Match only the given expressions
    pub fn topics(expressions: Vec<String>) -> Self {
        Self {
            expressions: Some(expressions),
        }
    }

    /// Whether the filter admits the given short topic name
    pub fn matches(&self, topic: &str) -> bool {
        match &self.expressions {
            None => true,
            Some(exprs) => exprs
                .iter()
                .any(|expr| expr == topic || expr == &onvif_topic(topic)),
        }
    }

    /// The expressions, if the filter is restricted
    pub fn expressions(&self) -> Option<&[String]> {
        self.expressions.as_deref()
    }
}

/// Mutable per-subscription state, serialized behind one lock
#[derive(Debug)]
pub struct SubscriptionState {
    /// Monotonic expiry deadline
    pub expires_at: Instant,
    /// Wall-clock expiry reported in responses
    pub expires_at_utc: DateTime<Utc>,
    /// Last delivered sequence number
    pub cursor: u64,
    /// Consecutive push delivery failures
    pub consecutive_failures: u32,
}

/// A client's registration of interest in one device's events
///
/// Owned by the event broker; the registry holds no reference to it.
pub struct Subscription {
    /// Subscription identifier
    pub id: Uuid,
    /// Owning device
    pub device_id: Uuid,
    /// Delivery mode
    pub mode: DeliveryMode,
    /// Negotiated topic filter
    pub filter: TopicFilter,
    /// Mutable state (expiry, cursor, failure count)
    pub state: Mutex<SubscriptionState>,
    /// Cancelled on Unsubscribe, expiry, device removal or push failure;
    /// wakes and terminates any in-flight pull wait immediately
    pub cancel: CancellationToken,
}

impl Subscription {
    /// Create a subscription expiring after `lease` from now
    pub fn new(
        device_id: Uuid,
        mode: DeliveryMode,
        filter: TopicFilter,
        lease: std::time::Duration,
        cursor: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            mode,
            filter,
            state: Mutex::new(SubscriptionState {
                expires_at: Instant::now() + lease,
                expires_at_utc: Utc::now()
                    + chrono::Duration::from_std(lease)
                        .unwrap_or_else(|_| chrono::Duration::seconds(60)),
                cursor,
                consecutive_failures: 0,
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Whether the subscription's lease has elapsed
    pub async fn is_expired(&self) -> bool {
        self.state.lock().await.expires_at <= Instant::now()
    }

    /// Extend the lease to `lease` from now, returning the new wall-clock
    /// expiry. Never shortens an unexpired lease retroactively beyond now.
    pub async fn extend(&self, lease: std::time::Duration) -> DateTime<Utc> {
        let mut state = self.state.lock().await;
        state.expires_at = Instant::now() + lease;
        state.expires_at_utc = Utc::now()
            + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::seconds(60));
        state.expires_at_utc
    }

    /// Whether this is a push-mode subscription
    pub fn is_push(&self) -> bool {
        matches!(self.mode, DeliveryMode::Push { .. })
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_filter_all_matches_everything() {
        let filter = TopicFilter::all();
        assert!(filter.matches("motion"));
        assert!(filter.matches("anything"));
    }

    #[test]
    fn test_filter_accepts_short_and_onvif_names() {
        let filter = TopicFilter::topics(vec!["tns1:VideoSource/MotionAlarm".into()]);
        assert!(filter.matches("motion"));
        assert!(!filter.matches("tamper"));

        let filter = TopicFilter::topics(vec!["motion".into()]);
        assert!(filter.matches("motion"));
    }

    #[tokio::test]
    async fn test_expiry_and_renew() {
        let sub = Subscription::new(
            Uuid::new_v4(),
            DeliveryMode::Pull,
            TopicFilter::all(),
            Duration::from_millis(10),
            0,
        );

        assert!(!sub.is_expired().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sub.is_expired().await);

        sub.extend(Duration::from_secs(60)).await;
        assert!(!sub.is_expired().await);
    }
}
