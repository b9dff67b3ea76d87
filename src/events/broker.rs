//! Event broker implementation
//!
//! Owns the subscription table and per-device event logs, validates topics
//! against the device registry, and runs the background expiry sweep and
//! push delivery tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::registry::DeviceRegistry;

use super::error::BrokerError;
use super::log::{EventInstance, EventLog, EventPayload};
use super::message::{notify_envelope, onvif_topic};
use super::subscription::{DeliveryMode, Subscription, TopicFilter};

/// Broker configuration options
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Maximum subscription lease; Subscribe/Renew never grant more than
    /// this from "now"
    pub max_lease: Duration,

    /// Lease granted when the client does not request a termination time
    pub default_lease: Duration,

    /// Interval of the expiry sweep task
    pub sweep_interval: Duration,

    /// Maximum events retained per device log
    pub retention_max_events: usize,

    /// Maximum age of retained events
    pub retention_age: Duration,

    /// Consecutive push delivery failures before a subscription is terminated
    pub push_failure_limit: u32,

    /// Queued events per push subscription before new ones are dropped
    pub push_queue_capacity: usize,

    /// Timeout for one push delivery attempt
    pub push_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_lease: Duration::from_secs(60),
            default_lease: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
            retention_max_events: 256,
            retention_age: Duration::from_secs(60),
            push_failure_limit: 3,
            push_queue_capacity: 64,
            push_timeout: Duration::from_secs(10),
        }
    }
}

impl BrokerConfig {
    /// Set the maximum lease duration
    pub fn max_lease(mut self, lease: Duration) -> Self {
        self.max_lease = lease;
        self
    }

    /// Set the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the per-device retention bounds
    pub fn retention(mut self, max_events: usize, max_age: Duration) -> Self {
        self.retention_max_events = max_events;
        self.retention_age = max_age;
        self
    }

    /// Set the push failure limit
    pub fn push_failure_limit(mut self, limit: u32) -> Self {
        self.push_failure_limit = limit;
        self
    }
}

/// Event subscription and delivery state machine
///
/// Topic legality is checked against the registry descriptor at both
/// Subscribe and publish time; the broker never caches device capability.
pub struct EventBroker {
    registry: Arc<DeviceRegistry>,
    config: BrokerConfig,
    logs: RwLock<HashMap<Uuid, Arc<EventLog>>>,
    subs: RwLock<HashMap<Uuid, Arc<Subscription>>>,
    push_queues: RwLock<HashMap<Uuid, mpsc::Sender<Arc<EventInstance>>>>,
    http: reqwest::Client,
}

impl EventBroker {
    /// Create a broker with default configuration
    pub fn new(registry: Arc<DeviceRegistry>) -> Arc<Self> {
        Self::with_config(registry, BrokerConfig::default())
    }

    /// Create a broker with custom configuration
    pub fn with_config(registry: Arc<DeviceRegistry>, config: BrokerConfig) -> Arc<Self> {
        Arc::new(Self {
            registry,
            config,
            logs: RwLock::new(HashMap::new()),
            subs: RwLock::new(HashMap::new()),
            push_queues: RwLock::new(HashMap::new()),
            http: reqwest::Client::new(),
        })
    }

    /// Get the broker configuration
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    async fn log_for(&self, device_id: Uuid) -> Arc<EventLog> {
        if let Some(log) = self.logs.read().await.get(&device_id) {
            return Arc::clone(log);
        }

        let mut logs = self.logs.write().await;
        Arc::clone(
            logs.entry(device_id)
                .or_insert_with(|| Arc::new(EventLog::new(self.config.retention_max_events))),
        )
    }

    /// Register interest in a device's events
    ///
    /// The lease is clamped to the configured maximum. The new subscription
    /// only observes events created after this call.
    pub async fn subscribe(
        self: &Arc<Self>,
        device_id: Uuid,
        mode: DeliveryMode,
        filter: TopicFilter,
        requested_lease: Option<Duration>,
    ) -> Result<Arc<Subscription>, BrokerError> {
        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or(BrokerError::DeviceNotFound(device_id))?;

        if let Some(exprs) = filter.expressions() {
            for expr in exprs {
                let supported = device
                    .topics
                    .iter()
                    .any(|t| expr == t || *expr == onvif_topic(t));
                if !supported {
                    return Err(BrokerError::InvalidTopic(expr.clone()));
                }
            }
        }

        let lease = requested_lease
            .unwrap_or(self.config.default_lease)
            .min(self.config.max_lease);

        let log = self.log_for(device_id).await;
        let cursor = log.last_seq().await;

        let sub = Arc::new(Subscription::new(device_id, mode, filter, lease, cursor));
        self.subs.write().await.insert(sub.id, Arc::clone(&sub));

        if sub.is_push() {
            let (tx, rx) = mpsc::channel(self.config.push_queue_capacity);
            self.push_queues.write().await.insert(sub.id, tx);
            self.spawn_push_task(Arc::clone(&sub), rx);
        }

        tracing::info!(
            subscription = %sub.id,
            device = %device_id,
            mode = ?sub.mode,
            lease_secs = lease.as_secs(),
            "Subscription created"
        );

        Ok(sub)
    }

    /// Extend a subscription's lease, never beyond the maximum from now
    pub async fn renew(
        &self,
        sub_id: Uuid,
        requested_lease: Option<Duration>,
    ) -> Result<DateTime<Utc>, BrokerError> {
        let sub = self
            .subscription(sub_id)
            .await
            .ok_or(BrokerError::SubscriptionNotFound(sub_id))?;

        if sub.is_expired().await {
            self.unsubscribe(sub_id).await;
            return Err(BrokerError::SubscriptionNotFound(sub_id));
        }

        let lease = requested_lease
            .unwrap_or(self.config.default_lease)
            .min(self.config.max_lease);
        let expiry = sub.extend(lease).await;

        tracing::debug!(subscription = %sub_id, lease_secs = lease.as_secs(), "Subscription renewed");
        Ok(expiry)
    }

    /// Terminate a subscription
    ///
    /// Idempotent: unsubscribing an unknown id succeeds, matching
    /// at-most-once client semantics. Wakes any in-flight pull wait.
    pub async fn unsubscribe(&self, sub_id: Uuid) {
        let removed = self.subs.write().await.remove(&sub_id);
        self.push_queues.write().await.remove(&sub_id);

        if let Some(sub) = removed {
            sub.cancel.cancel();
            tracing::info!(subscription = %sub_id, device = %sub.device_id, "Subscription terminated");
        }
    }

    /// Look up a live subscription
    pub async fn subscription(&self, sub_id: Uuid) -> Option<Arc<Subscription>> {
        self.subs.read().await.get(&sub_id).cloned()
    }

    /// Number of live subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.subs.read().await.len()
    }

    /// Wait for undelivered events matching the subscription's filter
    ///
    /// Blocks until at least one matching event exists, the timeout elapses
    /// (empty result, never an error) or the subscription is terminated.
    /// Events are returned in creation order, each exactly once per
    /// subscription.
    pub async fn pull(
        &self,
        sub_id: Uuid,
        timeout: Duration,
        max: usize,
    ) -> Result<Vec<Arc<EventInstance>>, BrokerError> {
        let sub = self
            .subscription(sub_id)
            .await
            .ok_or(BrokerError::SubscriptionNotFound(sub_id))?;

        if sub.is_expired().await {
            self.unsubscribe(sub_id).await;
            return Err(BrokerError::SubscriptionNotFound(sub_id));
        }
        if sub.is_push() {
            return Err(BrokerError::NotPullPoint(sub_id));
        }

        let log = self.log_for(sub.device_id).await;
        let deadline = Instant::now() + timeout;

        loop {
            // Register the waiter before inspecting the log so an append
            // between the check and the park is not lost.
            let mut notified = std::pin::pin!(log.changed());
            notified.as_mut().enable();

            let batch = {
                let mut state = sub.state.lock().await;
                let (batch, cursor) = log.collect_after(state.cursor, &sub.filter, max).await;
                state.cursor = cursor;
                batch
            };

            if !batch.is_empty() {
                return Ok(batch);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(Vec::new()),
                _ = sub.cancel.cancelled() => {
                    return Err(BrokerError::SubscriptionNotFound(sub_id));
                }
            }
        }
    }

    /// Create an event instance and deliver it
    ///
    /// Fails when the device is unknown or the topic is not enabled on it.
    pub async fn publish(
        &self,
        device_id: Uuid,
        topic: &str,
        payload: EventPayload,
    ) -> Result<Arc<EventInstance>, BrokerError> {
        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or(BrokerError::DeviceNotFound(device_id))?;

        if !device.has_topic(topic) {
            return Err(BrokerError::InvalidTopic(topic.to_string()));
        }

        let log = self.log_for(device_id).await;
        let event = log.append(device_id, topic, payload).await;

        tracing::debug!(
            device = %device_id,
            topic = topic,
            seq = event.seq,
            "Event published"
        );

        self.fan_out_push(&event).await;
        Ok(event)
    }

    async fn fan_out_push(&self, event: &Arc<EventInstance>) {
        let targets: Vec<(Uuid, mpsc::Sender<Arc<EventInstance>>)> = {
            let subs = self.subs.read().await;
            let queues = self.push_queues.read().await;
            subs.values()
                .filter(|s| s.device_id == event.device_id && s.filter.matches(&event.topic))
                .filter_map(|s| queues.get(&s.id).map(|tx| (s.id, tx.clone())))
                .collect()
        };

        for (sub_id, tx) in targets {
            if tx.try_send(Arc::clone(event)).is_err() {
                tracing::warn!(
                    subscription = %sub_id,
                    seq = event.seq,
                    "Push queue full, dropping event"
                );
            }
        }
    }

    fn spawn_push_task(
        self: &Arc<Self>,
        sub: Arc<Subscription>,
        mut rx: mpsc::Receiver<Arc<EventInstance>>,
    ) {
        let broker = Arc::clone(self);
        let address = match &sub.mode {
            DeliveryMode::Push { address } => address.clone(),
            DeliveryMode::Pull => return,
        };

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = sub.cancel.cancelled() => break,
                    ev = rx.recv() => match ev {
                        Some(ev) => ev,
                        None => break,
                    },
                };

                let body = notify_envelope(&event);
                let result = broker
                    .http
                    .post(&address)
                    .header("Content-Type", "application/soap+xml; charset=utf-8")
                    .header(
                        "SOAPAction",
                        "http://docs.oasis-open.org/wsn/bw-2/NotificationConsumer/Notify",
                    )
                    .timeout(broker.config.push_timeout)
                    .body(body)
                    .send()
                    .await;

                let delivered = matches!(&result, Ok(resp) if resp.status().is_success());
                if delivered {
                    let mut state = sub.state.lock().await;
                    state.consecutive_failures = 0;
                    if event.seq > state.cursor {
                        state.cursor = event.seq;
                    }
                    tracing::debug!(
                        subscription = %sub.id,
                        seq = event.seq,
                        "Event delivered to push consumer"
                    );
                } else {
                    let failures = {
                        let mut state = sub.state.lock().await;
                        state.consecutive_failures += 1;
                        state.consecutive_failures
                    };
                    tracing::warn!(
                        subscription = %sub.id,
                        consumer = %address,
                        failures = failures,
                        "Push delivery failed"
                    );
                    if failures >= broker.config.push_failure_limit {
                        tracing::warn!(
                            subscription = %sub.id,
                            "Terminating push subscription after repeated delivery failures"
                        );
                        broker.unsubscribe(sub.id).await;
                        break;
                    }
                }
            }

            tracing::debug!(subscription = %sub.id, "Push delivery task stopped");
        });
    }

    /// Terminate all subscriptions and drop the event log for a device
    ///
    /// Driven by registry `Removed` events; parked pulls are woken and fail
    /// with subscription-not-found.
    pub async fn remove_device(&self, device_id: Uuid) {
        let doomed: Vec<Uuid> = self
            .subs
            .read()
            .await
            .values()
            .filter(|s| s.device_id == device_id)
            .map(|s| s.id)
            .collect();

        for sub_id in doomed {
            self.unsubscribe(sub_id).await;
        }

        if let Some(log) = self.logs.write().await.remove(&device_id) {
            log.wake_all();
        }

        tracing::debug!(device = %device_id, "Event state removed for device");
    }

    /// Run the expiry sweep once
    ///
    /// Removes expired subscriptions and prunes logs to the retention age.
    /// Lock hold time is bounded: collection happens under the read lock,
    /// termination re-acquires per subscription.
    pub async fn sweep(&self) {
        let expired: Vec<Uuid> = {
            let subs = self.subs.read().await;
            let mut expired = Vec::new();
            for sub in subs.values() {
                if sub.is_expired().await {
                    expired.push(sub.id);
                }
            }
            expired
        };

        for sub_id in expired {
            tracing::info!(subscription = %sub_id, "Subscription expired");
            self.unsubscribe(sub_id).await;
        }

        let logs: Vec<Arc<EventLog>> = self.logs.read().await.values().cloned().collect();
        for log in logs {
            log.prune_older_than(self.config.retention_age).await;
        }
    }

    /// Spawn the background sweep task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweep_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let broker = Arc::clone(self);
        let interval = broker.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                broker.sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DeviceDescriptor, DeviceRegistry};

    async fn setup() -> (Arc<DeviceRegistry>, Arc<EventBroker>, Uuid) {
        let registry = Arc::new(DeviceRegistry::new());
        let device = DeviceDescriptor::new("cam1").topic("motion").topic("tamper");
        let id = device.id;
        registry.create(device).await.unwrap();

        let broker = EventBroker::new(Arc::clone(&registry));
        (registry, broker, id)
    }

    #[tokio::test]
    async fn test_pull_with_no_events_times_out_empty() {
        let (_registry, broker, device) = setup().await;

        let sub = broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();

        let batch = broker
            .pull(sub.id, Duration::from_millis(50), 10)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_events_delivered_in_order_exactly_once() {
        let (_registry, broker, device) = setup().await;

        let sub = broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();

        for i in 0..5 {
            broker
                .publish(device, "motion", EventPayload::Boolean(i % 2 == 0))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        while seen.len() < 5 {
            let batch = broker
                .pull(sub.id, Duration::from_millis(100), 2)
                .await
                .unwrap();
            if batch.is_empty() {
                break;
            }
            seen.extend(batch.iter().map(|e| e.seq));
        }

        assert_eq!(seen, vec![1, 2, 3, 4, 5]);

        // Nothing left
        let batch = broker
            .pull(sub.id, Duration::from_millis(50), 10)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_pull_is_woken_by_publish() {
        let (_registry, broker, device) = setup().await;

        let sub = broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();

        let puller = {
            let broker = Arc::clone(&broker);
            let sub_id = sub.id;
            tokio::spawn(async move { broker.pull(sub_id, Duration::from_secs(5), 10).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker
            .publish(device, "motion", EventPayload::Boolean(true))
            .await
            .unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(1), puller)
            .await
            .expect("pull should be woken")
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].topic, "motion");
    }

    #[tokio::test]
    async fn test_independent_subscriptions_get_full_copies() {
        let (_registry, broker, device) = setup().await;

        let sub_a = broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();
        let sub_b = broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();

        broker
            .publish(device, "motion", EventPayload::Boolean(true))
            .await
            .unwrap();

        let a = broker.pull(sub_a.id, Duration::from_millis(100), 10).await.unwrap();
        let b = broker.pull(sub_b.id, Duration::from_millis(100), 10).await.unwrap();

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].seq, b[0].seq);
    }

    #[tokio::test]
    async fn test_topic_filter_restricts_delivery() {
        let (_registry, broker, device) = setup().await;

        let sub = broker
            .subscribe(
                device,
                DeliveryMode::Pull,
                TopicFilter::topics(vec!["tns1:VideoSource/MotionAlarm".into()]),
                None,
            )
            .await
            .unwrap();

        broker.publish(device, "tamper", EventPayload::Boolean(true)).await.unwrap();
        broker.publish(device, "motion", EventPayload::Boolean(true)).await.unwrap();

        let batch = broker.pull(sub.id, Duration::from_millis(100), 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].topic, "motion");
    }

    #[tokio::test]
    async fn test_subscribe_unknown_topic_fails() {
        let (_registry, broker, device) = setup().await;

        let result = broker
            .subscribe(
                device,
                DeliveryMode::Pull,
                TopicFilter::topics(vec!["ptz".into()]),
                None,
            )
            .await;
        assert!(matches!(result, Err(BrokerError::InvalidTopic(_))));
    }

    #[tokio::test]
    async fn test_publish_unknown_topic_fails() {
        let (_registry, broker, device) = setup().await;

        let result = broker
            .publish(device, "smoke", EventPayload::Boolean(true))
            .await;
        assert!(matches!(result, Err(BrokerError::InvalidTopic(_))));
    }

    #[tokio::test]
    async fn test_lease_clamped_to_max() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = DeviceDescriptor::new("cam1").topic("motion");
        let id = device.id;
        registry.create(device).await.unwrap();

        let broker = EventBroker::with_config(
            registry,
            BrokerConfig::default().max_lease(Duration::from_millis(50)),
        );

        let sub = broker
            .subscribe(id, DeliveryMode::Pull, TopicFilter::all(), Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(sub.is_expired().await);
    }

    #[tokio::test]
    async fn test_renew_extends_and_expired_pull_fails() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = DeviceDescriptor::new("cam1").topic("motion");
        let id = device.id;
        registry.create(device).await.unwrap();

        let broker = EventBroker::with_config(
            registry,
            BrokerConfig::default().max_lease(Duration::from_millis(100)),
        );

        let sub = broker
            .subscribe(id, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();

        // Renew before expiry keeps the subscription alive
        tokio::time::sleep(Duration::from_millis(60)).await;
        broker.renew(sub.id, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let batch = broker.pull(sub.id, Duration::from_millis(10), 10).await.unwrap();
        assert!(batch.is_empty());

        // Let it lapse; pull now fails with not-found
        tokio::time::sleep(Duration::from_millis(120)).await;
        let result = broker.pull(sub.id, Duration::from_millis(10), 10).await;
        assert!(matches!(result, Err(BrokerError::SubscriptionNotFound(_))));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_cancels_pull() {
        let (_registry, broker, device) = setup().await;

        let sub = broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();

        let puller = {
            let broker = Arc::clone(&broker);
            let sub_id = sub.id;
            tokio::spawn(async move { broker.pull(sub_id, Duration::from_secs(5), 10).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.unsubscribe(sub.id).await;

        let result = tokio::time::timeout(Duration::from_secs(1), puller)
            .await
            .expect("pull should be cancelled")
            .unwrap();
        assert!(matches!(result, Err(BrokerError::SubscriptionNotFound(_))));

        // Second unsubscribe of the same id is a no-op, not an error
        broker.unsubscribe(sub.id).await;
        assert_eq!(broker.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_device_terminates_subscriptions() {
        let (_registry, broker, device) = setup().await;

        broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();
        broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();
        assert_eq!(broker.subscription_count().await, 2);

        broker.remove_device(device).await;
        assert_eq!(broker.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = DeviceDescriptor::new("cam1").topic("motion");
        let id = device.id;
        registry.create(device).await.unwrap();

        let broker = EventBroker::with_config(
            registry,
            BrokerConfig::default().max_lease(Duration::from_millis(10)),
        );

        broker
            .subscribe(id, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        broker.sweep().await;
        assert_eq!(broker.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_push_delivery_and_failure_termination() {
        use axum::routing::post;
        use std::sync::atomic::{AtomicU32, Ordering};

        let (_registry, broker, device) = setup().await;

        // Consumer that rejects every notification
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = Arc::clone(&hits);
        let app = axum::Router::new().route(
            "/notify",
            post(move || {
                let hits = Arc::clone(&hits_clone);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sub = broker
            .subscribe(
                device,
                DeliveryMode::Push {
                    address: format!("http://{}/notify", addr),
                },
                TopicFilter::all(),
                None,
            )
            .await
            .unwrap();

        for _ in 0..3 {
            broker
                .publish(device, "motion", EventPayload::Boolean(true))
                .await
                .unwrap();
        }

        // After push_failure_limit consecutive failures the subscription is gone
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if broker.subscription(sub.id).await.is_none() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("subscription should be terminated after repeated failures");

        assert!(hits.load(Ordering::SeqCst) >= 3);
    }
}
