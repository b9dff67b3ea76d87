//! Trigger ingress — external event injection
//!
//! Accepts stimuli from the embedding application (automation rules, test
//! harnesses) and turns them into published events. A trigger with a
//! duration schedules the opposite state after it elapses, so "motion for
//! five seconds" is a single call.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::events::{BrokerError, EventBroker, EventInstance, EventPayload};

/// Converts external triggers into published device events
#[derive(Clone)]
pub struct TriggerIngress {
    broker: Arc<EventBroker>,
}

impl TriggerIngress {
    /// Create a trigger ingress feeding the given broker
    pub fn new(broker: Arc<EventBroker>) -> Self {
        Self { broker }
    }

    /// Inject a trigger
    ///
    /// Validation (device exists, topic enabled) happens at publish time.
    /// When `duration` is given and the payload is a state that can be
    /// inverted, the reverting event is published automatically after it
    /// elapses; the revert is skipped if the device disappears in between.
    pub async fn submit(
        &self,
        device_id: Uuid,
        topic: &str,
        payload: EventPayload,
        duration: Option<Duration>,
    ) -> Result<Arc<EventInstance>, BrokerError> {
        let event = self.broker.publish(device_id, topic, payload.clone()).await?;

        if let Some(after) = duration {
            match payload.reverted() {
                Some(revert) => self.schedule_revert(device_id, topic.to_string(), revert, after),
                None => {
                    tracing::warn!(
                        device = %device_id,
                        topic = topic,
                        "Trigger duration ignored, payload has no inverse"
                    );
                }
            }
        }

        Ok(event)
    }

    fn schedule_revert(
        &self,
        device_id: Uuid,
        topic: String,
        payload: EventPayload,
        after: Duration,
    ) {
        let broker = Arc::clone(&self.broker);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            match broker.publish(device_id, &topic, payload).await {
                Ok(event) => {
                    tracing::debug!(device = %device_id, topic = %topic, seq = event.seq, "Trigger reverted");
                }
                Err(e) => {
                    tracing::debug!(device = %device_id, topic = %topic, error = %e, "Trigger revert skipped");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DeliveryMode, TopicFilter};
    use crate::registry::{DeviceDescriptor, DeviceRegistry};

    async fn setup() -> (Arc<EventBroker>, TriggerIngress, Uuid) {
        let registry = Arc::new(DeviceRegistry::new());
        let device = DeviceDescriptor::new("cam1").topic("motion");
        let id = device.id;
        registry.create(device).await.unwrap();

        let broker = EventBroker::new(registry);
        let trigger = TriggerIngress::new(Arc::clone(&broker));
        (broker, trigger, id)
    }

    #[tokio::test]
    async fn test_trigger_publishes_event() {
        let (broker, trigger, device) = setup().await;
        let sub = broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();

        trigger
            .submit(device, "motion", EventPayload::Boolean(true), None)
            .await
            .unwrap();

        let batch = broker.pull(sub.id, Duration::from_millis(100), 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, EventPayload::Boolean(true));
    }

    #[tokio::test]
    async fn test_duration_reverts_boolean_state() {
        let (broker, trigger, device) = setup().await;
        let sub = broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();

        trigger
            .submit(
                device,
                "motion",
                EventPayload::Boolean(true),
                Some(Duration::from_millis(30)),
            )
            .await
            .unwrap();

        let mut all = Vec::new();
        for _ in 0..2 {
            let batch = broker.pull(sub.id, Duration::from_secs(1), 10).await.unwrap();
            all.extend(batch);
            if all.len() >= 2 {
                break;
            }
        }

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].payload, EventPayload::Boolean(true));
        assert_eq!(all[1].payload, EventPayload::Boolean(false));
    }

    #[tokio::test]
    async fn test_property_payload_ignores_duration() {
        let (broker, trigger, device) = setup().await;
        let sub = broker
            .subscribe(device, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();

        trigger
            .submit(
                device,
                "motion",
                EventPayload::Property("zone-2".into()),
                Some(Duration::from_millis(10)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let batch = broker.pull(sub.id, Duration::from_millis(50), 10).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_topic_rejected() {
        let (_broker, trigger, device) = setup().await;
        let result = trigger
            .submit(device, "smoke", EventPayload::Boolean(true), None)
            .await;
        assert!(matches!(result, Err(BrokerError::InvalidTopic(_))));
    }
}
