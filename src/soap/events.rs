//! Event service operations
//!
//! Subscription management and pull delivery over WS-BaseNotification.
//! Subscription references are materialized as per-subscription HTTP
//! endpoints under the owning device.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::events::{DeliveryMode, EventBroker, Subscription, TopicFilter};
use crate::events::message::{notification_message, onvif_topic};
use crate::registry::DeviceDescriptor;

use super::envelope::{parse_iso8601_duration, SoapRequest};

/// GetEventProperties response advertising the device's topic set
pub fn event_properties(device: &DeviceDescriptor) -> String {
    let topics: String = device
        .topics
        .iter()
        .map(|t| topic_set_entry(t))
        .collect();

    format!(
        r#"<tev:GetEventPropertiesResponse>
    <tev:TopicNamespaceLocation>http://www.onvif.org/onvif/ver10/topics/topicns.xml</tev:TopicNamespaceLocation>
    <wsnt:FixedTopicSet>true</wsnt:FixedTopicSet>
    <wstop:TopicSet xmlns:wstop="http://docs.oasis-open.org/wsn/t-1">
{topics}    </wstop:TopicSet>
    <wsnt:TopicExpressionDialect>http://www.onvif.org/ver10/tev/topicExpression/ConcreteSet</wsnt:TopicExpressionDialect>
    <tev:MessageContentFilterDialect>http://www.onvif.org/ver10/tev/messageContentFilter/ItemFilter</tev:MessageContentFilterDialect>
</tev:GetEventPropertiesResponse>"#,
    )
}

fn topic_set_entry(topic: &str) -> String {
    // "tns1:VideoSource/MotionAlarm" renders as nested topic elements
    let full = onvif_topic(topic);
    let path = full.strip_prefix("tns1:").unwrap_or(&full);
    let mut parts = path.split('/');

    match (parts.next(), parts.next()) {
        (Some(parent), Some(leaf)) => format!(
            "        <tns1:{parent}><{leaf} wstop:topic=\"true\"/></tns1:{parent}>\n"
        ),
        _ => format!("        <tns1:{path} wstop:topic=\"true\"/>\n"),
    }
}

/// Extract the requested topic filter from a Subscribe-family request
///
/// Expressions the device does not support are rejected later by the broker;
/// here we only collect them.
pub fn requested_filter(request: &SoapRequest) -> TopicFilter {
    let expressions: Vec<String> = request
        .field_all("TopicExpression")
        .iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();

    if expressions.is_empty() {
        TopicFilter::all()
    } else {
        TopicFilter::topics(expressions)
    }
}

/// Extract the requested lease from InitialTerminationTime / TerminationTime
pub fn requested_lease(request: &SoapRequest) -> Option<Duration> {
    request
        .field("InitialTerminationTime")
        .or_else(|| request.field("TerminationTime"))
        .and_then(parse_iso8601_duration)
}

/// CreatePullPointSubscription response
pub async fn create_pull_point(
    broker: &std::sync::Arc<EventBroker>,
    device: &DeviceDescriptor,
    request: &SoapRequest,
    base_url: &str,
) -> Result<String, ServiceError> {
    let sub = broker
        .subscribe(
            device.id,
            DeliveryMode::Pull,
            requested_filter(request),
            requested_lease(request),
        )
        .await?;

    Ok(subscription_response(
        "tev:CreatePullPointSubscriptionResponse",
        &sub,
        base_url,
    )
    .await)
}

/// Subscribe (push mode) response
///
/// The consumer reference address is mandatory and must be non-empty.
pub async fn subscribe_push(
    broker: &std::sync::Arc<EventBroker>,
    device: &DeviceDescriptor,
    request: &SoapRequest,
    base_url: &str,
) -> Result<String, ServiceError> {
    let address = request
        .field("Address")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| {
            ServiceError::InvalidRequest("missing ConsumerReference Address".into())
        })?;

    let sub = broker
        .subscribe(
            device.id,
            DeliveryMode::Push {
                address: address.to_string(),
            },
            requested_filter(request),
            requested_lease(request),
        )
        .await?;

    Ok(subscription_response("wsnt:SubscribeResponse", &sub, base_url).await)
}

async fn subscription_response(element: &str, sub: &Subscription, base_url: &str) -> String {
    let expiry = sub.state.lock().await.expires_at_utc;
    format!(
        r#"<{element}>
    <wsnt:SubscriptionReference>
        <wsa:Address>{address}</wsa:Address>
    </wsnt:SubscriptionReference>
    <wsnt:CurrentTime>{now}</wsnt:CurrentTime>
    <wsnt:TerminationTime>{expiry}</wsnt:TerminationTime>
</{element}>"#,
        address = subscription_url(base_url, sub.device_id, sub.id),
        now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        expiry = expiry.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    )
}

/// PullMessages response
///
/// An elapsed timeout with no events is a successful empty response.
pub async fn pull_messages(
    broker: &std::sync::Arc<EventBroker>,
    sub_id: Uuid,
    request: &SoapRequest,
) -> Result<String, ServiceError> {
    let timeout = request
        .field("Timeout")
        .and_then(parse_iso8601_duration)
        .unwrap_or(Duration::from_secs(1));
    let limit: usize = request
        .field("MessageLimit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    let batch = broker.pull(sub_id, timeout, limit).await?;

    let sub = broker
        .subscription(sub_id)
        .await
        .ok_or_else(|| ServiceError::NotFound("Subscription".into()))?;
    let expiry = sub.state.lock().await.expires_at_utc;

    let messages: String = batch
        .iter()
        .map(|event| format!("    {}\n", notification_message(event)))
        .collect();

    Ok(format!(
        r#"<tev:PullMessagesResponse>
    <tev:CurrentTime>{now}</tev:CurrentTime>
    <tev:TerminationTime>{expiry}</tev:TerminationTime>
{messages}</tev:PullMessagesResponse>"#,
        now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        expiry = expiry.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    ))
}

/// Renew response
pub async fn renew(
    broker: &std::sync::Arc<EventBroker>,
    sub_id: Uuid,
    request: &SoapRequest,
) -> Result<String, ServiceError> {
    let expiry = broker.renew(sub_id, requested_lease(request)).await?;

    Ok(format!(
        r#"<wsnt:RenewResponse>
    <wsnt:TerminationTime>{expiry}</wsnt:TerminationTime>
    <wsnt:CurrentTime>{now}</wsnt:CurrentTime>
</wsnt:RenewResponse>"#,
        expiry = expiry.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    ))
}

/// Unsubscribe response (idempotent)
pub async fn unsubscribe(broker: &std::sync::Arc<EventBroker>, sub_id: Uuid) -> String {
    broker.unsubscribe(sub_id).await;
    "<wsnt:UnsubscribeResponse/>".to_string()
}

/// Per-subscription endpoint URL embedded in subscription references
pub fn subscription_url(base_url: &str, device_id: Uuid, sub_id: Uuid) -> String {
    format!(
        "{}/onvif/{}/subscription/{}",
        base_url.trim_end_matches('/'),
        device_id,
        sub_id
    )
}
