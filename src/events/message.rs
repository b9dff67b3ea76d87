//! Event notification wire formats
//!
//! Renders the WS-BaseNotification message shapes clients expect: the
//! per-event `wsnt:NotificationMessage` fragment (shared by PullMessages
//! responses and push delivery) and the standalone `wsnt:Notify` envelope
//! posted to push consumers.

use super::log::EventInstance;

/// Map a short topic name onto the ONVIF topic string clients filter on
pub fn onvif_topic(topic: &str) -> String {
    match topic {
        "motion" => "tns1:VideoSource/MotionAlarm".into(),
        "door" => "tns1:Device/TriggerRelay".into(),
        "tamper" => "tns1:VideoSource/ImageTooBlurry".into(),
        other => format!("tns1:VideoSource/{}", other),
    }
}

/// One `wsnt:NotificationMessage` fragment for an event instance
pub fn notification_message(event: &EventInstance) -> String {
    let timestamp = event.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    format!(
        r#"<wsnt:NotificationMessage>
    <wsnt:Topic Dialect="http://www.onvif.org/ver10/tev/topicExpression/ConcreteSet">{topic}</wsnt:Topic>
    <wsnt:Message>
        <tt:Message UtcTime="{timestamp}" PropertyOperation="Changed">
            <tt:Source>
                <tt:SimpleItem Name="VideoSourceConfigurationToken" Value="VideoSource_1"/>
                <tt:SimpleItem Name="VideoSourceToken" Value="VideoSource_1"/>
            </tt:Source>
            <tt:Key>
                <tt:SimpleItem Name="ObjectId" Value="{device}"/>
            </tt:Key>
            <tt:Data>
                <tt:SimpleItem Name="State" Value="{value}"/>
            </tt:Data>
        </tt:Message>
    </wsnt:Message>
</wsnt:NotificationMessage>"#,
        topic = onvif_topic(&event.topic),
        timestamp = timestamp,
        device = event.device_id,
        value = event.payload.value_string(),
    )
}

/// Complete `wsnt:Notify` document posted to a push consumer
pub fn notify_envelope(event: &EventInstance) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<wsnt:Notify xmlns:wsnt="http://docs.oasis-open.org/wsn/b-2"
             xmlns:tns1="http://www.onvif.org/ver10/topics"
             xmlns:tt="http://www.onvif.org/ver10/schema">
{}
</wsnt:Notify>"#,
        notification_message(event)
    )
}
