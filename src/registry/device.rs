//! Device descriptor and stream profile types

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One deliverable quality tier of a device
///
/// Owned exclusively by its [`DeviceDescriptor`]; profiles are never shared
/// across devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamProfile {
    /// Profile label (e.g. "main", "sub")
    pub label: String,
    /// Upstream source URL the relay connects to (rtsp/rtmp/http)
    pub upstream_url: String,
    /// Opaque codec/resolution hint, passed through and never interpreted
    pub encoding_hint: Option<String>,
}

impl StreamProfile {
    /// Create a new profile
    pub fn new(label: impl Into<String>, upstream_url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            upstream_url: upstream_url.into(),
            encoding_hint: None,
        }
    }

    /// Set the encoding hint
    pub fn encoding_hint(mut self, hint: impl Into<String>) -> Self {
        self.encoding_hint = Some(hint.into());
        self
    }

    /// Media profile token advertised on the wire ("Profile_main", ...)
    pub fn token(&self) -> String {
        format!("Profile_{}", self.label)
    }
}

/// Identity and capability record for one virtual camera
///
/// The identifier is immutable after creation; updates replace every other
/// field in place. Display names need not be unique.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// Stable unique identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Manufacturer string reported by GetDeviceInformation
    pub manufacturer: String,
    /// Model string
    pub model: String,
    /// Firmware version string
    pub firmware_version: String,
    /// Ordered list of stream profiles
    pub profiles: Vec<StreamProfile>,
    /// Enabled event topic names (e.g. "motion", "tamper")
    pub topics: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl DeviceDescriptor {
    /// Create a descriptor with a fresh identifier and default identity
    /// strings matching what the device reports when nothing is configured
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            manufacturer: "Virtual ONVIF".into(),
            model: "Virtual Camera".into(),
            firmware_version: "1.0.0".into(),
            profiles: Vec::new(),
            topics: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Use a caller-provided identifier instead of a generated one
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Add a stream profile
    pub fn profile(mut self, profile: StreamProfile) -> Self {
        self.profiles.push(profile);
        self
    }

    /// Enable an event topic
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        if !self.topics.contains(&topic) {
            self.topics.push(topic);
        }
        self
    }

    /// Set manufacturer/model/firmware in one go
    pub fn identity(
        mut self,
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        firmware_version: impl Into<String>,
    ) -> Self {
        self.manufacturer = manufacturer.into();
        self.model = model.into();
        self.firmware_version = firmware_version.into();
        self
    }

    /// Look up a profile by label
    pub fn find_profile(&self, label: &str) -> Option<&StreamProfile> {
        self.profiles.iter().find(|p| p.label == label)
    }

    /// Look up a profile by its wire token ("Profile_main" or bare label)
    pub fn find_profile_by_token(&self, token: &str) -> Option<&StreamProfile> {
        let label = token.strip_prefix("Profile_").unwrap_or(token);
        self.find_profile(label)
    }

    /// Whether the device has the given event topic enabled
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    /// WS-Discovery scopes advertised for this device
    pub fn scopes(&self) -> Vec<String> {
        vec![
            "onvif://www.onvif.org/location/unknown".into(),
            format!("onvif://www.onvif.org/name/{}", self.name.replace(' ', "_")),
            format!("onvif://www.onvif.org/hardware/{}", self.model.replace(' ', "_")),
            "onvif://www.onvif.org/Profile/Streaming".into(),
        ]
    }

    /// Endpoint reference address used in discovery messages
    pub fn endpoint_reference(&self) -> String {
        format!("urn:uuid:{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_token() {
        let profile = StreamProfile::new("main", "rtsp://10.0.0.5:554/ch0");
        assert_eq!(profile.token(), "Profile_main");
    }

    #[test]
    fn test_find_profile_by_token() {
        let device = DeviceDescriptor::new("Porch")
            .profile(StreamProfile::new("main", "rtsp://10.0.0.5:554/ch0"))
            .profile(StreamProfile::new("sub", "rtsp://10.0.0.5:554/ch1"));

        assert!(device.find_profile_by_token("Profile_sub").is_some());
        assert!(device.find_profile_by_token("sub").is_some());
        assert!(device.find_profile_by_token("Profile_missing").is_none());
    }

    #[test]
    fn test_topic_dedup() {
        let device = DeviceDescriptor::new("Porch").topic("motion").topic("motion");
        assert_eq!(device.topics.len(), 1);
        assert!(device.has_topic("motion"));
        assert!(!device.has_topic("tamper"));
    }

    #[test]
    fn test_scopes_include_name_and_hardware() {
        let device = DeviceDescriptor::new("Front Door").identity("Acme", "VC 100", "2.1");
        let scopes = device.scopes();

        assert!(scopes.iter().any(|s| s.ends_with("/name/Front_Door")));
        assert!(scopes.iter().any(|s| s.ends_with("/hardware/VC_100")));
    }
}
