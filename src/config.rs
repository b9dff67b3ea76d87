//! Declarative device configuration
//!
//! Device definitions come from the embedding application as serde-friendly
//! structs (typically deserialized from JSON or YAML). Applying a set of
//! definitions reconciles the registry: new definitions are created, known
//! identifiers are updated in place, registered devices absent from the set
//! are removed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::{DeviceDescriptor, DeviceRegistry, RegistryError, StreamProfile};

/// One stream profile definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDefinition {
    /// Profile label ("main", "sub")
    pub label: String,
    /// Upstream source URL
    pub upstream_url: String,
    /// Optional codec/resolution hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// One virtual device definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Stable identifier; generated when omitted, so definitions meant to
    /// survive re-application should carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Display name
    pub name: String,
    /// Manufacturer override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Firmware version override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    /// Stream profiles
    #[serde(default)]
    pub streams: Vec<StreamDefinition>,
    /// Enabled event topics
    #[serde(default)]
    pub topics: Vec<String>,
}

impl DeviceDefinition {
    /// Materialize the definition into a registry descriptor
    pub fn into_descriptor(self) -> DeviceDescriptor {
        let mut descriptor = DeviceDescriptor::new(self.name);
        if let Some(id) = self.id {
            descriptor = descriptor.with_id(id);
        }
        if let Some(manufacturer) = self.manufacturer {
            descriptor.manufacturer = manufacturer;
        }
        if let Some(model) = self.model {
            descriptor.model = model;
        }
        if let Some(firmware) = self.firmware_version {
            descriptor.firmware_version = firmware;
        }
        for stream in self.streams {
            let mut profile = StreamProfile::new(stream.label, stream.upstream_url);
            if let Some(encoding) = stream.encoding {
                profile = profile.encoding_hint(encoding);
            }
            descriptor = descriptor.profile(profile);
        }
        for topic in self.topics {
            descriptor = descriptor.topic(topic);
        }
        descriptor
    }
}

/// Reconcile the registry against a full set of definitions
///
/// Removal events fired here drive subscription and stream-session teardown
/// in the components watching the registry.
pub async fn apply_definitions(
    registry: &DeviceRegistry,
    definitions: Vec<DeviceDefinition>,
) -> Result<Vec<Uuid>, RegistryError> {
    let mut applied = Vec::with_capacity(definitions.len());

    for definition in definitions {
        let descriptor = definition.into_descriptor();
        let id = descriptor.id;

        if registry.get(id).await.is_some() {
            registry.update(id, descriptor).await?;
        } else {
            registry.create(descriptor).await?;
        }
        applied.push(id);
    }

    let stale: Vec<Uuid> = registry
        .list()
        .await
        .iter()
        .map(|d| d.id)
        .filter(|id| !applied.contains(id))
        .collect();
    for id in stale {
        registry.delete(id).await?;
    }

    tracing::info!(devices = applied.len(), "Device definitions applied");
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(id: Uuid, name: &str) -> DeviceDefinition {
        DeviceDefinition {
            id: Some(id),
            name: name.into(),
            manufacturer: None,
            model: None,
            firmware_version: None,
            streams: vec![StreamDefinition {
                label: "main".into(),
                upstream_url: "rtsp://10.0.0.5:554/ch0".into(),
                encoding: None,
            }],
            topics: vec!["motion".into()],
        }
    }

    #[test]
    fn test_deserialize_minimal_definition() {
        let json = r#"{
            "name": "Porch",
            "streams": [{"label": "main", "upstream_url": "rtsp://10.0.0.5:554/ch0"}],
            "topics": ["motion"]
        }"#;
        let def: DeviceDefinition = serde_json::from_str(json).unwrap();
        let descriptor = def.into_descriptor();

        assert_eq!(descriptor.name, "Porch");
        assert_eq!(descriptor.manufacturer, "Virtual ONVIF");
        assert_eq!(descriptor.profiles.len(), 1);
        assert!(descriptor.has_topic("motion"));
    }

    #[tokio::test]
    async fn test_apply_creates_updates_and_removes() {
        let registry = DeviceRegistry::new();
        let keep = Uuid::new_v4();
        let drop_ = Uuid::new_v4();

        apply_definitions(
            &registry,
            vec![definition(keep, "Porch"), definition(drop_, "Garage")],
        )
        .await
        .unwrap();
        assert_eq!(registry.len().await, 2);

        // Second application renames one device and drops the other
        apply_definitions(&registry, vec![definition(keep, "Porch Renamed")])
            .await
            .unwrap();

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get(keep).await.unwrap().name, "Porch Renamed");
        assert!(registry.get(drop_).await.is_none());
    }

    #[tokio::test]
    async fn test_apply_preserves_created_at_on_update() {
        let registry = DeviceRegistry::new();
        let id = Uuid::new_v4();

        apply_definitions(&registry, vec![definition(id, "Porch")]).await.unwrap();
        let created_at = registry.get(id).await.unwrap().created_at;

        apply_definitions(&registry, vec![definition(id, "Porch 2")]).await.unwrap();
        assert_eq!(registry.get(id).await.unwrap().created_at, created_at);
    }
}
