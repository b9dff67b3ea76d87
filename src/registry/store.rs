//! Device registry implementation
//!
//! The central table of virtual devices. Mutations publish change events so
//! dependents (discovery responder, event broker, stream proxy) can react
//! without polling or holding references into the table.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::device::DeviceDescriptor;
use super::error::RegistryError;

/// Change notification published on every successful mutation
///
/// Carries the descriptor snapshot so consumers never need to re-read the
/// table (the device may already be gone by the time a `Removed` event is
/// handled).
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A device was inserted
    Created(Arc<DeviceDescriptor>),
    /// A device was updated in place
    Updated(Arc<DeviceDescriptor>),
    /// A device was deleted
    Removed(Arc<DeviceDescriptor>),
}

/// Authoritative in-memory table of device descriptors
///
/// Thread-safe via `RwLock`. Discovery probe handling and SOAP reads are
/// read-heavy and fully concurrent; mutations are serialized.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<Uuid, Arc<DeviceDescriptor>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            devices: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Insert a new device
    ///
    /// Fails with `Conflict` if the identifier is already present.
    pub async fn create(
        &self,
        descriptor: DeviceDescriptor,
    ) -> Result<Arc<DeviceDescriptor>, RegistryError> {
        let mut devices = self.devices.write().await;

        if devices.contains_key(&descriptor.id) {
            return Err(RegistryError::Conflict(descriptor.id));
        }

        let descriptor = Arc::new(descriptor);
        devices.insert(descriptor.id, Arc::clone(&descriptor));

        tracing::info!(
            device = %descriptor.id,
            name = %descriptor.name,
            profiles = descriptor.profiles.len(),
            "Device registered"
        );

        let _ = self.events.send(RegistryEvent::Created(Arc::clone(&descriptor)));
        Ok(descriptor)
    }

    /// Replace an existing device's descriptor in place
    ///
    /// The identifier and creation timestamp are preserved regardless of what
    /// the caller supplies; `updated_at` is bumped.
    pub async fn update(
        &self,
        id: Uuid,
        mut descriptor: DeviceDescriptor,
    ) -> Result<Arc<DeviceDescriptor>, RegistryError> {
        let mut devices = self.devices.write().await;

        let existing = devices.get(&id).ok_or(RegistryError::NotFound(id))?;
        descriptor.id = id;
        descriptor.created_at = existing.created_at;
        descriptor.updated_at = Utc::now();

        let descriptor = Arc::new(descriptor);
        devices.insert(id, Arc::clone(&descriptor));

        tracing::info!(device = %id, name = %descriptor.name, "Device updated");

        let _ = self.events.send(RegistryEvent::Updated(Arc::clone(&descriptor)));
        Ok(descriptor)
    }

    /// Delete a device
    ///
    /// Fails with `NotFound` if the identifier is absent. The `Removed` event
    /// drives teardown of subscriptions and stream sessions referencing the
    /// device.
    pub async fn delete(&self, id: Uuid) -> Result<Arc<DeviceDescriptor>, RegistryError> {
        let mut devices = self.devices.write().await;

        let descriptor = devices.remove(&id).ok_or(RegistryError::NotFound(id))?;

        tracing::info!(device = %id, name = %descriptor.name, "Device removed");

        let _ = self.events.send(RegistryEvent::Removed(Arc::clone(&descriptor)));
        Ok(descriptor)
    }

    /// Get a device snapshot by id
    pub async fn get(&self, id: Uuid) -> Option<Arc<DeviceDescriptor>> {
        self.devices.read().await.get(&id).cloned()
    }

    /// Snapshot of all devices
    pub async fn list(&self) -> Vec<Arc<DeviceDescriptor>> {
        self.devices.read().await.values().cloned().collect()
    }

    /// Number of registered devices
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamProfile;

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = DeviceRegistry::new();
        let device = DeviceDescriptor::new("cam1");
        let id = device.id;

        registry.create(device).await.unwrap();

        let found = registry.get(id).await.unwrap();
        assert_eq!(found.name, "cam1");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let registry = DeviceRegistry::new();
        let device = DeviceDescriptor::new("cam1");
        let dup = device.clone();

        registry.create(device).await.unwrap();
        let result = registry.create(dup).await;

        assert!(matches!(result, Err(RegistryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_not_found() {
        let registry = DeviceRegistry::new();
        let result = registry.delete(Uuid::new_v4()).await;

        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_preserves_identity() {
        let registry = DeviceRegistry::new();
        let device = DeviceDescriptor::new("cam1");
        let id = device.id;
        let created_at = device.created_at;

        registry.create(device).await.unwrap();

        let replacement = DeviceDescriptor::new("cam1-renamed")
            .profile(StreamProfile::new("main", "rtsp://10.0.0.9:554/ch0"));
        let updated = registry.update(id, replacement).await.unwrap();

        assert_eq!(updated.id, id);
        assert_eq!(updated.created_at, created_at);
        assert_eq!(updated.name, "cam1-renamed");
        assert!(updated.updated_at >= created_at);
    }

    #[tokio::test]
    async fn test_change_events() {
        let registry = DeviceRegistry::new();
        let mut events = registry.subscribe();

        let device = DeviceDescriptor::new("cam1");
        let id = device.id;

        registry.create(device).await.unwrap();
        registry.delete(id).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), RegistryEvent::Created(_)));
        match events.recv().await.unwrap() {
            RegistryEvent::Removed(d) => assert_eq!(d.id, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
