//! Device registry — the authoritative table of virtual devices
//!
//! Every other component (discovery, SOAP services, event broker, stream
//! proxy) treats the registry as the single source of truth for device
//! identity and capability. Dependents never hold mutable references to a
//! descriptor; they look devices up by id and receive immutable `Arc`
//! snapshots, so a configuration update can never leave a stale aliased
//! device behind.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<DeviceRegistry>
//!                  ┌───────────────────────────┐
//!                  │ devices: HashMap<Uuid,    │
//!                  │   Arc<DeviceDescriptor>>  │
//!                  │ events: broadcast::Tx     │
//!                  └────────────┬──────────────┘
//!                               │ RegistryEvent
//!          ┌────────────────────┼────────────────────┐
//!          ▼                    ▼                    ▼
//!   [Discovery]           [Event Broker]       [Stream Proxy]
//!   hello/bye/announce    drop subscriptions   tear down sessions
//! ```
//!
//! Mutations are atomic with respect to concurrent readers: a reader either
//! sees the old descriptor or the new one, never a partial update.

pub mod device;
pub mod error;
pub mod store;

pub use device::{DeviceDescriptor, StreamProfile};
pub use error::RegistryError;
pub use store::{DeviceRegistry, RegistryEvent};
