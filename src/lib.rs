//! Virtual ONVIF camera emulator
//!
//! Presents any number of configurable virtual cameras to ONVIF clients:
//! WS-Discovery presence, SOAP device/media/event services, pull and push
//! event subscriptions, and a byte-level stream relay that hands clients a
//! working stream address backed by a real upstream source.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────────┐
//!   WS-Discovery ◄──── │ DiscoveryResponder│
//!   (udp 3702)         └────────┬─────────┘
//!                               │ reads / change events
//!                      ┌────────▼─────────┐
//!   SOAP (http) ◄───── │  DeviceRegistry  │ ────► RegistryEvent
//!   SoapDispatcher     └────────┬─────────┘        (broadcast)
//!        │                      │
//!        ├──────────► EventBroker (subscriptions, pull/push delivery)
//!        │                 ▲
//!        │                 │ publish
//!        │            TriggerIngress (external stimuli)
//!        │
//!        └──────────► StreamProxy (shared upstream relays)
//! ```
//!
//! The [`Emulator`] façade wires everything together; each component is also
//! usable on its own.
//!
//! # Example
//!
//! ```no_run
//! use onvif_emu::{Emulator, EmulatorConfig};
//! use onvif_emu::registry::{DeviceDescriptor, StreamProfile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let emulator = Emulator::new(EmulatorConfig::default());
//!
//!     let device = DeviceDescriptor::new("Porch")
//!         .profile(StreamProfile::new("main", "rtsp://10.0.0.5:554/ch0"))
//!         .topic("motion");
//!     emulator.registry().create(device).await?;
//!
//!     emulator.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod soap;
pub mod trigger;

pub use config::{apply_definitions, DeviceDefinition, StreamDefinition};
pub use error::{Result, ServiceError};
pub use events::{DeliveryMode, EventBroker, EventPayload, TopicFilter};
pub use proxy::{StreamProxy, SessionHealth};
pub use registry::{DeviceDescriptor, DeviceRegistry, StreamProfile};
pub use server::{Emulator, EmulatorConfig};
pub use soap::{AuthConfig, Credentials};
pub use trigger::TriggerIngress;
