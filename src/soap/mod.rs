//! SOAP service dispatcher
//!
//! The protocol-facing façade: parses envelope-wrapped requests, checks
//! credentials, routes operations to the registry, event broker and stream
//! proxy, and renders envelope-wrapped responses or faults. The dispatcher is
//! stateless; all state lives in the components it fronts.
//!
//! Per-device endpoints:
//!
//! - `/onvif/{device}/device_service` — GetDeviceInformation,
//!   GetCapabilities, GetServices, GetScopes, GetSystemDateAndTime
//! - `/onvif/{device}/media_service` — GetProfiles, GetStreamUri,
//!   GetSnapshotUri
//! - `/onvif/{device}/event_service` — GetEventProperties, Subscribe /
//!   CreatePullPointSubscription
//! - `/onvif/{device}/subscription/{sub}` — PullMessages, Renew, Unsubscribe
//!
//! Internal component errors are typed; they become standard fault envelopes
//! here and nowhere else.

pub mod auth;
pub mod device;
pub mod envelope;
pub mod events;
pub mod media;
pub mod server;

pub use auth::{AuthConfig, Credentials};
pub use envelope::{SoapRequest, UsernameToken};
pub use server::{SoapDispatcher, SoapServerConfig};
