//! WS-Discovery responder — multicast presence
//!
//! Answers Probe messages on the discovery multicast group so clients find
//! the emulated devices without configuration, and announces lifecycle
//! transitions with Hello/Bye.
//!
//! # Architecture
//!
//! ```text
//!   239.255.255.250:3702 ──► responder loop ──┬─► ProbeMatch (unicast)
//!                                             │
//!   registry events ─────────────────────────►├─► Hello / Bye (multicast)
//!                                             │
//!   announce ticker ─────────────────────────►└─► periodic Hello
//! ```
//!
//! Duplicate probes (same sender and MessageID within a short window) are
//! answered once; multicast retransmission is expected, not an error.

pub mod message;
pub mod responder;

pub use message::{probe_matches, ProbeRequest};
pub use responder::{DiscoveryConfig, DiscoveryResponder};
