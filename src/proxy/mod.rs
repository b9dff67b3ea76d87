//! Stream session proxy — shared upstream relays
//!
//! Maps client stream requests onto upstream stream endpoints. URI
//! resolution is cheap and stateless; the actual relay is lazy: one upstream
//! connection per device+profile, opened on first attach, shared by every
//! concurrent client through a `bytes::Bytes` broadcast channel (reference
//! counting, no copies), and torn down when the last attachment drops.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamProxy>
//!                  ┌────────────────────────────────┐
//!                  │ sessions: HashMap<SessionKey,  │
//!                  │   Arc<RelaySession> {          │
//!                  │     attached: AtomicU32,       │
//!                  │     data: broadcast::Tx<Bytes> │
//!                  │     health: watch::Tx          │
//!                  │   }                            │
//!                  └───────────────┬────────────────┘
//!                                  │
//!               [upstream TCP] ──► relay task ──► broadcast
//!                                  │                │
//!                            backoff reconnect   [client] [client]
//! ```
//!
//! Upstream failures reconnect with bounded exponential backoff; once the
//! budget is exhausted the session reports `UpstreamUnavailable` through its
//! health channel and removes itself, so a later resolve starts fresh. The
//! proxy never inspects stream content.

pub mod error;
pub mod proxy;
pub mod session;

pub use error::ProxyError;
pub use proxy::{ProxyConfig, StreamProxy};
pub use session::{RelayAttachment, SessionHealth, SessionKey};
