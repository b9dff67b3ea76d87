//! Event broker — subscriptions and synthetic event delivery
//!
//! The broker owns topic-based subscriptions per device and the bounded
//! per-device event log they consume from. Externally injected triggers
//! become [`EventInstance`]s; pull subscriptions park on the log's wait
//! condition and replay matching events through a per-subscription cursor,
//! push subscriptions get their own delivery task posting `wsnt:Notify`
//! envelopes to the consumer address.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<EventBroker>
//!                 ┌────────────────────────────────┐
//!   publish() ──► │ logs: HashMap<Uuid, EventLog>  │
//!                 │ subs: HashMap<Uuid, Sub>       │
//!                 └───────┬──────────────┬─────────┘
//!                         │              │
//!                  notify_waiters   mpsc queue
//!                         │              │
//!                         ▼              ▼
//!                  [pull waiters]  [push delivery task]
//!                  PullMessages    reqwest POST Notify
//! ```
//!
//! The log is append-only with bounded retention; each subscription keeps its
//! own cursor, so one subscription's consumption never affects another's and
//! fan-out never copies events (`Arc` reference counting only).

pub mod broker;
pub mod error;
pub mod log;
pub mod message;
pub mod subscription;

pub use broker::{BrokerConfig, EventBroker};
pub use error::BrokerError;
pub use log::{EventInstance, EventLog, EventPayload};
pub use message::{notification_message, notify_envelope, onvif_topic};
pub use subscription::{DeliveryMode, Subscription, TopicFilter};
