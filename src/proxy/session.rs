//! Relay session types
//!
//! A relay session binds one upstream connection to any number of attached
//! clients. Attachments are RAII guards: dropping the last one cancels the
//! relay task and removes the session from the proxy table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a relay session (device + profile label)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Device identifier
    pub device_id: Uuid,
    /// Profile label (e.g. "main")
    pub profile: String,
}

impl SessionKey {
    /// Create a new session key
    pub fn new(device_id: Uuid, profile: impl Into<String>) -> Self {
        Self {
            device_id,
            profile: profile.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.device_id, self.profile)
    }
}

/// Upstream connection state observed by attached clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionHealth {
    /// Connecting or reconnecting to the upstream
    Connecting,
    /// Upstream connected, bytes flowing
    Active,
    /// Reconnect budget exhausted; attached clients should give up
    Failed,
    /// Session torn down (last detach or device removal)
    Closed,
}

/// Shared state of one relay session
pub struct RelaySession {
    /// Session identity
    pub key: SessionKey,
    pub(super) attached: AtomicU32,
    pub(super) data_tx: broadcast::Sender<Bytes>,
    pub(super) health_rx: watch::Receiver<SessionHealth>,
    pub(super) cancel: CancellationToken,
}

impl RelaySession {
    /// Number of currently attached clients
    pub fn attached(&self) -> u32 {
        self.attached.load(Ordering::Acquire)
    }

    /// Current health
    pub fn health(&self) -> SessionHealth {
        *self.health_rx.borrow()
    }
}

pub(super) type SessionTable = Mutex<HashMap<SessionKey, Arc<RelaySession>>>;

/// Remove a session from the table only if it is still the same instance
///
/// A fresh session for the same key may already have replaced a failed one.
pub(super) fn remove_if_same(table: &SessionTable, session: &Arc<RelaySession>) {
    let mut sessions = table.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(existing) = sessions.get(&session.key) {
        if Arc::ptr_eq(existing, session) {
            sessions.remove(&session.key);
        }
    }
}

/// A client's handle on a shared relay session
///
/// Dropping the attachment detaches the client; the last detach tears the
/// upstream connection down.
pub struct RelayAttachment {
    /// Relayed upstream bytes (zero-copy via `Bytes` reference counting)
    pub data: broadcast::Receiver<Bytes>,
    /// Session health updates
    pub health: watch::Receiver<SessionHealth>,
    pub(super) session: Arc<RelaySession>,
    pub(super) table: Arc<SessionTable>,
}

impl RelayAttachment {
    /// The session this attachment belongs to
    pub fn session(&self) -> &Arc<RelaySession> {
        &self.session
    }
}

impl Drop for RelayAttachment {
    fn drop(&mut self) {
        // Decrement under the table lock: attach increments under the same
        // lock, so a last detach and a new attach on the key serialize and
        // an incoming client can never land on a just-cancelled session.
        let mut sessions = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if self.session.attached.fetch_sub(1, Ordering::AcqRel) == 1 {
            tracing::info!(session = %self.session.key, "Last client detached, tearing down relay");
            self.session.cancel.cancel();
            if let Some(existing) = sessions.get(&self.session.key) {
                if Arc::ptr_eq(existing, &self.session) {
                    sessions.remove(&self.session.key);
                }
            }
        }
    }
}
