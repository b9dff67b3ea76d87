//! Stream proxy implementation
//!
//! Resolves device+profile pairs to client-facing stream addresses and
//! manages the lifecycle of shared upstream relay sessions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::registry::DeviceRegistry;

use super::error::ProxyError;
use super::session::{
    remove_if_same, RelayAttachment, RelaySession, SessionHealth, SessionKey, SessionTable,
};

/// Proxy configuration options
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Host placed in client-facing stream URIs
    pub advertised_host: String,

    /// Port placed in client-facing stream URIs
    pub stream_port: u16,

    /// Timeout for one upstream connect attempt
    pub connect_timeout: Duration,

    /// Reconnect attempts before a session reports failure
    pub max_retries: u32,

    /// First reconnect delay; doubles per attempt
    pub initial_backoff: Duration,

    /// Reconnect delay cap
    pub max_backoff: Duration,

    /// Broadcast channel capacity (slow clients lag and skip, never block)
    pub broadcast_capacity: usize,

    /// Upstream read buffer size
    pub read_buffer_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            advertised_host: "127.0.0.1".into(),
            stream_port: 8554,
            connect_timeout: Duration::from_secs(5),
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            broadcast_capacity: 256,
            read_buffer_size: 16 * 1024,
        }
    }
}

impl ProxyConfig {
    /// Set the advertised host
    pub fn advertised_host(mut self, host: impl Into<String>) -> Self {
        self.advertised_host = host.into();
        self
    }

    /// Set the advertised stream port
    pub fn stream_port(mut self, port: u16) -> Self {
        self.stream_port = port;
        self
    }

    /// Set the reconnect budget
    pub fn retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Byte-level relay keyed by device+profile identity
pub struct StreamProxy {
    registry: Arc<DeviceRegistry>,
    config: ProxyConfig,
    sessions: Arc<SessionTable>,
}

impl StreamProxy {
    /// Create a proxy with default configuration
    pub fn new(registry: Arc<DeviceRegistry>) -> Arc<Self> {
        Self::with_config(registry, ProxyConfig::default())
    }

    /// Create a proxy with custom configuration
    pub fn with_config(registry: Arc<DeviceRegistry>, config: ProxyConfig) -> Arc<Self> {
        Arc::new(Self {
            registry,
            config,
            sessions: Arc::new(SessionTable::default()),
        })
    }

    /// Get the proxy configuration
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Resolve a client-facing stream address for a device profile
    ///
    /// Accepts either a bare profile label or a wire token ("Profile_main").
    /// Fails with `NotFound` when the device or profile is unknown; no
    /// session is established.
    pub async fn resolve_uri(&self, device_id: Uuid, profile: &str) -> Result<String, ProxyError> {
        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or(ProxyError::DeviceNotFound(device_id))?;
        let profile =
            device
                .find_profile_by_token(profile)
                .ok_or_else(|| ProxyError::ProfileNotFound {
                    device: device_id,
                    profile: profile.to_string(),
                })?;

        Ok(format!(
            "rtsp://{}:{}/stream/{}/{}",
            self.config.advertised_host, self.config.stream_port, device_id, profile.label
        ))
    }

    /// Attach a client to the shared relay for a device profile
    ///
    /// Opens the upstream connection lazily on first attach; concurrent
    /// attaches to the same device+profile share one session.
    pub async fn attach(
        &self,
        device_id: Uuid,
        profile: &str,
    ) -> Result<RelayAttachment, ProxyError> {
        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or(ProxyError::DeviceNotFound(device_id))?;
        let profile =
            device
                .find_profile_by_token(profile)
                .ok_or_else(|| ProxyError::ProfileNotFound {
                    device: device_id,
                    profile: profile.to_string(),
                })?;

        let key = SessionKey::new(device_id, profile.label.clone());
        let upstream = parse_upstream(&profile.upstream_url)?;

        let session = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

            // A failed session removes itself and a last detach cancels one,
            // both racing this lookup; replace anything dead rather than
            // handing out a cancelled channel. The refcount increment stays
            // under the lock so a concurrent last detach (which also holds
            // it) can never cancel a session between lookup and increment.
            let reusable = sessions
                .get(&key)
                .filter(|s| s.health() != SessionHealth::Failed && !s.cancel.is_cancelled())
                .cloned();

            let session = match reusable {
                Some(session) => session,
                None => {
                    let session = self.spawn_session(key.clone(), upstream);
                    sessions.insert(key.clone(), Arc::clone(&session));
                    session
                }
            };
            session.attached.fetch_add(1, Ordering::AcqRel);
            session
        };

        tracing::debug!(
            session = %key,
            attached = session.attached(),
            "Client attached to relay"
        );

        Ok(RelayAttachment {
            data: session.data_tx.subscribe(),
            health: session.health_rx.clone(),
            session,
            table: Arc::clone(&self.sessions),
        })
    }

    fn spawn_session(&self, key: SessionKey, upstream: (String, u16)) -> Arc<RelaySession> {
        let (data_tx, _) = broadcast::channel(self.config.broadcast_capacity);
        let (health_tx, health_rx) = watch::channel(SessionHealth::Connecting);
        let cancel = CancellationToken::new();

        let session = Arc::new(RelaySession {
            key: key.clone(),
            attached: AtomicU32::new(0),
            data_tx: data_tx.clone(),
            health_rx,
            cancel: cancel.clone(),
        });

        let config = self.config.clone();
        let table = Arc::clone(&self.sessions);
        let task_session = Arc::clone(&session);

        tokio::spawn(async move {
            run_relay(&key, upstream, config, data_tx, &health_tx, &cancel).await;

            // Failure path: make the slot available for a fresh attempt.
            if *health_tx.borrow() == SessionHealth::Failed {
                remove_if_same(&table, &task_session);
            }
            tracing::debug!(session = %key, "Relay task stopped");
        });

        session
    }

    /// Tear down every relay session referencing a device
    ///
    /// Driven by registry `Removed` events. Attached clients observe
    /// `Closed` on the health channel.
    pub fn remove_device(&self, device_id: Uuid) {
        let doomed: Vec<Arc<RelaySession>> = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            let keys: Vec<SessionKey> = sessions
                .keys()
                .filter(|k| k.device_id == device_id)
                .cloned()
                .collect();
            keys.into_iter().filter_map(|k| sessions.remove(&k)).collect()
        };

        for session in doomed {
            tracing::info!(session = %session.key, "Relay torn down (device removed)");
            session.cancel.cancel();
        }
    }

    /// Number of live relay sessions
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Extract the TCP target from an upstream URL
fn parse_upstream(upstream_url: &str) -> Result<(String, u16), ProxyError> {
    let url = Url::parse(upstream_url)
        .map_err(|_| ProxyError::InvalidUpstream(upstream_url.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| ProxyError::InvalidUpstream(upstream_url.to_string()))?
        .to_string();
    let port = url.port().unwrap_or(match url.scheme() {
        "rtsp" => 554,
        "rtmp" => 1935,
        "http" => 80,
        "https" => 443,
        _ => 554,
    });
    Ok((host, port))
}

/// Relay loop: connect with bounded backoff, fan upstream bytes out, retry
/// on failure until the budget is exhausted or the session is cancelled
async fn run_relay(
    key: &SessionKey,
    upstream: (String, u16),
    config: ProxyConfig,
    data_tx: broadcast::Sender<Bytes>,
    health_tx: &watch::Sender<SessionHealth>,
    cancel: &CancellationToken,
) {
    let mut retries = 0u32;
    let mut backoff = config.initial_backoff;

    loop {
        if cancel.is_cancelled() {
            let _ = health_tx.send(SessionHealth::Closed);
            return;
        }

        let _ = health_tx.send(SessionHealth::Connecting);

        let connect = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((upstream.0.as_str(), upstream.1)),
        );

        let stream = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = health_tx.send(SessionHealth::Closed);
                return;
            }
            result = connect => match result {
                Ok(Ok(stream)) => Some(stream),
                Ok(Err(e)) => {
                    tracing::warn!(session = %key, error = %e, "Upstream connect failed");
                    None
                }
                Err(_) => {
                    tracing::warn!(session = %key, "Upstream connect timed out");
                    None
                }
            },
        };

        if let Some(mut stream) = stream {
            let _ = health_tx.send(SessionHealth::Active);
            retries = 0;
            backoff = config.initial_backoff;
            tracing::info!(session = %key, "Upstream connected");

            let mut buf = vec![0u8; config.read_buffer_size];
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = health_tx.send(SessionHealth::Closed);
                        return;
                    }
                    read = stream.read(&mut buf) => match read {
                        Ok(0) => {
                            tracing::info!(session = %key, "Upstream closed");
                            break;
                        }
                        Ok(n) => {
                            // send() only fails with no receivers; lagging
                            // clients skip ahead instead of blocking teardown
                            let _ = data_tx.send(Bytes::copy_from_slice(&buf[..n]));
                        }
                        Err(e) => {
                            tracing::warn!(session = %key, error = %e, "Upstream read failed");
                            break;
                        }
                    },
                }
            }
        }

        retries += 1;
        if retries > config.max_retries {
            tracing::warn!(
                session = %key,
                retries = retries - 1,
                "Upstream reconnect budget exhausted"
            );
            let _ = health_tx.send(SessionHealth::Failed);
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = health_tx.send(SessionHealth::Closed);
                return;
            }
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(config.max_backoff);
    }
}
