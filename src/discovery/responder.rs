//! Discovery responder loop

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::registry::{DeviceDescriptor, DeviceRegistry, RegistryEvent};

use super::message::{build_bye, build_hello, build_probe_match, probe_matches, ProbeRequest};

const WS_DISCOVERY_PORT: u16 = 3702;
const WS_DISCOVERY_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Discovery responder configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Local bind address for the discovery socket
    pub bind_addr: SocketAddr,

    /// Multicast group announcements are sent to
    pub multicast_addr: SocketAddrV4,

    /// TTL for outgoing multicast datagrams
    pub multicast_ttl: u32,

    /// Interval between unsolicited Hello re-announcements
    pub announce_interval: Duration,

    /// Window within which a repeated probe (same sender and MessageID) is
    /// answered only once
    pub dedup_ttl: Duration,

    /// Base URL placed in XAddrs; clients fetch services from here
    pub base_url: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, WS_DISCOVERY_PORT)),
            multicast_addr: SocketAddrV4::new(WS_DISCOVERY_GROUP, WS_DISCOVERY_PORT),
            multicast_ttl: 2,
            announce_interval: Duration::from_secs(300),
            dedup_ttl: Duration::from_secs(10),
            base_url: "http://127.0.0.1:8000".into(),
        }
    }
}

impl DiscoveryConfig {
    /// Set the bind address
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the advertised base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the re-announce interval
    pub fn announce_interval(mut self, interval: Duration) -> Self {
        self.announce_interval = interval;
        self
    }
}

/// Answers probes and announces device lifecycle on the discovery group
pub struct DiscoveryResponder {
    registry: Arc<DeviceRegistry>,
    config: DiscoveryConfig,
}

impl DiscoveryResponder {
    /// Create a responder over the given registry
    pub fn new(registry: Arc<DeviceRegistry>, config: DiscoveryConfig) -> Self {
        Self { registry, config }
    }

    /// Bind the discovery socket and serve until the token is cancelled
    ///
    /// Sends Hello for every registered device on startup and Bye for every
    /// device on shutdown.
    pub async fn run_until(&self, shutdown: CancellationToken) -> io::Result<()> {
        let socket = UdpSocket::bind(self.config.bind_addr).await?;
        self.serve(socket, shutdown).await
    }

    /// Drive the responder on an already-bound socket
    pub async fn serve(&self, socket: UdpSocket, shutdown: CancellationToken) -> io::Result<()> {
        socket.set_multicast_ttl_v4(self.config.multicast_ttl)?;
        // Local test sockets are unicast-only; keep serving without the group
        if let Err(e) = socket.join_multicast_v4(*self.config.multicast_addr.ip(), Ipv4Addr::UNSPECIFIED)
        {
            tracing::warn!(error = %e, "Could not join discovery multicast group");
        }

        tracing::info!(
            addr = %socket.local_addr()?,
            group = %self.config.multicast_addr,
            "Discovery responder listening"
        );

        let mut registry_events = self.registry.subscribe();
        let mut announce = tokio::time::interval(self.config.announce_interval);
        // Consume the immediate first tick; the startup burst happens below
        announce.tick().await;

        self.announce_all(&socket).await;

        let mut buf = vec![0u8; 8192];
        let mut seen: HashMap<(SocketAddr, String), Instant> = HashMap::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.say_goodbye(&socket).await;
                    tracing::info!("Discovery responder stopped");
                    return Ok(());
                }

                _ = announce.tick() => {
                    self.announce_all(&socket).await;
                }

                event = registry_events.recv() => match event {
                    Ok(RegistryEvent::Created(device)) | Ok(RegistryEvent::Updated(device)) => {
                        self.send_hello(&socket, &device).await;
                    }
                    Ok(RegistryEvent::Removed(device)) => {
                        self.send_bye(&socket, &device).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed = missed, "Registry events lagged, re-announcing");
                        self.announce_all(&socket).await;
                    }
                    Err(RecvError::Closed) => {
                        self.say_goodbye(&socket).await;
                        return Ok(());
                    }
                },

                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, sender)) => {
                        prune_seen(&mut seen, self.config.dedup_ttl);
                        self.handle_datagram(&socket, &buf[..len], sender, &mut seen).await;
                    }
                    // Transient (ICMP port unreachable surfaces here on some
                    // platforms); only the bind can kill the responder
                    Err(e) => {
                        tracing::warn!(error = %e, "Discovery receive failed");
                    }
                },
            }
        }
    }

    async fn handle_datagram(
        &self,
        socket: &UdpSocket,
        datagram: &[u8],
        sender: SocketAddr,
        seen: &mut HashMap<(SocketAddr, String), Instant>,
    ) {
        let text = match std::str::from_utf8(datagram) {
            Ok(text) => text,
            Err(_) => return,
        };

        let probe = match ProbeRequest::parse(text) {
            Ok(probe) => probe,
            // Hello/Bye chatter from other responders lands here too
            Err(_) => return,
        };

        if !probe.message_id.is_empty() {
            let key = (sender, probe.message_id.clone());
            if seen.contains_key(&key) {
                tracing::trace!(sender = %sender, "Duplicate probe ignored");
                return;
            }
            seen.insert(key, Instant::now());
        }

        let devices = self.registry.list().await;
        let mut matched = 0usize;
        for device in devices.iter().filter(|d| probe_matches(&probe, d)) {
            let response = build_probe_match(&probe, device, &self.xaddr(device));
            if let Err(e) = socket.send_to(response.as_bytes(), sender).await {
                tracing::warn!(sender = %sender, error = %e, "Probe match send failed");
            }
            matched += 1;
        }

        tracing::debug!(sender = %sender, matched = matched, "Probe answered");
    }

    async fn announce_all(&self, socket: &UdpSocket) {
        for device in self.registry.list().await {
            self.send_hello(socket, &device).await;
        }
    }

    async fn say_goodbye(&self, socket: &UdpSocket) {
        for device in self.registry.list().await {
            self.send_bye(socket, &device).await;
        }
    }

    async fn send_hello(&self, socket: &UdpSocket, device: &DeviceDescriptor) {
        let hello = build_hello(device, &self.xaddr(device));
        if let Err(e) = socket
            .send_to(hello.as_bytes(), SocketAddr::V4(self.config.multicast_addr))
            .await
        {
            tracing::warn!(device = %device.id, error = %e, "Hello send failed");
        } else {
            tracing::debug!(device = %device.id, "Hello announced");
        }
    }

    async fn send_bye(&self, socket: &UdpSocket, device: &DeviceDescriptor) {
        let bye = build_bye(device);
        if let Err(e) = socket
            .send_to(bye.as_bytes(), SocketAddr::V4(self.config.multicast_addr))
            .await
        {
            tracing::warn!(device = %device.id, error = %e, "Bye send failed");
        } else {
            tracing::debug!(device = %device.id, "Bye announced");
        }
    }

    fn xaddr(&self, device: &DeviceDescriptor) -> String {
        format!(
            "{}/onvif/{}/device_service",
            self.config.base_url.trim_end_matches('/'),
            device.id
        )
    }
}

fn prune_seen(seen: &mut HashMap<(SocketAddr, String), Instant>, ttl: Duration) {
    let cutoff = Instant::now() - ttl;
    seen.retain(|_, at| *at > cutoff);
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"
            xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
  <s:Header>
    <wsa:MessageID>{id}</wsa:MessageID>
    <wsa:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</wsa:Action>
  </s:Header>
  <s:Body>
    <d:Probe>
      <d:Types>dn:NetworkVideoTransmitter</d:Types>
    </d:Probe>
  </s:Body>
</s:Envelope>"#;

    async fn start_responder(
        registry: Arc<DeviceRegistry>,
    ) -> (SocketAddr, CancellationToken) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        // Multicast announcements land on a throwaway local socket
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sink_addr = match sink.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            _ => unreachable!(),
        };
        tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            while sink.recv_from(&mut buf).await.is_ok() {}
        });

        let config = DiscoveryConfig {
            multicast_addr: sink_addr,
            announce_interval: Duration::from_secs(3600),
            ..DiscoveryConfig::default()
        }
        .base_url("http://127.0.0.1:8000");

        let responder = DiscoveryResponder::new(registry, config);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            responder.serve(socket, token).await.unwrap();
        });

        (addr, shutdown)
    }

    async fn send_probe(target: SocketAddr, message_id: &str) -> UdpSocket {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let probe = PROBE_TEMPLATE.replace("{id}", message_id);
        client.send_to(probe.as_bytes(), target).await.unwrap();
        client
    }

    async fn recv_with_timeout(socket: &UdpSocket) -> Option<String> {
        let mut buf = vec![0u8; 8192];
        match tokio::time::timeout(Duration::from_millis(500), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(String::from_utf8_lossy(&buf[..len]).into_owned()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_probe_answered_per_matching_device() {
        let registry = Arc::new(DeviceRegistry::new());
        let a = DeviceDescriptor::new("Porch");
        let b = DeviceDescriptor::new("Garage");
        registry.create(a.clone()).await.unwrap();
        registry.create(b.clone()).await.unwrap();

        let (addr, shutdown) = start_responder(Arc::clone(&registry)).await;
        let client = send_probe(addr, "urn:uuid:probe-1").await;

        let first = recv_with_timeout(&client).await.expect("first match");
        let second = recv_with_timeout(&client).await.expect("second match");

        assert!(first.contains("<wsa:RelatesTo>urn:uuid:probe-1</wsa:RelatesTo>"));
        let both = format!("{first}{second}");
        assert!(both.contains(&a.endpoint_reference()));
        assert!(both.contains(&b.endpoint_reference()));
        assert!(first.contains("/onvif/"));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_duplicate_probe_answered_once() {
        let registry = Arc::new(DeviceRegistry::new());
        registry.create(DeviceDescriptor::new("Porch")).await.unwrap();

        let (addr, shutdown) = start_responder(Arc::clone(&registry)).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let probe = PROBE_TEMPLATE.replace("{id}", "urn:uuid:dup");
        client.send_to(probe.as_bytes(), addr).await.unwrap();
        client.send_to(probe.as_bytes(), addr).await.unwrap();

        assert!(recv_with_timeout(&client).await.is_some());
        assert!(recv_with_timeout(&client).await.is_none());

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_responder_survives_bad_datagrams() {
        let registry = Arc::new(DeviceRegistry::new());
        registry.create(DeviceDescriptor::new("Porch")).await.unwrap();

        let (addr, shutdown) = start_responder(Arc::clone(&registry)).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&[0xff, 0xfe, 0x00, 0x80], addr).await.unwrap();
        client.send_to(b"not xml at all", addr).await.unwrap();
        client.send_to(&[], addr).await.unwrap();

        // The loop must keep serving after malformed traffic
        let probe = PROBE_TEMPLATE.replace("{id}", "urn:uuid:after-garbage");
        client.send_to(probe.as_bytes(), addr).await.unwrap();
        let reply = recv_with_timeout(&client).await.expect("probe still answered");
        assert!(reply.contains("<wsa:RelatesTo>urn:uuid:after-garbage</wsa:RelatesTo>"));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_probe_with_no_registered_devices_is_silent() {
        let registry = Arc::new(DeviceRegistry::new());
        let (addr, shutdown) = start_responder(registry).await;

        let client = send_probe(addr, "urn:uuid:nobody").await;
        assert!(recv_with_timeout(&client).await.is_none());

        shutdown.cancel();
    }
}
