//! Emulator façade
//!
//! Wires the registry, event broker, stream proxy, SOAP dispatcher and
//! discovery responder together and runs them as one unit. Components stay
//! individually usable; the façade only owns startup, the registry teardown
//! watcher and shutdown ordering.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{apply_definitions, DeviceDefinition};
use crate::discovery::{DiscoveryConfig, DiscoveryResponder};
use crate::events::{BrokerConfig, EventBroker};
use crate::proxy::{ProxyConfig, StreamProxy};
use crate::registry::{DeviceRegistry, RegistryError, RegistryEvent};
use crate::soap::server::{SoapDispatcher, SoapServerConfig};
use crate::trigger::TriggerIngress;

/// Emulator configuration
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Bind address of the HTTP/SOAP listener
    pub http_bind: SocketAddr,
    /// SOAP endpoint options (advertised base URL, credentials)
    pub soap: SoapServerConfig,
    /// Discovery responder options; `None` disables discovery
    pub discovery: Option<DiscoveryConfig>,
    /// Event broker options
    pub broker: BrokerConfig,
    /// Stream proxy options
    pub proxy: ProxyConfig,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            http_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8000)),
            soap: SoapServerConfig::default(),
            discovery: Some(DiscoveryConfig::default()),
            broker: BrokerConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl EmulatorConfig {
    /// Set the HTTP bind address
    pub fn http_bind(mut self, addr: SocketAddr) -> Self {
        self.http_bind = addr;
        self
    }

    /// Set the SOAP endpoint options
    pub fn soap(mut self, soap: SoapServerConfig) -> Self {
        self.soap = soap;
        self
    }

    /// Disable the discovery responder
    pub fn without_discovery(mut self) -> Self {
        self.discovery = None;
        self
    }
}

/// A running set of virtual ONVIF devices
pub struct Emulator {
    config: EmulatorConfig,
    registry: Arc<DeviceRegistry>,
    broker: Arc<EventBroker>,
    proxy: Arc<StreamProxy>,
    dispatcher: Arc<SoapDispatcher>,
    trigger: TriggerIngress,
}

impl Emulator {
    /// Wire up an emulator from configuration
    pub fn new(config: EmulatorConfig) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let broker = EventBroker::with_config(Arc::clone(&registry), config.broker.clone());
        let proxy = StreamProxy::with_config(Arc::clone(&registry), config.proxy.clone());
        let dispatcher = SoapDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&broker),
            Arc::clone(&proxy),
            config.soap.clone(),
        );
        let trigger = TriggerIngress::new(Arc::clone(&broker));

        Self {
            config,
            registry,
            broker,
            proxy,
            dispatcher,
            trigger,
        }
    }

    /// The device registry
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// The event broker
    pub fn broker(&self) -> &Arc<EventBroker> {
        &self.broker
    }

    /// The stream proxy
    pub fn proxy(&self) -> &Arc<StreamProxy> {
        &self.proxy
    }

    /// The trigger ingress
    pub fn trigger(&self) -> &TriggerIngress {
        &self.trigger
    }

    /// Apply a full set of device definitions (create/update/remove)
    pub async fn apply(&self, definitions: Vec<DeviceDefinition>) -> Result<(), RegistryError> {
        apply_definitions(&self.registry, definitions).await?;
        Ok(())
    }

    /// Run until the process is killed
    pub async fn run(&self) -> io::Result<()> {
        self.run_until(CancellationToken::new()).await
    }

    /// Run until the token is cancelled
    ///
    /// Starts the HTTP listener, the discovery responder (when enabled), the
    /// broker expiry sweep and the registry teardown watcher. Returns once
    /// everything has shut down.
    pub async fn run_until(&self, shutdown: CancellationToken) -> io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.http_bind).await?;
        tracing::info!(addr = %listener.local_addr()?, "SOAP endpoint listening");

        let sweep = self.broker.spawn_sweep_task();
        let watcher = self.spawn_teardown_watcher(shutdown.clone());

        let http = {
            let router = self.dispatcher.router();
            let token = shutdown.clone();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(token.cancelled_owned())
                    .await
            }
        };

        let result = match &self.config.discovery {
            Some(discovery_config) => {
                let responder =
                    DiscoveryResponder::new(Arc::clone(&self.registry), discovery_config.clone());
                let token = shutdown.clone();
                let discovery = async move {
                    let result = responder.run_until(token.clone()).await;
                    if result.is_err() {
                        // A dead responder leaves the devices undiscoverable;
                        // take the whole emulator down with it.
                        token.cancel();
                    }
                    result
                };
                let (http_result, discovery_result) = tokio::join!(http, discovery);
                http_result.and(discovery_result)
            }
            None => http.await,
        };

        sweep.abort();
        let _ = watcher.await;

        tracing::info!("Emulator stopped");
        result
    }

    /// Watch registry removals and tear down dependent state
    fn spawn_teardown_watcher(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let mut events = self.registry.subscribe();
        let broker = Arc::clone(&self.broker);
        let proxy = Arc::clone(&self.proxy);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    event = events.recv() => match event {
                        Ok(RegistryEvent::Removed(device)) => {
                            broker.remove_device(device.id).await;
                            proxy.remove_device(device.id);
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed = missed, "Registry events lagged in teardown watcher");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    },
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DeliveryMode, TopicFilter};
    use crate::registry::{DeviceDescriptor, StreamProfile};
    use std::time::Duration;

    fn test_config() -> EmulatorConfig {
        EmulatorConfig::default()
            .http_bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .without_discovery()
    }

    #[tokio::test]
    async fn test_device_removal_tears_down_dependents() {
        let emulator = Emulator::new(test_config());
        let shutdown = CancellationToken::new();

        let device = DeviceDescriptor::new("cam1")
            .profile(StreamProfile::new("main", "rtsp://10.0.0.5:554/ch0"))
            .topic("motion");
        let id = device.id;
        emulator.registry().create(device).await.unwrap();

        let watcher = emulator.spawn_teardown_watcher(shutdown.clone());

        emulator
            .broker()
            .subscribe(id, DeliveryMode::Pull, TopicFilter::all(), None)
            .await
            .unwrap();
        assert_eq!(emulator.broker().subscription_count().await, 1);

        emulator.registry().delete(id).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while emulator.broker().subscription_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriptions should be torn down on device removal");

        shutdown.cancel();
        let _ = watcher.await;
    }

    #[tokio::test]
    async fn test_apply_definitions_through_facade() {
        let emulator = Emulator::new(test_config());

        emulator
            .apply(vec![crate::config::DeviceDefinition {
                id: None,
                name: "Porch".into(),
                manufacturer: None,
                model: None,
                firmware_version: None,
                streams: vec![],
                topics: vec!["motion".into()],
            }])
            .await
            .unwrap();

        assert_eq!(emulator.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_cancel() {
        let emulator = Emulator::new(test_config());
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move { emulator.run_until(token).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("emulator should stop on cancel")
            .unwrap();
        assert!(result.is_ok());
    }
}
