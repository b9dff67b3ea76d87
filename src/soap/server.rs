//! HTTP transport for the SOAP services
//!
//! One axum router serves every emulated device; the device identifier is a
//! path segment, so each virtual camera gets its own service addresses
//! without binding extra ports.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::events::EventBroker;
use crate::proxy::StreamProxy;
use crate::registry::{DeviceDescriptor, DeviceRegistry};

use super::auth::AuthConfig;
use super::envelope::{soap_fault, soap_response, SoapRequest};
use super::{device, events, media};

/// SOAP endpoint configuration
#[derive(Debug, Clone)]
pub struct SoapServerConfig {
    /// Base URL advertised in capability and subscription references
    /// (scheme, host and port as clients reach us)
    pub base_url: String,
    /// Request credentials; open by default
    pub auth: AuthConfig,
}

impl Default for SoapServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            auth: AuthConfig::open(),
        }
    }
}

impl SoapServerConfig {
    /// Set the advertised base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the credential configuration
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }
}

/// Routes parsed SOAP operations to the registry, broker and proxy
pub struct SoapDispatcher {
    registry: Arc<DeviceRegistry>,
    broker: Arc<EventBroker>,
    proxy: Arc<StreamProxy>,
    config: SoapServerConfig,
}

impl SoapDispatcher {
    /// Create a dispatcher over the given components
    pub fn new(
        registry: Arc<DeviceRegistry>,
        broker: Arc<EventBroker>,
        proxy: Arc<StreamProxy>,
        config: SoapServerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            broker,
            proxy,
            config,
        })
    }

    /// Build the axum router serving every device endpoint
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/onvif/{device_id}/device_service", post(device_service))
            .route("/onvif/{device_id}/media_service", post(media_service))
            .route("/onvif/{device_id}/event_service", post(event_service))
            .route(
                "/onvif/{device_id}/subscription/{sub_id}",
                post(subscription_service),
            )
            .with_state(Arc::clone(self))
    }

    async fn authenticated_device(
        &self,
        device_id: Uuid,
        request: &SoapRequest,
    ) -> Result<Arc<DeviceDescriptor>, ServiceError> {
        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or_else(|| ServiceError::NotFound("Device".into()))?;
        self.config
            .auth
            .verify(device_id, request.security.as_ref())?;
        Ok(device)
    }

    async fn dispatch_device(
        &self,
        device_id: Uuid,
        request: &SoapRequest,
    ) -> Result<String, ServiceError> {
        let dev = self.authenticated_device(device_id, request).await?;
        match request.operation.as_str() {
            "GetDeviceInformation" => Ok(device::device_information(&dev)),
            "GetCapabilities" => Ok(device::capabilities(&dev, &self.config.base_url)),
            "GetServices" => Ok(device::services(&dev, &self.config.base_url)),
            "GetScopes" => Ok(device::scopes(&dev)),
            "GetSystemDateAndTime" => Ok(device::system_date_and_time()),
            other => Err(ServiceError::InvalidRequest(format!(
                "unsupported operation {other}"
            ))),
        }
    }

    async fn dispatch_media(
        &self,
        device_id: Uuid,
        request: &SoapRequest,
    ) -> Result<String, ServiceError> {
        let dev = self.authenticated_device(device_id, request).await?;
        match request.operation.as_str() {
            "GetProfiles" => Ok(media::profiles(&dev)),
            "GetStreamUri" => {
                media::stream_uri(&self.proxy, &dev, request.field("ProfileToken")).await
            }
            "GetSnapshotUri" => {
                media::snapshot_uri(&dev, &self.config.base_url, request.field("ProfileToken"))
            }
            other => Err(ServiceError::InvalidRequest(format!(
                "unsupported operation {other}"
            ))),
        }
    }

    async fn dispatch_events(
        &self,
        device_id: Uuid,
        request: &SoapRequest,
    ) -> Result<String, ServiceError> {
        let dev = self.authenticated_device(device_id, request).await?;
        match request.operation.as_str() {
            "GetEventProperties" => Ok(events::event_properties(&dev)),
            "CreatePullPointSubscription" => {
                events::create_pull_point(&self.broker, &dev, request, &self.config.base_url).await
            }
            "Subscribe" => {
                events::subscribe_push(&self.broker, &dev, request, &self.config.base_url).await
            }
            other => Err(ServiceError::InvalidRequest(format!(
                "unsupported operation {other}"
            ))),
        }
    }

    async fn dispatch_subscription(
        &self,
        device_id: Uuid,
        sub_id: Uuid,
        request: &SoapRequest,
    ) -> Result<String, ServiceError> {
        let _ = self.authenticated_device(device_id, request).await?;

        // The subscription must belong to the device in the path; otherwise
        // one device's endpoint (and credentials) would reach another's
        // subscriptions.
        if let Some(sub) = self.broker.subscription(sub_id).await {
            if sub.device_id != device_id {
                return Err(ServiceError::NotFound("Subscription".into()));
            }
        }

        match request.operation.as_str() {
            "PullMessages" => events::pull_messages(&self.broker, sub_id, request).await,
            "Renew" => events::renew(&self.broker, sub_id, request).await,
            "Unsubscribe" => Ok(events::unsubscribe(&self.broker, sub_id).await),
            other => Err(ServiceError::InvalidRequest(format!(
                "unsupported operation {other}"
            ))),
        }
    }
}

fn soap_reply(result: Result<String, ServiceError>) -> Response {
    match result {
        Ok(body) => reply(StatusCode::OK, soap_response(&body)),
        Err(err) => {
            let status = match &err {
                ServiceError::NotAuthorized => StatusCode::UNAUTHORIZED,
                ServiceError::InvalidRequest(_)
                | ServiceError::NotFound(_)
                | ServiceError::Conflict(_)
                | ServiceError::InvalidTopic(_) => StatusCode::BAD_REQUEST,
                ServiceError::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::debug!(error = %err, status = %status, "Request rejected with fault");
            reply(status, soap_fault(&err))
        }
    }
}

fn reply(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/soap+xml; charset=utf-8")],
        body,
    )
        .into_response()
}

fn parse_body(body: &Bytes) -> Result<SoapRequest, ServiceError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| ServiceError::InvalidRequest("request body is not utf-8".into()))?;
    SoapRequest::parse(text)
}

async fn device_service(
    State(dispatcher): State<Arc<SoapDispatcher>>,
    Path(device_id): Path<Uuid>,
    body: Bytes,
) -> Response {
    let result = match parse_body(&body) {
        Ok(request) => dispatcher.dispatch_device(device_id, &request).await,
        Err(err) => Err(err),
    };
    soap_reply(result)
}

async fn media_service(
    State(dispatcher): State<Arc<SoapDispatcher>>,
    Path(device_id): Path<Uuid>,
    body: Bytes,
) -> Response {
    let result = match parse_body(&body) {
        Ok(request) => dispatcher.dispatch_media(device_id, &request).await,
        Err(err) => Err(err),
    };
    soap_reply(result)
}

async fn event_service(
    State(dispatcher): State<Arc<SoapDispatcher>>,
    Path(device_id): Path<Uuid>,
    body: Bytes,
) -> Response {
    let result = match parse_body(&body) {
        Ok(request) => dispatcher.dispatch_events(device_id, &request).await,
        Err(err) => Err(err),
    };
    soap_reply(result)
}

async fn subscription_service(
    State(dispatcher): State<Arc<SoapDispatcher>>,
    Path((device_id, sub_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> Response {
    let result = match parse_body(&body) {
        Ok(request) => {
            dispatcher
                .dispatch_subscription(device_id, sub_id, &request)
                .await
        }
        Err(err) => Err(err),
    };
    soap_reply(result)
}
