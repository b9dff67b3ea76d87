//! WS-Discovery message parsing and rendering

use uuid::Uuid;

use crate::error::ServiceError;
use crate::registry::DeviceDescriptor;

use crate::soap::envelope::{xml_escape, SoapRequest};

/// A parsed Probe message
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    /// WS-Addressing MessageID, echoed back in RelatesTo
    pub message_id: String,
    /// Requested device types, empty means any
    pub types: Vec<String>,
    /// Requested scope prefixes, empty means any
    pub scopes: Vec<String>,
}

impl ProbeRequest {
    /// Parse a Probe envelope; anything that is not a Probe is rejected
    pub fn parse(xml: &str) -> Result<Self, ServiceError> {
        let request = SoapRequest::parse(xml)?;
        if request.operation != "Probe" {
            return Err(ServiceError::InvalidRequest(format!(
                "not a probe: {}",
                request.operation
            )));
        }

        let message_id = request
            .field("MessageID")
            .unwrap_or_default()
            .trim()
            .to_string();
        let types = split_list(request.field("Types"));
        let scopes = split_list(request.field("Scopes"));

        Ok(Self {
            message_id,
            types,
            scopes,
        })
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Whether a device matches a probe's type and scope constraints
///
/// Types match when the list is empty or names NetworkVideoTransmitter
/// under any namespace prefix; every probe scope must be a prefix of some
/// device scope.
pub fn probe_matches(probe: &ProbeRequest, device: &DeviceDescriptor) -> bool {
    let type_ok = probe.types.is_empty()
        || probe
            .types
            .iter()
            .any(|t| t.rsplit(':').next() == Some("NetworkVideoTransmitter"));
    if !type_ok {
        return false;
    }

    let device_scopes = device.scopes();
    probe
        .scopes
        .iter()
        .all(|requested| device_scopes.iter().any(|s| s.starts_with(requested)))
}

fn scopes_line(device: &DeviceDescriptor) -> String {
    device.scopes().join(" ")
}

/// ProbeMatches envelope answering one probe for one device
pub fn build_probe_match(probe: &ProbeRequest, device: &DeviceDescriptor, xaddr: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"
            xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
    <s:Header>
        <wsa:MessageID>urn:uuid:{message_id}</wsa:MessageID>
        <wsa:RelatesTo>{relates_to}</wsa:RelatesTo>
        <wsa:To>http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</wsa:To>
        <wsa:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/ProbeMatches</wsa:Action>
    </s:Header>
    <s:Body>
        <d:ProbeMatches>
            <d:ProbeMatch>
                <wsa:EndpointReference>
                    <wsa:Address>{endpoint}</wsa:Address>
                </wsa:EndpointReference>
                <d:Types>dn:NetworkVideoTransmitter</d:Types>
                <d:Scopes>{scopes}</d:Scopes>
                <d:XAddrs>{xaddr}</d:XAddrs>
                <d:MetadataVersion>1</d:MetadataVersion>
            </d:ProbeMatch>
        </d:ProbeMatches>
    </s:Body>
</s:Envelope>"#,
        message_id = Uuid::new_v4(),
        relates_to = xml_escape(&probe.message_id),
        endpoint = device.endpoint_reference(),
        scopes = xml_escape(&scopes_line(device)),
        xaddr = xml_escape(xaddr),
    )
}

/// Hello announcement for one device
pub fn build_hello(device: &DeviceDescriptor, xaddr: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"
            xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
    <s:Header>
        <wsa:MessageID>urn:uuid:{message_id}</wsa:MessageID>
        <wsa:To>urn:schemas-xmlsoap-org:ws:2005:04:discovery</wsa:To>
        <wsa:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/Hello</wsa:Action>
    </s:Header>
    <s:Body>
        <d:Hello>
            <wsa:EndpointReference>
                <wsa:Address>{endpoint}</wsa:Address>
            </wsa:EndpointReference>
            <d:Types>dn:NetworkVideoTransmitter</d:Types>
            <d:Scopes>{scopes}</d:Scopes>
            <d:XAddrs>{xaddr}</d:XAddrs>
            <d:MetadataVersion>1</d:MetadataVersion>
        </d:Hello>
    </s:Body>
</s:Envelope>"#,
        message_id = Uuid::new_v4(),
        endpoint = device.endpoint_reference(),
        scopes = xml_escape(&scopes_line(device)),
        xaddr = xml_escape(xaddr),
    )
}

/// Bye announcement for one device
pub fn build_bye(device: &DeviceDescriptor) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery">
    <s:Header>
        <wsa:MessageID>urn:uuid:{message_id}</wsa:MessageID>
        <wsa:To>urn:schemas-xmlsoap-org:ws:2005:04:discovery</wsa:To>
        <wsa:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/Bye</wsa:Action>
    </s:Header>
    <s:Body>
        <d:Bye>
            <wsa:EndpointReference>
                <wsa:Address>{endpoint}</wsa:Address>
            </wsa:EndpointReference>
        </d:Bye>
    </s:Body>
</s:Envelope>"#,
        message_id = Uuid::new_v4(),
        endpoint = device.endpoint_reference(),
    )
}
