//! Device service operations
//!
//! Body fragment builders for the device management endpoint. Every builder
//! takes the resolved descriptor; lookup and authentication have already
//! happened in the dispatcher.

use chrono::{Datelike, Timelike, Utc};

use crate::registry::DeviceDescriptor;

use super::envelope::xml_escape;

/// GetDeviceInformation response
pub fn device_information(device: &DeviceDescriptor) -> String {
    format!(
        r#"<tds:GetDeviceInformationResponse>
    <tds:Manufacturer>{manufacturer}</tds:Manufacturer>
    <tds:Model>{model}</tds:Model>
    <tds:FirmwareVersion>{firmware}</tds:FirmwareVersion>
    <tds:SerialNumber>{serial}</tds:SerialNumber>
    <tds:HardwareId>{serial}</tds:HardwareId>
</tds:GetDeviceInformationResponse>"#,
        manufacturer = xml_escape(&device.manufacturer),
        model = xml_escape(&device.model),
        firmware = xml_escape(&device.firmware_version),
        serial = device.id,
    )
}

/// GetCapabilities response pointing every category at the device's own
/// service endpoints
pub fn capabilities(device: &DeviceDescriptor, base_url: &str) -> String {
    let device_url = service_url(base_url, device, "device_service");
    let media_url = service_url(base_url, device, "media_service");
    let events_url = service_url(base_url, device, "event_service");

    format!(
        r#"<tds:GetCapabilitiesResponse>
    <tds:Capabilities>
        <tt:Device>
            <tt:XAddr>{device_url}</tt:XAddr>
        </tt:Device>
        <tt:Events>
            <tt:XAddr>{events_url}</tt:XAddr>
            <tt:WSSubscriptionPolicySupport>true</tt:WSSubscriptionPolicySupport>
            <tt:WSPullPointSupport>true</tt:WSPullPointSupport>
        </tt:Events>
        <tt:Media>
            <tt:XAddr>{media_url}</tt:XAddr>
            <tt:StreamingCapabilities>
                <tt:RTPMulticast>false</tt:RTPMulticast>
                <tt:RTP_TCP>true</tt:RTP_TCP>
                <tt:RTP_RTSP_TCP>true</tt:RTP_RTSP_TCP>
            </tt:StreamingCapabilities>
        </tt:Media>
    </tds:Capabilities>
</tds:GetCapabilitiesResponse>"#,
    )
}

/// GetServices response
pub fn services(device: &DeviceDescriptor, base_url: &str) -> String {
    format!(
        r#"<tds:GetServicesResponse>
    <tds:Service>
        <tds:Namespace>http://www.onvif.org/ver10/device/wsdl</tds:Namespace>
        <tds:XAddr>{device_url}</tds:XAddr>
        <tds:Version><tt:Major>2</tt:Major><tt:Minor>40</tt:Minor></tds:Version>
    </tds:Service>
    <tds:Service>
        <tds:Namespace>http://www.onvif.org/ver10/media/wsdl</tds:Namespace>
        <tds:XAddr>{media_url}</tds:XAddr>
        <tds:Version><tt:Major>2</tt:Major><tt:Minor>40</tt:Minor></tds:Version>
    </tds:Service>
    <tds:Service>
        <tds:Namespace>http://www.onvif.org/ver10/events/wsdl</tds:Namespace>
        <tds:XAddr>{events_url}</tds:XAddr>
        <tds:Version><tt:Major>2</tt:Major><tt:Minor>40</tt:Minor></tds:Version>
    </tds:Service>
</tds:GetServicesResponse>"#,
        device_url = service_url(base_url, device, "device_service"),
        media_url = service_url(base_url, device, "media_service"),
        events_url = service_url(base_url, device, "event_service"),
    )
}

/// GetScopes response mirroring the discovery scopes
pub fn scopes(device: &DeviceDescriptor) -> String {
    let items: String = device
        .scopes()
        .iter()
        .map(|scope| {
            format!(
                r#"    <tds:Scopes>
        <tt:ScopeDef>Fixed</tt:ScopeDef>
        <tt:ScopeItem>{}</tt:ScopeItem>
    </tds:Scopes>
"#,
                xml_escape(scope)
            )
        })
        .collect();

    format!("<tds:GetScopesResponse>\n{items}</tds:GetScopesResponse>")
}

/// GetSystemDateAndTime response reporting the host clock in UTC
pub fn system_date_and_time() -> String {
    let now = Utc::now();
    format!(
        r#"<tds:GetSystemDateAndTimeResponse>
    <tds:SystemDateAndTime>
        <tt:DateTimeType>NTP</tt:DateTimeType>
        <tt:DaylightSavings>false</tt:DaylightSavings>
        <tt:TimeZone><tt:TZ>UTC</tt:TZ></tt:TimeZone>
        <tt:UTCDateTime>
            <tt:Time>
                <tt:Hour>{hour}</tt:Hour>
                <tt:Minute>{minute}</tt:Minute>
                <tt:Second>{second}</tt:Second>
            </tt:Time>
            <tt:Date>
                <tt:Year>{year}</tt:Year>
                <tt:Month>{month}</tt:Month>
                <tt:Day>{day}</tt:Day>
            </tt:Date>
        </tt:UTCDateTime>
    </tds:SystemDateAndTime>
</tds:GetSystemDateAndTimeResponse>"#,
        hour = now.hour(),
        minute = now.minute(),
        second = now.second(),
        year = now.year(),
        month = now.month(),
        day = now.day(),
    )
}

/// Per-device service endpoint URL
pub fn service_url(base_url: &str, device: &DeviceDescriptor, service: &str) -> String {
    format!("{}/onvif/{}/{}", base_url.trim_end_matches('/'), device.id, service)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device() -> DeviceDescriptor {
        DeviceDescriptor::new("Porch").identity("Acme", "VC 100", "2.1")
    }

    #[test]
    fn test_device_information_fields() {
        let device = sample_device();
        let xml = device_information(&device);
        assert!(xml.contains("<tds:Manufacturer>Acme</tds:Manufacturer>"));
        assert!(xml.contains("<tds:Model>VC 100</tds:Model>"));
        assert!(xml.contains(&device.id.to_string()));
    }

    #[test]
    fn test_capabilities_point_at_per_device_endpoints() {
        let device = sample_device();
        let xml = capabilities(&device, "http://192.168.1.2:8000");
        let expected = format!("http://192.168.1.2:8000/onvif/{}/media_service", device.id);
        assert!(xml.contains(&expected));
        assert!(xml.contains("<tt:WSPullPointSupport>true</tt:WSPullPointSupport>"));
    }

    #[test]
    fn test_scopes_rendered_per_item() {
        let xml = scopes(&sample_device());
        assert!(xml.contains("onvif://www.onvif.org/name/Porch"));
        assert!(xml.contains("onvif://www.onvif.org/Profile/Streaming"));
    }

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let device = sample_device();
        let url = service_url("http://host:8000/", &device, "device_service");
        assert_eq!(url, format!("http://host:8000/onvif/{}/device_service", device.id));
    }
}
