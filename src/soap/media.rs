//! Media service operations
//!
//! Profile listings and stream address resolution. GetStreamUri goes through
//! the stream proxy so clients always receive a relay address, never the
//! upstream URL.

use crate::error::ServiceError;
use crate::proxy::StreamProxy;
use crate::registry::{DeviceDescriptor, StreamProfile};

use super::envelope::xml_escape;

/// GetProfiles response listing every profile of the device
pub fn profiles(device: &DeviceDescriptor) -> String {
    let entries: String = device.profiles.iter().map(|p| profile_entry(p)).collect();
    format!("<trt:GetProfilesResponse>\n{entries}</trt:GetProfilesResponse>")
}

fn profile_entry(profile: &StreamProfile) -> String {
    let encoding = profile.encoding_hint.as_deref().unwrap_or("H264");
    format!(
        r#"    <trt:Profiles token="{token}" fixed="true">
        <tt:Name>{name}</tt:Name>
        <tt:VideoSourceConfiguration token="VideoSourceConfig_1">
            <tt:Name>VideoSourceConfig</tt:Name>
            <tt:UseCount>1</tt:UseCount>
            <tt:SourceToken>VideoSource_1</tt:SourceToken>
            <tt:Bounds x="0" y="0" width="1920" height="1080"/>
        </tt:VideoSourceConfiguration>
        <tt:VideoEncoderConfiguration token="VideoEncoder_{name}">
            <tt:Name>VideoEncoder_{name}</tt:Name>
            <tt:UseCount>1</tt:UseCount>
            <tt:Encoding>{encoding}</tt:Encoding>
            <tt:Resolution>
                <tt:Width>1920</tt:Width>
                <tt:Height>1080</tt:Height>
            </tt:Resolution>
        </tt:VideoEncoderConfiguration>
    </trt:Profiles>
"#,
        token = xml_escape(&profile.token()),
        name = xml_escape(&profile.label),
        encoding = xml_escape(encoding),
    )
}

/// GetStreamUri response
///
/// Resolution only; the relay session opens when a client connects.
pub async fn stream_uri(
    proxy: &StreamProxy,
    device: &DeviceDescriptor,
    profile_token: Option<&str>,
) -> Result<String, ServiceError> {
    let token =
        profile_token.ok_or_else(|| ServiceError::InvalidRequest("missing ProfileToken".into()))?;
    let uri = proxy.resolve_uri(device.id, token).await?;

    Ok(format!(
        r#"<trt:GetStreamUriResponse>
    <trt:MediaUri>
        <tt:Uri>{uri}</tt:Uri>
        <tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>
        <tt:InvalidAfterReboot>false</tt:InvalidAfterReboot>
        <tt:Timeout>PT60S</tt:Timeout>
    </trt:MediaUri>
</trt:GetStreamUriResponse>"#,
        uri = xml_escape(&uri),
    ))
}

/// GetSnapshotUri response
///
/// Snapshots are served over the same relay host as still-frame requests.
pub fn snapshot_uri(
    device: &DeviceDescriptor,
    base_url: &str,
    profile_token: Option<&str>,
) -> Result<String, ServiceError> {
    let token =
        profile_token.ok_or_else(|| ServiceError::InvalidRequest("missing ProfileToken".into()))?;
    let profile = device
        .find_profile_by_token(token)
        .ok_or_else(|| ServiceError::NotFound("Profile".into()))?;

    Ok(format!(
        r#"<trt:GetSnapshotUriResponse>
    <trt:MediaUri>
        <tt:Uri>{base}/onvif/{device}/snapshot/{profile}</tt:Uri>
        <tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>
        <tt:InvalidAfterReboot>false</tt:InvalidAfterReboot>
        <tt:Timeout>PT60S</tt:Timeout>
    </trt:MediaUri>
</trt:GetSnapshotUriResponse>"#,
        base = base_url.trim_end_matches('/'),
        device = device.id,
        profile = xml_escape(&profile.label),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyConfig;
    use crate::registry::DeviceRegistry;
    use std::sync::Arc;

    fn sample_device() -> DeviceDescriptor {
        DeviceDescriptor::new("Porch")
            .profile(StreamProfile::new("main", "rtsp://10.0.0.5:554/ch0"))
            .profile(StreamProfile::new("sub", "rtsp://10.0.0.5:554/ch1").encoding_hint("H265"))
    }

    #[test]
    fn test_profiles_lists_all_tokens() {
        let xml = profiles(&sample_device());
        assert!(xml.contains(r#"token="Profile_main""#));
        assert!(xml.contains(r#"token="Profile_sub""#));
        assert!(xml.contains("<tt:Encoding>H265</tt:Encoding>"));
    }

    #[tokio::test]
    async fn test_stream_uri_resolves_through_proxy() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = sample_device();
        registry.create(device.clone()).await.unwrap();
        let proxy = StreamProxy::with_config(
            Arc::clone(&registry),
            ProxyConfig::default().advertised_host("192.168.1.2"),
        );

        let xml = stream_uri(&proxy, &device, Some("Profile_main")).await.unwrap();
        assert!(xml.contains(&format!(
            "rtsp://192.168.1.2:8554/stream/{}/main",
            device.id
        )));
        assert!(xml.contains("<tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>"));

        let err = stream_uri(&proxy, &device, None).await;
        assert!(matches!(err, Err(ServiceError::InvalidRequest(_))));
    }

    #[test]
    fn test_snapshot_uri_unknown_profile() {
        let device = sample_device();
        let err = snapshot_uri(&device, "http://host:8000", Some("Profile_missing"));
        assert!(matches!(err, Err(ServiceError::NotFound(_))));
    }
}
