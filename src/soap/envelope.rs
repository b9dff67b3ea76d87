//! SOAP envelope parsing and rendering
//!
//! Inbound envelopes are walked with `quick-xml`; we only need local element
//! names and text content, so namespace prefixes are stripped and fields are
//! collected into a flat map keyed by local name. Responses and faults are
//! rendered from string templates matching the message shapes ONVIF clients
//! expect.

use std::collections::HashMap;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ServiceError;

/// WS-Security UsernameToken extracted from the envelope header
#[derive(Debug, Clone, Default)]
pub struct UsernameToken {
    /// Username
    pub username: String,
    /// Password element content
    pub password: String,
    /// Whether the password is a digest (Type attribute) or plain text
    pub is_digest: bool,
    /// Base64 nonce, present for digest passwords
    pub nonce: Option<String>,
    /// Created timestamp, present for digest passwords
    pub created: Option<String>,
}

/// A parsed inbound SOAP request
///
/// `operation` is the local name of the first element under `Body`; header
/// and body text fields are available by local name, first occurrence wins
/// except where noted.
#[derive(Debug, Clone)]
pub struct SoapRequest {
    /// Local name of the body operation element
    pub operation: String,
    /// Security header token, if present
    pub security: Option<UsernameToken>,
    fields: HashMap<String, Vec<String>>,
}

impl SoapRequest {
    /// Parse an envelope
    ///
    /// Fails with `InvalidRequest` when the document is not parsable XML or
    /// carries no body operation.
    pub fn parse(xml: &str) -> Result<Self, ServiceError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<String> = Vec::new();
        let mut fields: HashMap<String, Vec<String>> = HashMap::new();
        let mut operation: Option<String> = None;
        let mut body_depth: Option<usize> = None;
        let mut in_security = false;
        let mut token = UsernameToken::default();
        let mut saw_token = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();

                    if name == "Security" {
                        in_security = true;
                    }
                    if in_security && name == "Password" {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"Type" {
                                let value = String::from_utf8_lossy(&attr.value);
                                token.is_digest = value.contains("PasswordDigest");
                            }
                        }
                    }

                    // First element opened directly under Body is the operation
                    if operation.is_none() && body_depth == Some(stack.len()) {
                        operation = Some(name.clone());
                    }
                    if name == "Body" && body_depth.is_none() {
                        body_depth = Some(stack.len() + 1);
                    }

                    stack.push(name);
                }
                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    if operation.is_none() && body_depth == Some(stack.len()) {
                        operation = Some(name);
                    }
                }
                Ok(Event::End(_)) => {
                    if let Some(name) = stack.pop() {
                        if name == "Security" {
                            in_security = false;
                        }
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|_| {
                            ServiceError::InvalidRequest("unescapable text content".into())
                        })?
                        .into_owned();
                    if text.is_empty() {
                        continue;
                    }
                    if let Some(name) = stack.last() {
                        if in_security {
                            saw_token = true;
                            match name.as_str() {
                                "Username" => token.username = text.clone(),
                                "Password" => token.password = text.clone(),
                                "Nonce" => token.nonce = Some(text.clone()),
                                "Created" => token.created = Some(text.clone()),
                                _ => {}
                            }
                        }
                        fields.entry(name.clone()).or_default().push(text);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(_) => {
                    return Err(ServiceError::InvalidRequest("malformed envelope".into()));
                }
            }
        }

        let operation =
            operation.ok_or_else(|| ServiceError::InvalidRequest("empty body".into()))?;

        Ok(Self {
            operation,
            security: saw_token.then_some(token),
            fields,
        })
    }

    /// First text value for a local element name
    pub fn field(&self, local_name: &str) -> Option<&str> {
        self.fields
            .get(local_name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All text values for a local element name (e.g. repeated
    /// TopicExpression elements)
    pub fn field_all(&self, local_name: &str) -> &[String] {
        self.fields.get(local_name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Wrap a body fragment in a SOAP 1.2 envelope with the namespaces the
/// responses use
pub fn soap_response(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"
               xmlns:wsa="http://www.w3.org/2005/08/addressing"
               xmlns:wsnt="http://docs.oasis-open.org/wsn/b-2"
               xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
               xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
               xmlns:tev="http://www.onvif.org/ver10/events/wsdl"
               xmlns:tns1="http://www.onvif.org/ver10/topics"
               xmlns:tt="http://www.onvif.org/ver10/schema">
    <soap:Body>
        {}
    </soap:Body>
</soap:Envelope>"#,
        body
    )
}

/// Render the standard fault envelope for a service error
pub fn soap_fault(err: &ServiceError) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"
               xmlns:ter="http://www.onvif.org/ver10/error">
    <soap:Body>
        <soap:Fault>
            <soap:Code>
                <soap:Value>{code}</soap:Value>
                <soap:Subcode>
                    <soap:Value>{subcode}</soap:Value>
                </soap:Subcode>
            </soap:Code>
            <soap:Reason>
                <soap:Text xml:lang="en">{reason}</soap:Text>
            </soap:Reason>
        </soap:Fault>
    </soap:Body>
</soap:Envelope>"#,
        code = err.fault_code(),
        subcode = err.fault_subcode(),
        reason = xml_escape(&err.fault_reason()),
    )
}

/// Minimal text escaping for values interpolated into response templates
pub fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Parse an ISO 8601 duration as used in TerminationTime / Timeout fields
/// ("PT60S", "PT1M30S", "PT2H")
pub fn parse_iso8601_duration(value: &str) -> Option<Duration> {
    let rest = value.strip_prefix("PT").or_else(|| value.strip_prefix("pt"))?;
    let mut total = 0u64;
    let mut digits = String::new();

    for c in rest.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let amount: u64 = digits.parse().ok()?;
        digits.clear();
        match c.to_ascii_uppercase() {
            'H' => total += amount * 3600,
            'M' => total += amount * 60,
            'S' => total += amount,
            _ => return None,
        }
    }

    if !digits.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}

/// Render a duration as an ISO 8601 period ("PT60S")
pub fn format_iso8601_duration(duration: Duration) -> String {
    format!("PT{}S", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PULL_REQUEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"
            xmlns:tev="http://www.onvif.org/ver10/events/wsdl">
  <s:Header>
    <wsse:Security>
      <wsse:UsernameToken>
        <wsse:Username>admin</wsse:Username>
        <wsse:Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">ZHVtbXk=</wsse:Password>
        <wsse:Nonce>bm9uY2U=</wsse:Nonce>
        <wsse:Created>2024-01-01T00:00:00Z</wsse:Created>
      </wsse:UsernameToken>
    </wsse:Security>
  </s:Header>
  <s:Body>
    <tev:PullMessages>
      <tev:Timeout>PT5S</tev:Timeout>
      <tev:MessageLimit>10</tev:MessageLimit>
    </tev:PullMessages>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn test_parse_operation_and_fields() {
        let req = SoapRequest::parse(PULL_REQUEST).unwrap();
        assert_eq!(req.operation, "PullMessages");
        assert_eq!(req.field("Timeout"), Some("PT5S"));
        assert_eq!(req.field("MessageLimit"), Some("10"));
    }

    #[test]
    fn test_parse_security_token() {
        let req = SoapRequest::parse(PULL_REQUEST).unwrap();
        let token = req.security.unwrap();
        assert_eq!(token.username, "admin");
        assert!(token.is_digest);
        assert_eq!(token.nonce.as_deref(), Some("bm9uY2U="));
        assert_eq!(token.created.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SoapRequest::parse("not xml at all <<<").is_err());
        assert!(SoapRequest::parse("<a><b/></a>").is_err());
    }

    #[test]
    fn test_fault_envelope_shape() {
        let fault = soap_fault(&ServiceError::NotAuthorized);
        assert!(fault.contains("<soap:Fault>"));
        assert!(fault.contains("ter:NotAuthorized"));
        assert!(fault.contains("Authentication failed"));
    }

    #[test]
    fn test_iso8601_durations() {
        assert_eq!(parse_iso8601_duration("PT60S"), Some(Duration::from_secs(60)));
        assert_eq!(parse_iso8601_duration("PT1M30S"), Some(Duration::from_secs(90)));
        assert_eq!(parse_iso8601_duration("PT2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_iso8601_duration("60"), None);
        assert_eq!(format_iso8601_duration(Duration::from_secs(60)), "PT60S");
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape(r#"a<b>&"c""#), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
