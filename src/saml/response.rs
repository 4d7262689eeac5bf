//! SAML 1.1 SOAP responses for `/samlValidate`.

use chrono::{DateTime, Duration, DurationRound, Utc};
use quick_xml::escape::escape;

use crate::tickets::TokenSource;

pub const SOAP_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SAML_PROTOCOL_NAMESPACE: &str = "urn:oasis:names:tc:SAML:1.0:protocol";
pub const SAML_ASSERTION_NAMESPACE: &str = "urn:oasis:names:tc:SAML:1.0:assertion";
pub const AUTH_METHOD_UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:1.0:am:unspecified";
pub const CONFIRMATION_ARTIFACT: &str = "urn:oasis:names:tc:SAML:1.0:cm:artifact";

pub const ISSUER: &str = "cas-oauth2-bridge";

pub const STATUS_SUCCESS: &str = "saml1p:Success";
pub const STATUS_REQUEST_DENIED: &str = "saml1p:RequestDenied";

pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Assertions are valid for this long after issuance.
pub const ASSERTION_VALIDITY_SECS: i64 = 60;

const MESSAGE_ID_BYTES: usize = 16;

/// Builds response envelopes. Message ids come from the injected source.
pub struct SamlResponder<'a> {
    entropy: &'a dyn TokenSource,
}

impl<'a> SamlResponder<'a> {
    pub fn new(entropy: &'a dyn TokenSource) -> Self {
        Self { entropy }
    }

    /// Success envelope asserting that `subject` authenticated for `service`.
    pub fn success(&self, service: &str, subject: &str, now: DateTime<Utc>) -> String {
        let issued = truncate_to_millis(now);
        let instant = format_instant(issued);
        let not_on_or_after = format_instant(issued + Duration::seconds(ASSERTION_VALIDITY_SECS));
        let service = escape(service);
        let subject = escape(subject);

        let body = format!(
            r#"        <saml1p:Response xmlns:saml1p="{protocol_ns}" IssueInstant="{instant}" MajorVersion="1" MinorVersion="1" Recipient="{service}" ResponseID="{response_id}">
            <saml1p:Status>
                <saml1p:StatusCode Value="{status}"/>
            </saml1p:Status>
            <saml1:Assertion xmlns:saml1="{assertion_ns}" AssertionID="{assertion_id}" IssueInstant="{instant}" Issuer="{issuer}" MajorVersion="1" MinorVersion="1">
                <saml1:Conditions NotBefore="{instant}" NotOnOrAfter="{not_on_or_after}">
                    <saml1:AudienceRestrictionCondition>
                        <saml1:Audience>{service}</saml1:Audience>
                    </saml1:AudienceRestrictionCondition>
                </saml1:Conditions>
                <saml1:AuthenticationStatement AuthenticationInstant="{instant}" AuthenticationMethod="{auth_method}">
                    <saml1:Subject>
                        <saml1:NameIdentifier>{subject}</saml1:NameIdentifier>
                        <saml1:SubjectConfirmation>
                            <saml1:ConfirmationMethod>{confirmation}</saml1:ConfirmationMethod>
                        </saml1:SubjectConfirmation>
                    </saml1:Subject>
                </saml1:AuthenticationStatement>
            </saml1:Assertion>
        </saml1p:Response>
"#,
            protocol_ns = SAML_PROTOCOL_NAMESPACE,
            assertion_ns = SAML_ASSERTION_NAMESPACE,
            response_id = self.message_id(),
            assertion_id = self.message_id(),
            status = STATUS_SUCCESS,
            issuer = ISSUER,
            auth_method = AUTH_METHOD_UNSPECIFIED,
            confirmation = CONFIRMATION_ARTIFACT,
        );

        envelope(&body)
    }

    /// `RequestDenied` envelope. Carries no assertion.
    pub fn failure(&self, message: &str, now: DateTime<Utc>) -> String {
        let instant = format_instant(truncate_to_millis(now));

        let body = format!(
            r#"        <saml1p:Response xmlns:saml1p="{protocol_ns}" IssueInstant="{instant}" MajorVersion="1" MinorVersion="1" ResponseID="{response_id}">
            <saml1p:Status>
                <saml1p:StatusCode Value="{status}"/>
                <saml1p:StatusMessage>{message}</saml1p:StatusMessage>
            </saml1p:Status>
        </saml1p:Response>
"#,
            protocol_ns = SAML_PROTOCOL_NAMESPACE,
            response_id = self.message_id(),
            status = STATUS_REQUEST_DENIED,
            message = escape(message),
        );

        envelope(&body)
    }

    fn message_id(&self) -> String {
        format!("_{}", self.entropy.random_hex(MESSAGE_ID_BYTES))
    }
}

fn envelope(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <SOAP-ENV:Envelope xmlns:SOAP-ENV=\"{SOAP_NAMESPACE}\">\n    \
         <SOAP-ENV:Header/>\n    \
         <SOAP-ENV:Body>\n{body}    </SOAP-ENV:Body>\n\
         </SOAP-ENV:Envelope>"
    )
}

fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::milliseconds(1)).unwrap_or(at)
}

/// `YYYY-MM-DDTHH:MM:SS.mmmZ`
pub fn format_instant(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::request::ArtifactRequest;
    use crate::tickets::ids::SeededEntropy;
    use chrono::TimeZone;
    use quick_xml::events::Event;
    use quick_xml::Reader;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 15).unwrap() + Duration::microseconds(123_456)
    }

    /// Collect the value of `attr` on every element named `element`.
    fn attribute_values(xml: &str, element: &str, attr: &str) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        let mut values = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) | Event::Empty(e) => {
                    if e.local_name().as_ref() == element.as_bytes() {
                        for a in e.attributes().flatten() {
                            if a.key.as_ref() == attr.as_bytes() {
                                values.push(a.unescape_value().unwrap().to_string());
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        values
    }

    #[test]
    fn test_format_instant_truncates_to_millis() {
        assert_eq!(
            format_instant(truncate_to_millis(fixed_now())),
            "2024-03-01T12:30:15.123Z"
        );
    }

    #[test]
    fn test_success_envelope() {
        let entropy = SeededEntropy::new(3);
        let xml = SamlResponder::new(&entropy).success(
            "https://app.example.com/cb?a=1&b=2",
            "alice",
            fixed_now(),
        );

        assert!(xml.contains(r#"<saml1p:StatusCode Value="saml1p:Success"/>"#));
        assert!(xml.contains("<saml1:NameIdentifier>alice</saml1:NameIdentifier>"));
        assert!(xml.contains(
            "<saml1:Audience>https://app.example.com/cb?a=1&amp;b=2</saml1:Audience>"
        ));
        assert!(xml.contains(CONFIRMATION_ARTIFACT));
        assert!(xml.contains(AUTH_METHOD_UNSPECIFIED));

        assert_eq!(
            attribute_values(&xml, "Conditions", "NotBefore"),
            ["2024-03-01T12:30:15.123Z"]
        );
        assert_eq!(
            attribute_values(&xml, "Conditions", "NotOnOrAfter"),
            ["2024-03-01T12:31:15.123Z"]
        );
        assert_eq!(
            attribute_values(&xml, "Response", "Recipient"),
            ["https://app.example.com/cb?a=1&b=2"]
        );
        assert_eq!(attribute_values(&xml, "Assertion", "Issuer"), [ISSUER]);

        let response_id = attribute_values(&xml, "Response", "ResponseID");
        let assertion_id = attribute_values(&xml, "Assertion", "AssertionID");
        assert!(response_id[0].starts_with('_'));
        assert_eq!(response_id[0].len(), 1 + 2 * MESSAGE_ID_BYTES);
        assert_ne!(response_id, assertion_id);
    }

    #[test]
    fn test_failure_envelope() {
        let entropy = SeededEntropy::new(3);
        let xml = SamlResponder::new(&entropy).failure("Invalid SAML Ticket or Service", fixed_now());

        assert!(xml.contains(r#"<saml1p:StatusCode Value="saml1p:RequestDenied"/>"#));
        assert!(xml.contains("Invalid SAML Ticket or Service"));
        assert!(!xml.contains("Assertion"));
        assert_eq!(
            attribute_values(&xml, "Response", "IssueInstant"),
            ["2024-03-01T12:30:15.123Z"]
        );
    }

    #[test]
    fn test_envelopes_are_well_formed() {
        let entropy = SeededEntropy::new(5);
        let responder = SamlResponder::new(&entropy);
        for xml in [
            responder.success("https://a.example.com/", "<bob>", fixed_now()),
            responder.failure("denied", fixed_now()),
        ] {
            let mut reader = Reader::from_str(&xml);
            loop {
                match reader.read_event() {
                    Ok(Event::Eof) => break,
                    Ok(_) => {}
                    Err(e) => panic!("malformed envelope: {e}"),
                }
            }
            // No artifact in a response, so the request parser must refuse it.
            assert!(ArtifactRequest::parse(&xml).is_err());
        }
    }
}
