//! SAML 1.1 artifact request parsing.
//!
//! CAS clients post a SOAP envelope whose `samlp:Request` carries the
//! service ticket as its `AssertionArtifact`.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamlRequestError {
    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("request has no AssertionArtifact")]
    MissingArtifact,
}

/// The parts of an artifact request the bridge acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub artifact: String,
    pub request_id: Option<String>,
}

impl ArtifactRequest {
    pub fn parse(xml: &str) -> Result<Self, SamlRequestError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut artifact: Option<String> = None;
        let mut request_id = None;
        let mut in_artifact = false;
        let mut saw_element = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    saw_element = true;
                    let name = e.local_name();
                    match std::str::from_utf8(name.as_ref()).unwrap_or("") {
                        "Request" => {
                            for attr in e.attributes().flatten() {
                                if attr.key.local_name().as_ref() == b"RequestID" {
                                    request_id =
                                        Some(attr.unescape_value().unwrap_or_default().to_string());
                                }
                            }
                        }
                        "AssertionArtifact" if artifact.is_none() => {
                            in_artifact = true;
                        }
                        _ => {}
                    }
                }
                Ok(Event::Text(e)) => {
                    if in_artifact {
                        let text = e
                            .unescape()
                            .map_err(|err| SamlRequestError::Xml(err.to_string()))?;
                        artifact
                            .get_or_insert_with(String::new)
                            .push_str(text.trim());
                    }
                }
                Ok(Event::End(e)) => {
                    if e.local_name().as_ref() == b"AssertionArtifact" {
                        in_artifact = false;
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(SamlRequestError::Xml(e.to_string())),
                _ => {}
            }
        }

        if !saw_element {
            return Err(SamlRequestError::Xml("document has no root element".to_string()));
        }

        match artifact {
            Some(artifact) if !artifact.is_empty() => Ok(Self {
                artifact,
                request_id,
            }),
            _ => Err(SamlRequestError::MissingArtifact),
        }
    }
}
