//! SAML 1.1 artifact profile for ticket validation.

pub mod request;
pub mod response;

pub use request::{ArtifactRequest, SamlRequestError};
pub use response::SamlResponder;
