//! OAuth2 authorization-code flow against the upstream identity provider.

pub mod claims;
pub mod config;
pub mod jwks;
pub mod provider;

pub use claims::IdTokenVerifier;
pub use config::OAuth2Config;
pub use jwks::JwksCache;
pub use provider::{HttpIdentityProvider, IdentityProvider, TokenResponse};
