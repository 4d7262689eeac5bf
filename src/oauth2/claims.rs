//! Subject extraction from the id_token of a token response.
//!
//! Two modes:
//! - `Unverified` reads the claims without checking the signature, trusting
//!   the TLS channel to the token endpoint.
//! - `Verified` checks the signature against the provider JWKS, plus expiry,
//!   audience (client id) and, when configured, issuer.

use anyhow::{anyhow, Context, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::jwks::JwksCache;
use super::provider::TokenResponse;

/// Signature algorithms accepted from a provider key set.
const ASYMMETRIC_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: Option<String>,
    iss: Option<String>,
    email: Option<String>,
}

pub enum IdTokenVerifier {
    Unverified,
    Verified {
        jwks: Arc<JwksCache>,
        audience: String,
        issuer: Option<String>,
        leeway_secs: u64,
    },
}

impl IdTokenVerifier {
    pub fn is_verifying(&self) -> bool {
        matches!(self, IdTokenVerifier::Verified { .. })
    }

    /// The `sub` claim of the response's id_token.
    pub async fn extract_subject(&self, token: &TokenResponse) -> Result<String> {
        let id_token = token
            .id_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("No id_token field in token response"))?;

        let claims = match self {
            IdTokenVerifier::Unverified => decode_unverified(id_token)?,
            IdTokenVerifier::Verified {
                jwks,
                audience,
                issuer,
                leeway_secs,
            } => decode_verified(id_token, jwks, audience, issuer.as_deref(), *leeway_secs).await?,
        };

        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Claim 'sub' does not exist"))?;

        debug!(
            subject = %subject,
            iss = ?claims.iss,
            email = ?claims.email,
            verified = self.is_verifying(),
            "Subject extracted from id_token"
        );
        Ok(subject)
    }
}

fn decode_unverified(id_token: &str) -> Result<IdTokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<IdTokenClaims>(id_token, &DecodingKey::from_secret(&[]), &validation)
        .context("Claims could not be parsed")?;
    Ok(data.claims)
}

async fn decode_verified(
    id_token: &str,
    jwks: &JwksCache,
    audience: &str,
    issuer: Option<&str>,
    leeway_secs: u64,
) -> Result<IdTokenClaims> {
    let header = decode_header(id_token).context("Failed to decode id_token header")?;
    if !ASYMMETRIC_ALGORITHMS.contains(&header.alg) {
        return Err(anyhow!("Unsupported id_token algorithm: {:?}", header.alg));
    }

    let key = jwks.key_for(header.kid.as_deref()).await?;

    let mut validation = Validation::new(header.alg);
    validation.leeway = leeway_secs;
    validation.set_audience(&[audience]);
    match issuer {
        Some(issuer) => {
            validation.set_issuer(&[issuer]);
            validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        }
        None => validation.set_required_spec_claims(&["exp", "aud"]),
    }

    let data = decode::<IdTokenClaims>(id_token, &key, &validation)
        .context("id_token validation failed")?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token_with(id_token: Option<String>) -> TokenResponse {
        TokenResponse {
            access_token: "at".to_string(),
            id_token,
            ..Default::default()
        }
    }

    fn signed(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"idp-secret"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unverified_subject() {
        let id_token = signed(json!({"sub": "alice", "iss": "https://idp.example.com", "aud": "x"}));
        let subject = IdTokenVerifier::Unverified
            .extract_subject(&token_with(Some(id_token)))
            .await
            .unwrap();
        assert_eq!(subject, "alice");
    }

    #[tokio::test]
    async fn test_unverified_ignores_expiry() {
        let id_token = signed(json!({"sub": "bob", "exp": 1}));
        let subject = IdTokenVerifier::Unverified
            .extract_subject(&token_with(Some(id_token)))
            .await
            .unwrap();
        assert_eq!(subject, "bob");
    }

    #[tokio::test]
    async fn test_missing_id_token() {
        let result = IdTokenVerifier::Unverified
            .extract_subject(&token_with(None))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_subject() {
        let id_token = signed(json!({"email": "carol@example.com"}));
        let result = IdTokenVerifier::Unverified
            .extract_subject(&token_with(Some(id_token)))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_garbage_id_token() {
        let result = IdTokenVerifier::Unverified
            .extract_subject(&token_with(Some("not-a-jwt".to_string())))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_verified_rejects_symmetric_algorithms() {
        let jwks = Arc::new(JwksCache::new(
            "http://127.0.0.1:9/jwks".to_string(),
            3600,
            reqwest::Client::new(),
        ));
        let verifier = IdTokenVerifier::Verified {
            jwks,
            audience: "bridge".to_string(),
            issuer: None,
            leeway_secs: 30,
        };
        assert!(verifier.is_verifying());

        let id_token = signed(json!({"sub": "mallory", "aud": "bridge", "exp": 4_102_444_800u64}));
        let err = verifier
            .extract_subject(&token_with(Some(id_token)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported id_token algorithm"));
    }
}
