//! Authorization-code client for the upstream identity provider.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::config::OAuth2Config;

/// Token endpoint response. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub expires_in: Option<i64>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// OIDC identity token carrying the subject.
    #[serde(default)]
    pub id_token: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenResponse {
    /// A usable token has an access token and has not already expired.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && self.expires_in.is_none_or(|secs| secs >= 0)
    }
}

/// Upstream OAuth2 provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authorization endpoint URL carrying `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Trade an authorization code for tokens. One attempt, no retry.
    async fn exchange(&self, code: &str) -> Result<TokenResponse>;
}

/// `IdentityProvider` speaking to real endpoints over HTTP.
pub struct HttpIdentityProvider {
    config: OAuth2Config,
    auth_url: Url,
    http_client: reqwest::Client,
}

impl HttpIdentityProvider {
    pub fn new(config: OAuth2Config) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;

        let auth_url = Url::parse(&config.auth_url).context("Invalid OAuth2 auth_url")?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            auth_url,
            http_client,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline");
        url.into()
    }

    async fn exchange(&self, code: &str) -> Result<TokenResponse> {
        debug!(url = %self.config.token_url, "Exchanging authorization code");

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .context("Token request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Token endpoint rejected the code");
            return Err(anyhow!("token endpoint returned status {}: {}", status, body));
        }

        response
            .json::<TokenResponse>()
            .await
            .context("Failed to parse token response")
    }
}
