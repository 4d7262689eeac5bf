//! OAuth2 client configuration.

use serde::{Deserialize, Serialize};

/// Client registration at the upstream identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuth2Config {
    pub client_id: String,

    pub client_secret: String,

    /// Callback URL registered with the provider (our `/oauth2/callback`).
    pub redirect_url: String,

    /// Authorization endpoint.
    pub auth_url: String,

    /// Token endpoint.
    pub token_url: String,

    /// Scopes requested on every authorization redirect.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// JWKS endpoint. When set, id_token signatures are verified.
    #[serde(default)]
    pub jwks_url: Option<String>,

    /// Expected id_token issuer. Only checked when verifying.
    #[serde(default)]
    pub issuer: Option<String>,

    #[serde(default = "default_jwks_refresh")]
    pub jwks_refresh_secs: u64,

    /// Clock skew tolerance in seconds for exp/nbf validation.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,

    /// Timeout for token and JWKS requests.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "profile".to_string(), "email".to_string()]
}

fn default_jwks_refresh() -> u64 {
    3600 // 1 hour
}

fn default_clock_skew() -> u64 {
    30
}

fn default_http_timeout() -> u64 {
    10
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: String::new(),
            auth_url: String::new(),
            token_url: String::new(),
            scopes: default_scopes(),
            jwks_url: None,
            issuer: None,
            jwks_refresh_secs: default_jwks_refresh(),
            clock_skew_secs: default_clock_skew(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl OAuth2Config {
    pub fn verifies_id_token(&self) -> bool {
        self.jwks_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.is_empty() {
            return Err("OAuth2 client_id is required".to_string());
        }

        if self.client_secret.is_empty() {
            return Err("OAuth2 client_secret is required".to_string());
        }

        for (name, value) in [
            ("redirect_url", &self.redirect_url),
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
        ] {
            if value.is_empty() {
                return Err(format!("OAuth2 {} is required", name));
            }
            if url::Url::parse(value).is_err() {
                return Err(format!("OAuth2 {} must be an absolute URL", name));
            }
        }

        if let Some(ref jwks_url) = self.jwks_url {
            if !jwks_url.is_empty()
                && !jwks_url.starts_with("https://")
                && !jwks_url.starts_with("http://")
            {
                return Err("OAuth2 jwks_url must be a valid HTTP(S) URL".to_string());
            }
        }

        if self.scopes.is_empty() {
            return Err("at least one OAuth2 scope is required".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> OAuth2Config {
        OAuth2Config {
            client_id: "bridge".to_string(),
            client_secret: "s3cret".to_string(),
            redirect_url: "https://cas.example.com/oauth2/callback".to_string(),
            auth_url: "https://idp.example.com/authorize".to_string(),
            token_url: "https://idp.example.com/token".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = OAuth2Config::default();
        assert_eq!(config.scopes, vec!["openid", "profile", "email"]);
        assert_eq!(config.jwks_refresh_secs, 3600);
        assert_eq!(config.clock_skew_secs, 30);
        assert!(!config.verifies_id_token());
    }

    #[test]
    fn test_validation() {
        assert!(OAuth2Config::default().validate().is_err());
        assert!(valid_config().validate().is_ok());

        let mut config = valid_config();
        config.token_url = "/token".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.jwks_url = Some("ftp://idp.example.com/jwks".to_string());
        assert!(config.validate().is_err());

        config.jwks_url = Some("https://idp.example.com/jwks".to_string());
        assert!(config.validate().is_ok());
        assert!(config.verifies_id_token());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: OAuth2Config = serde_json::from_str(
            r#"{
                "client_id": "bridge",
                "client_secret": "s3cret",
                "redirect_url": "https://cas.example.com/oauth2/callback",
                "auth_url": "https://idp.example.com/authorize",
                "token_url": "https://idp.example.com/token"
            }"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_timeout_secs, 10);
    }
}
