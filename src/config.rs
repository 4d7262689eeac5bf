//! Process configuration from command line flags and environment.

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::handlers::cookies::CookieSettings;
use crate::oauth2::OAuth2Config;
use crate::service::LoginRules;
use crate::state::SessionSettings;
use crate::tickets::DEFAULT_CLEANUP_INTERVAL_SECS;

/// Command line arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "cas-oauth2-bridge")]
#[command(about = "CAS and SAML 1.1 ticket validation backed by an OAuth2 identity provider")]
pub struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080", env = "LISTEN_ADDR")]
    pub listen: SocketAddr,

    /// Ticket database file
    #[arg(
        long,
        default_value = "/var/lib/cas-oauth2-bridge/tickets.redb",
        env = "TICKET_STORE_PATH"
    )]
    pub store_path: PathBuf,

    /// Seconds between expired-ticket sweeps
    #[arg(long, default_value_t = DEFAULT_CLEANUP_INTERVAL_SECS, env = "TICKET_CLEANUP_INTERVAL_SECS")]
    pub cleanup_interval_secs: u64,

    /// Name of the TGT cookie
    #[arg(long, default_value = "CASTGC", env = "TGT_NAME")]
    pub tgt_name: String,

    /// TGT lifetime in minutes
    #[arg(long, default_value_t = 480, env = "TGT_DURATION")]
    pub tgt_duration: i64,

    /// Domain attribute for cookies
    #[arg(long, env = "DOMAIN_SCOPE")]
    pub domain_scope: Option<String>,

    /// Comma-separated domains services may live under
    #[arg(long, default_value = "", env = "ALLOWED_DOMAINS")]
    pub allowed_domains: String,

    /// Session cookie of the protected applications, cleared on logout
    #[arg(long, default_value = "JSESSIONID", env = "JSESSION_ID")]
    pub jsession_id: String,

    /// Extra cookie cleared on logout
    #[arg(long, env = "ANOTHER_COOKIE")]
    pub another_cookie: Option<String>,

    /// Secure flag on cookies
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "TGT_SECURE")]
    pub tgt_secure: bool,

    /// HttpOnly flag on cookies
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "TGT_HTTP_ONLY")]
    pub tgt_http_only: bool,

    /// MAC key for the service URL cookie
    #[arg(long, env = "SC_HASH_KEY", hide_env_values = true)]
    pub sc_hash_key: String,

    /// AES-256 key for the service URL cookie (32 bytes raw, hex or base64)
    #[arg(long, env = "SC_BLOCK_KEY", hide_env_values = true)]
    pub sc_block_key: String,

    #[arg(long, env = "OAUTH2_CLIENT_ID")]
    pub oauth2_client_id: String,

    #[arg(long, env = "OAUTH2_CLIENT_SECRET", hide_env_values = true)]
    pub oauth2_client_secret: String,

    /// Callback URL registered with the identity provider
    #[arg(long, env = "OAUTH2_REDIRECT_URL")]
    pub oauth2_redirect_url: String,

    #[arg(long, env = "OAUTH2_AUTH_URL")]
    pub oauth2_auth_url: String,

    #[arg(long, env = "OAUTH2_TOKEN_URL")]
    pub oauth2_token_url: String,

    /// JWKS endpoint; enables id_token signature verification
    #[arg(long, env = "OAUTH2_JWKS_URL")]
    pub oauth2_jwks_url: Option<String>,

    /// Expected id_token issuer (only checked when verifying)
    #[arg(long, env = "OAUTH2_ISSUER")]
    pub oauth2_issuer: Option<String>,

    /// Post-login rules: host;action;key=value|...
    #[arg(long, default_value = "", env = "LOGIN_RULES")]
    pub login_rules: String,

    /// Enable verbose logging
    #[arg(short, long, env = "VERBOSE")]
    pub verbose: bool,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub listen: SocketAddr,
    pub store_path: PathBuf,
    pub cleanup_interval_secs: u64,
    pub allowed_domains: Vec<String>,
    pub cookies: CookieSettings,
    pub session: SessionSettings,
    pub hash_key: String,
    pub block_key: String,
    pub oauth2: OAuth2Config,
    pub login_rules: LoginRules,
}

impl BridgeConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        if args.tgt_duration <= 0 {
            bail!("TGT duration must be a positive number of minutes");
        }
        if args.tgt_name.trim().is_empty() {
            bail!("TGT cookie name must not be empty");
        }
        if args.sc_hash_key.is_empty() || args.sc_block_key.is_empty() {
            bail!("SC_HASH_KEY and SC_BLOCK_KEY are required");
        }

        let allowed_domains: Vec<String> = args
            .allowed_domains
            .split(',')
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        let oauth2 = OAuth2Config {
            client_id: args.oauth2_client_id.clone(),
            client_secret: args.oauth2_client_secret.clone(),
            redirect_url: args.oauth2_redirect_url.clone(),
            auth_url: args.oauth2_auth_url.clone(),
            token_url: args.oauth2_token_url.clone(),
            jwks_url: non_empty(&args.oauth2_jwks_url),
            issuer: non_empty(&args.oauth2_issuer),
            ..Default::default()
        };
        oauth2
            .validate()
            .map_err(|e| anyhow!(e))
            .context("Invalid OAuth2 configuration")?;

        let login_rules =
            LoginRules::parse(&args.login_rules).context("Invalid LOGIN_RULES")?;

        Ok(Self {
            listen: args.listen,
            store_path: args.store_path.clone(),
            cleanup_interval_secs: args.cleanup_interval_secs.max(1),
            allowed_domains,
            cookies: CookieSettings {
                domain: non_empty(&args.domain_scope),
                secure: args.tgt_secure,
                http_only: args.tgt_http_only,
                ..Default::default()
            },
            session: SessionSettings {
                tgt_cookie: args.tgt_name.trim().to_string(),
                tgt_duration_minutes: args.tgt_duration,
                jsession_cookie: args.jsession_id.clone(),
                another_cookie: non_empty(&args.another_cookie),
            },
            hash_key: args.sc_hash_key.clone(),
            block_key: args.sc_block_key.clone(),
            oauth2,
            login_rules,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
