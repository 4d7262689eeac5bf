//! CAS OAuth2 Bridge
//!
//! Speaks CAS 1.0/2.0 and SAML 1.1 ticket validation to services while
//! delegating the actual credential check to an OAuth2/OIDC identity
//! provider.

mod cas;
mod config;
mod error;
mod handlers;
mod oauth2;
mod saml;
mod service;
mod state;
mod tickets;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use config::{Args, BridgeConfig};
use oauth2::{HttpIdentityProvider, IdTokenVerifier, JwksCache, OAuth2Config};
use service::{ServiceUrlCarrier, ServiceUrlGuard};
use state::AppContext;
use tickets::{
    spawn_cleanup_task, Clock, OsEntropy, RedbTicketStore, SystemClock, TicketAuthority,
    TokenSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("{}={}", env!("CARGO_CRATE_NAME"), log_level))
        .json()
        .init();

    info!("Starting CAS OAuth2 bridge");

    let config = BridgeConfig::from_args(&args)?;

    info!(
        listen = %config.listen,
        login_rules = config.login_rules.len(),
        verify_id_token = config.oauth2.verifies_id_token(),
        "Configuration loaded"
    );

    let guard = ServiceUrlGuard::new(&config.allowed_domains);
    if guard.domains().is_empty() {
        warn!("No allowed domains configured, every service URL will be rejected");
    } else {
        info!(allowed_domains = ?guard.domains(), "Service allow-list loaded");
    }

    let store = Arc::new(
        RedbTicketStore::open(config.store_path.clone())
            .with_context(|| format!("Failed to open ticket store at {:?}", config.store_path))?,
    );
    info!(path = ?config.store_path, "Ticket store initialized");

    let entropy: Arc<dyn TokenSource> = Arc::new(OsEntropy);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    info!("Starting ticket cleanup task");
    let _cleanup_handle =
        spawn_cleanup_task(Arc::clone(&store), clock.clone(), config.cleanup_interval_secs);

    let carrier = ServiceUrlCarrier::new(
        &config.hash_key,
        &config.block_key,
        entropy.clone(),
        clock.clone(),
    )
    .context("Invalid service URL cookie keys")?;

    let verifier = build_verifier(&config.oauth2).await?;
    let idp = HttpIdentityProvider::new(config.oauth2.clone())
        .context("Failed to create identity provider client")?;

    let ctx = Arc::new(AppContext {
        authority: TicketAuthority::new(store.clone(), entropy.clone(), clock.clone()),
        store,
        guard,
        carrier,
        rules: config.login_rules,
        idp: Arc::new(idp),
        verifier,
        cookies: config.cookies,
        session: config.session,
        entropy,
        clock,
    });

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(addr = %config.listen, "Listening");

    axum::serve(listener, handlers::router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shut down");
    Ok(())
}

async fn build_verifier(config: &OAuth2Config) -> Result<IdTokenVerifier> {
    let Some(ref jwks_url) = config.jwks_url else {
        warn!("OAUTH2_JWKS_URL not set, id_token signatures will NOT be verified");
        return Ok(IdTokenVerifier::Unverified);
    };

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .context("Failed to create JWKS HTTP client")?;
    let jwks = Arc::new(JwksCache::new(
        jwks_url.clone(),
        config.jwks_refresh_secs,
        http_client,
    ));

    // The cache refetches on demand, so an unreachable provider at startup is
    // not fatal.
    if let Err(e) = jwks.prefetch().await {
        warn!(error = %e, url = %jwks_url, "Initial JWKS fetch failed");
    }

    Ok(IdTokenVerifier::Verified {
        jwks,
        audience: config.client_id.clone(),
        issuer: config.issuer.clone(),
        leeway_secs: config.clock_skew_secs,
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
