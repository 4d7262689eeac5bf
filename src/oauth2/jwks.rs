//! Identity provider signing keys (JWKS), fetched lazily and cached.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Keys without a `kid` are stored under this name.
const UNNAMED_KID: &str = "default";

/// Cached key set with time-based and miss-triggered refresh.
pub struct JwksCache {
    keys: RwLock<KeySet>,
    refresh_interval: Duration,
    jwks_url: String,
    http_client: reqwest::Client,
}

#[derive(Default)]
struct KeySet {
    by_kid: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

/// JWKS document.
#[derive(Debug, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Individual JSON Web Key.
#[derive(Debug, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC)
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use")]
    pub key_use: Option<String>,

    // RSA parameters (base64url)
    pub n: Option<String>,
    pub e: Option<String>,

    // EC parameters
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

impl JwksCache {
    /// Nothing is fetched until the first lookup or `prefetch`.
    pub fn new(jwks_url: String, refresh_secs: u64, http_client: reqwest::Client) -> Self {
        Self {
            keys: RwLock::new(KeySet::default()),
            refresh_interval: Duration::from_secs(refresh_secs),
            jwks_url,
            http_client,
        }
    }

    pub async fn prefetch(&self) -> Result<()> {
        self.refresh().await
    }

    /// Signing key for an id_token header `kid`, or any key when absent.
    /// A miss on a named key forces one refresh before giving up.
    pub async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey> {
        if self.is_stale()? {
            self.refresh().await?;
        }

        if let Some(key) = self.lookup(kid)? {
            return Ok(key);
        }

        debug!(kid = ?kid, "Key not in cache, refreshing JWKS");
        self.refresh().await?;

        self.lookup(kid)?.ok_or_else(|| match kid {
            Some(kid) => anyhow!("Key with kid '{}' not found in JWKS", kid),
            None => anyhow!("No keys available in JWKS"),
        })
    }

    fn lookup(&self, kid: Option<&str>) -> Result<Option<DecodingKey>> {
        let keys = self.keys.read().map_err(|_| anyhow!("Lock poisoned"))?;
        Ok(match kid {
            Some(kid) => keys.by_kid.get(kid).cloned(),
            None => keys
                .by_kid
                .get(UNNAMED_KID)
                .or_else(|| keys.by_kid.values().next())
                .cloned(),
        })
    }

    fn is_stale(&self) -> Result<bool> {
        let keys = self.keys.read().map_err(|_| anyhow!("Lock poisoned"))?;
        Ok(keys
            .fetched_at
            .is_none_or(|at| at.elapsed() >= self.refresh_interval))
    }

    async fn refresh(&self) -> Result<()> {
        debug!(url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .context("Failed to fetch JWKS")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "JWKS endpoint returned status {}",
                response.status()
            ));
        }

        let jwks: Jwks = response.json().await.context("Failed to parse JWKS")?;
        let by_kid = decode_key_set(jwks)?;
        let count = by_kid.len();

        {
            let mut keys = self.keys.write().map_err(|_| anyhow!("Lock poisoned"))?;
            *keys = KeySet {
                by_kid,
                fetched_at: Some(Instant::now()),
            };
        }

        info!(url = %self.jwks_url, key_count = count, "JWKS cache refreshed");
        Ok(())
    }
}

/// Signing keys of a JWKS document keyed by `kid`. Unusable keys are skipped.
fn decode_key_set(jwks: Jwks) -> Result<HashMap<String, DecodingKey>> {
    let mut by_kid = HashMap::new();
    for jwk in jwks.keys {
        if jwk.key_use.as_deref() == Some("enc") {
            continue;
        }

        match jwk_to_decoding_key(&jwk) {
            Ok(key) => {
                let kid = jwk.kid.clone().unwrap_or_else(|| UNNAMED_KID.to_string());
                debug!(kid = %kid, kty = %jwk.kty, alg = ?jwk.alg, "Loaded JWK");
                by_kid.insert(kid, key);
            }
            Err(e) => {
                warn!(kid = ?jwk.kid, kty = %jwk.kty, error = %e, "Failed to parse JWK, skipping");
            }
        }
    }

    if by_kid.is_empty() {
        return Err(anyhow!("No valid signing keys found in JWKS"));
    }
    Ok(by_kid)
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_ref().ok_or_else(|| anyhow!("RSA key missing 'n'"))?;
            let e = jwk.e.as_ref().ok_or_else(|| anyhow!("RSA key missing 'e'"))?;

            DecodingKey::from_rsa_components(n, e).context("Failed to create RSA DecodingKey")
        }
        "EC" => {
            let x = jwk.x.as_ref().ok_or_else(|| anyhow!("EC key missing 'x'"))?;
            let y = jwk.y.as_ref().ok_or_else(|| anyhow!("EC key missing 'y'"))?;
            let crv = jwk
                .crv
                .as_ref()
                .ok_or_else(|| anyhow!("EC key missing 'crv'"))?;

            let x_bytes = URL_SAFE_NO_PAD
                .decode(x)
                .context("Failed to decode EC x coordinate")?;
            let y_bytes = URL_SAFE_NO_PAD
                .decode(y)
                .context("Failed to decode EC y coordinate")?;

            // Uncompressed point: 0x04 || x || y
            let mut point = vec![0x04];
            point.extend_from_slice(&x_bytes);
            point.extend_from_slice(&y_bytes);

            let der = ec_subject_public_key_info(&point, crv)?;
            Ok(DecodingKey::from_ec_der(&der))
        }
        kty => Err(anyhow!("Unsupported key type: {}", kty)),
    }
}

/// DER SubjectPublicKeyInfo for an EC point on P-256 or P-384.
fn ec_subject_public_key_info(point: &[u8], curve: &str) -> Result<Vec<u8>> {
    const EC_PUBLIC_KEY_OID: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];

    let curve_oid: &[u8] = match curve {
        "P-256" => &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07],
        "P-384" => &[0x2B, 0x81, 0x04, 0x00, 0x22],
        _ => return Err(anyhow!("Unsupported EC curve: {}", curve)),
    };

    let mut alg_id = vec![0x30, (4 + EC_PUBLIC_KEY_OID.len() + curve_oid.len()) as u8];
    alg_id.push(0x06);
    alg_id.push(EC_PUBLIC_KEY_OID.len() as u8);
    alg_id.extend_from_slice(EC_PUBLIC_KEY_OID);
    alg_id.push(0x06);
    alg_id.push(curve_oid.len() as u8);
    alg_id.extend_from_slice(curve_oid);

    let mut bit_string = vec![0x03];
    push_der_len(&mut bit_string, point.len() + 1);
    bit_string.push(0x00); // unused bits
    bit_string.extend_from_slice(point);

    let mut der = vec![0x30];
    push_der_len(&mut der, alg_id.len() + bit_string.len());
    der.extend_from_slice(&alg_id);
    der.extend_from_slice(&bit_string);

    Ok(der)
}

fn push_der_len(out: &mut Vec<u8>, len: usize) {
    if len < 128 {
        out.push(len as u8);
    } else {
        out.push(0x81);
        out.push(len as u8);
    }
}
