//! Encrypted carrier for the pending service URL.
//!
//! The URL rides in a cookie across the identity provider round-trip. Token
//! layout before base64url encoding:
//!
//! ```text
//! issued_at (8, big-endian unix secs) | nonce (12) | AES-256-GCM ciphertext | HMAC-SHA256 (32)
//! ```
//!
//! The MAC is keyed with the hash key and covers the cookie name followed by
//! everything before the tag, so a token minted for one cookie is useless in
//! another. Decryption fails closed: any defect yields an error and never a
//! fallback URL.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;

use crate::tickets::{Clock, TokenSource};

type HmacSha256 = Hmac<Sha256>;

/// Cookie that carries the encrypted service URL.
pub const SERVICE_URL_COOKIE: &str = "serviceURL";

/// Lifetime of the carrier cookie and of the token inside it.
pub const SERVICE_URL_MAX_AGE_SECS: i64 = 3600;

const TIMESTAMP_LEN: usize = 8;
const NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
const MAC_LEN: usize = 32;
const CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CarrierError {
    #[error("invalid carrier key: {0}")]
    InvalidKey(String),

    #[error("token is not valid base64url or is truncated")]
    Malformed,

    #[error("token MAC does not verify")]
    BadMac,

    #[error("token is outside its validity window")]
    Expired,

    #[error("token could not be decrypted")]
    Decrypt,
}

pub struct ServiceUrlCarrier {
    cookie_name: String,
    hash_key: Vec<u8>,
    cipher: Aes256Gcm,
    entropy: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
}

impl ServiceUrlCarrier {
    /// `hash_key` authenticates tokens; `block_key` must decode (hex, base64,
    /// base64url, or raw) to exactly 32 bytes.
    pub fn new(
        hash_key: &str,
        block_key: &str,
        entropy: Arc<dyn TokenSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CarrierError> {
        if hash_key.is_empty() {
            return Err(CarrierError::InvalidKey("hash key must not be empty".to_string()));
        }
        let block_key = decode_block_key(block_key)?;

        Ok(Self {
            cookie_name: SERVICE_URL_COOKIE.to_string(),
            hash_key: hash_key.as_bytes().to_vec(),
            cipher: Aes256Gcm::new((&block_key).into()),
            entropy,
            clock,
        })
    }

    pub fn encrypt(&self, url: &str) -> Result<String, CarrierError> {
        let issued_at = self.clock.now().timestamp();
        let mut nonce = [0u8; NONCE_LEN];
        self.entropy.fill(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), url.as_bytes())
            .map_err(|_| CarrierError::Decrypt)?;

        let mut out = Vec::with_capacity(TIMESTAMP_LEN + NONCE_LEN + ciphertext.len() + MAC_LEN);
        out.extend_from_slice(&issued_at.to_be_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);

        let tag = self.mac(&out)?.finalize().into_bytes();
        out.extend_from_slice(&tag);

        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CarrierError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| CarrierError::Malformed)?;

        if raw.len() < TIMESTAMP_LEN + NONCE_LEN + GCM_TAG_LEN + MAC_LEN {
            return Err(CarrierError::Malformed);
        }

        let (body, tag) = raw.split_at(raw.len() - MAC_LEN);
        self.mac(body)?
            .verify_slice(tag)
            .map_err(|_| CarrierError::BadMac)?;

        let (timestamp, rest) = body.split_at(TIMESTAMP_LEN);
        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(timestamp);
        let age = self.clock.now().timestamp() - i64::from_be_bytes(ts);
        if !(-CLOCK_SKEW_SECS..=SERVICE_URL_MAX_AGE_SECS).contains(&age) {
            return Err(CarrierError::Expired);
        }

        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CarrierError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CarrierError::Decrypt)
    }

    fn mac(&self, body: &[u8]) -> Result<HmacSha256, CarrierError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.hash_key)
            .map_err(|e| CarrierError::InvalidKey(e.to_string()))?;
        mac.update(self.cookie_name.as_bytes());
        mac.update(b"|");
        mac.update(body);
        Ok(mac)
    }
}

fn decode_block_key(secret: &str) -> Result<[u8; 32], CarrierError> {
    let value = secret.trim();

    let candidates = [
        hex::decode(value).ok(),
        STANDARD.decode(value).ok(),
        URL_SAFE.decode(value).ok(),
        STANDARD_NO_PAD.decode(value).ok(),
        URL_SAFE_NO_PAD.decode(value).ok(),
        Some(value.as_bytes().to_vec()),
    ];

    for candidate in candidates.into_iter().flatten() {
        if candidate.len() == 32 {
            let mut key = [0u8; 32];
            key.copy_from_slice(&candidate);
            return Ok(key);
        }
    }

    Err(CarrierError::InvalidKey(
        "block key must be 32 bytes (raw, hex, base64 or base64url)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::clock::ManualClock;
    use crate::tickets::ids::SeededEntropy;
    use chrono::{Duration, Utc};

    const HASH_KEY: &str = "a-long-enough-hash-key-for-hmac-sha256";
    const BLOCK_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn carrier() -> (ServiceUrlCarrier, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let carrier = ServiceUrlCarrier::new(
            HASH_KEY,
            BLOCK_KEY,
            Arc::new(SeededEntropy::new(1)),
            clock.clone(),
        )
        .unwrap();
        (carrier, clock)
    }

    #[test]
    fn test_round_trip() {
        let (carrier, _) = carrier();
        for url in [
            "https://app.example.com/",
            "https://app.example.com/path?a=1&b=two#frag",
            "",
        ] {
            let token = carrier.encrypt(url).unwrap();
            assert_eq!(carrier.decrypt(&token).unwrap(), url);
        }
    }

    #[test]
    fn test_token_hides_plaintext() {
        let (carrier, _) = carrier();
        let token = carrier.encrypt("https://secret.example.com/").unwrap();
        assert!(!token.contains("secret"));
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_tampering_fails_closed() {
        let (carrier, _) = carrier();
        let token = carrier.encrypt("https://app.example.com/").unwrap();
        let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();

        for index in [0, TIMESTAMP_LEN + 1, raw.len() / 2, raw.len() - 1] {
            let mut tampered = raw.clone();
            tampered[index] ^= 0x01;
            let result = carrier.decrypt(&URL_SAFE_NO_PAD.encode(&tampered));
            assert_eq!(result, Err(CarrierError::BadMac));
        }

        raw.truncate(20);
        assert_eq!(
            carrier.decrypt(&URL_SAFE_NO_PAD.encode(&raw)),
            Err(CarrierError::Malformed)
        );
        assert_eq!(carrier.decrypt("not base64 !!"), Err(CarrierError::Malformed));
        assert_eq!(carrier.decrypt(""), Err(CarrierError::Malformed));
    }

    #[test]
    fn test_other_keys_cannot_decrypt() {
        let (carrier, _) = carrier();
        let token = carrier.encrypt("https://app.example.com/").unwrap();

        let other = ServiceUrlCarrier::new(
            "a-different-hash-key",
            BLOCK_KEY,
            Arc::new(SeededEntropy::new(1)),
            Arc::new(ManualClock::new(Utc::now())),
        )
        .unwrap();
        assert_eq!(other.decrypt(&token), Err(CarrierError::BadMac));
    }

    #[test]
    fn test_token_expires() {
        let (carrier, clock) = carrier();
        let token = carrier.encrypt("https://app.example.com/").unwrap();

        clock.advance(Duration::seconds(SERVICE_URL_MAX_AGE_SECS));
        assert!(carrier.decrypt(&token).is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(carrier.decrypt(&token), Err(CarrierError::Expired));
    }

    #[test]
    fn test_block_key_formats() {
        let raw = [7u8; 32];
        assert_eq!(decode_block_key(&hex::encode(raw)).unwrap(), raw);
        assert_eq!(decode_block_key(&STANDARD.encode(raw)).unwrap(), raw);
        assert_eq!(decode_block_key(&URL_SAFE_NO_PAD.encode(raw)).unwrap(), raw);
        assert_eq!(
            decode_block_key("abcdefghijklmnopqrstuvwxyz012345").unwrap(),
            *b"abcdefghijklmnopqrstuvwxyz012345"
        );
        assert!(decode_block_key("too-short").is_err());
    }

    #[test]
    fn test_empty_hash_key_rejected() {
        let result = ServiceUrlCarrier::new(
            "",
            BLOCK_KEY,
            Arc::new(SeededEntropy::new(1)),
            Arc::new(ManualClock::new(Utc::now())),
        );
        assert!(matches!(result, Err(CarrierError::InvalidKey(_))));
    }
}
