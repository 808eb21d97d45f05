//! Signed URLs for objects served by the application itself.
//!
//! URL form: `{base_url}/{key}?expires={unix_ts}&signature={hex}` where the
//! signature is HMAC-SHA256(secret, "{key}\n{expires}").

use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

// Path-segment unsafe characters; '/' separates segments and is kept.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature is malformed")]
    Malformed,
    #[error("signature does not match")]
    Mismatch,
    #[error("signed URL has expired")]
    Expired,
}

/// Issues and verifies signed object URLs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, key: &str, expires: u64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    /// Hex signature over `key` and the absolute expiry.
    pub fn signature(&self, key: &str, expires: u64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    /// Build the signed URL for `key`, valid for `ttl` from `now`.
    pub fn signed_url_at(&self, base_url: &str, key: &str, ttl: Duration, now: SystemTime) -> String {
        let expires = now
            .checked_add(ttl)
            .unwrap_or(now)
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        format!(
            "{}/{}?expires={}&signature={}",
            base_url.trim_end_matches('/'),
            utf8_percent_encode(key, SEGMENT),
            expires,
            self.signature(key, expires)
        )
    }

    pub fn signed_url(&self, base_url: &str, key: &str, ttl: Duration) -> String {
        self.signed_url_at(base_url, key, ttl, SystemTime::now())
    }

    /// Check a presented signature in constant time, then the expiry.
    pub fn verify_at(
        &self,
        key: &str,
        expires: u64,
        signature: &str,
        now: SystemTime,
    ) -> Result<(), SignatureError> {
        let tag = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;
        self.mac(key, expires)
            .verify_slice(&tag)
            .map_err(|_| SignatureError::Mismatch)?;

        let now = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        if now > expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    pub fn verify_signed_access(
        &self,
        key: &str,
        expires: u64,
        signature: &str,
    ) -> Result<(), SignatureError> {
        self.verify_at(key, expires, signature, SystemTime::now())
    }
}
