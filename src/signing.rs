//! HMAC signing for upstream paths.
//!
//! The transform service verifies a URL-safe base64 HMAC-SHA256 over
//! `salt || path` as the first path segment. Key and salt arrive as
//! hex strings in configuration and are decoded once at startup.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::RelayError;

type HmacSha256 = Hmac<Sha256>;

/// A decoded signing credential, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct SigningKey {
    key: Vec<u8>,
    salt: Vec<u8>,
}

impl SigningKey {
    /// Decode a hex-encoded key/salt pair.
    ///
    /// Decoding failure is a configuration error; it can never occur on
    /// a request path.
    pub fn from_hex(key: &str, salt: &str) -> Result<Self, RelayError> {
        let key = hex::decode(key)
            .map_err(|e| RelayError::Config(format!("signature key is not valid hex: {}", e)))?;
        let salt = hex::decode(salt)
            .map_err(|e| RelayError::Config(format!("signature salt is not valid hex: {}", e)))?;
        Ok(Self { key, salt })
    }

    /// Sign a candidate upstream path.
    ///
    /// Pure and deterministic: HMAC-SHA256 keyed by the decoded key,
    /// updated with the salt then the raw path bytes, encoded with
    /// URL-safe base64 without padding.
    pub fn sign(&self, path: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(&self.salt);
        mac.update(path.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}
