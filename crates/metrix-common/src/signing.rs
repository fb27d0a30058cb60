//! HMAC-SHA256 integrity header shared by agent and server.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HTTP header carrying the hex-encoded signature.
pub const HASH_HEADER: &str = "HashSHA256";

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("Signing: invalid key: {0}")]
    InvalidKey(#[from] hmac::digest::InvalidLength),

    #[error("Signing: signature is not valid hex: {0}")]
    Encoding(#[from] hex::FromHexError),

    #[error("Signing: signature mismatch")]
    Mismatch,
}

/// Keyed signer. The keyed state is built once and cloned per message.
#[derive(Clone)]
pub struct Signer {
    mac: HmacSha256,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Signer(..)")
    }
}

impl Signer {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, SigningError> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(key.as_ref())?,
        })
    }

    /// `None` when no key (or an empty one) is configured.
    pub fn from_key(key: Option<&str>) -> Result<Option<Self>, SigningError> {
        match key {
            Some(k) if !k.is_empty() => Self::new(k).map(Some),
            _ => Ok(None),
        }
    }

    /// Hex-encoded HMAC-SHA256 of `body`.
    ///
    /// ```rust
    /// use metrix_common::signing::Signer;
    ///
    /// let signer = Signer::new("secret").unwrap();
    /// let sig = signer.sign(b"payload");
    /// assert_eq!(sig.len(), 64);
    /// assert!(signer.verify(b"payload", &sig).is_ok());
    /// ```
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison against a hex signature.
    pub fn verify(&self, body: &[u8], signature: &str) -> Result<(), SigningError> {
        let expected = hex::decode(signature.trim())?;
        let mut mac = self.mac.clone();
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| SigningError::Mismatch)
    }
}
