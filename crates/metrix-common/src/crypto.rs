//! RSA PKCS#1 v1.5 payload encryption.
//!
//! The agent encrypts each serialized metric with the collector's public key;
//! the server decrypts with the matching private key. Payloads are a single
//! RSA block, so a key must be wide enough for one JSON record.

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Crypto: failed to read key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Crypto: key is not a valid PEM {kind} key")]
    InvalidKey { kind: &'static str },

    #[error("Crypto: {0}")]
    Rsa(#[from] rsa::Error),
}

fn read_pem(path: &Path) -> Result<String, CryptoError> {
    std::fs::read_to_string(path).map_err(|source| CryptoError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[derive(Debug, Clone)]
pub struct PayloadEncryptor {
    key: RsaPublicKey,
}

impl PayloadEncryptor {
    /// Accepts an SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|_| CryptoError::InvalidKey { kind: "public" })?;
        Ok(Self { key })
    }

    pub fn from_file(path: &Path) -> Result<Self, CryptoError> {
        Self::from_pem(&read_pem(path)?)
    }

    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut rng = rand::thread_rng();
        Ok(self.key.encrypt(&mut rng, Pkcs1v15Encrypt, plain)?)
    }
}

#[derive(Debug, Clone)]
pub struct PayloadDecryptor {
    key: RsaPrivateKey,
}

impl PayloadDecryptor {
    /// Accepts a PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| CryptoError::InvalidKey { kind: "private" })?;
        Ok(Self { key })
    }

    pub fn from_file(path: &Path) -> Result<Self, CryptoError> {
        Self::from_pem(&read_pem(path)?)
    }

    pub fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.key.decrypt(Pkcs1v15Encrypt, cipher)?)
    }
}
