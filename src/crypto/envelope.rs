//! Persisted envelope formats.
//!
//! Both formats are plain JSON objects with base64 (standard alphabet,
//! padded) byte fields:
//!
//! ```text
//! PinVerifier: { "salt": b64(16), "hash": b64(32) }
//! Envelope:    { "salt"?: b64(16), "iv": b64(12), "data": b64(ciphertext || tag) }
//! ```
//!
//! `salt` is only present on envelopes sealed under a PIN-derived key.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{KEY_LEN, NONCE_LEN, SALT_LEN, TAG_LEN, aead, derive_key, generate_salt};
use crate::error::{Result, VaultError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawVerifier", into = "RawVerifier")]
pub struct PinVerifier {
    salt: [u8; SALT_LEN],
    hash: [u8; KEY_LEN],
}

#[derive(Serialize, Deserialize)]
struct RawVerifier {
    salt: String,
    hash: String,
}

impl PinVerifier {
    pub fn new(salt: [u8; SALT_LEN], hash: [u8; KEY_LEN]) -> Self {
        Self { salt, hash }
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn hash(&self) -> &[u8; KEY_LEN] {
        &self.hash
    }
}

impl TryFrom<RawVerifier> for PinVerifier {
    type Error = VaultError;

    fn try_from(raw: RawVerifier) -> Result<Self> {
        Ok(Self {
            salt: decode_fixed(&raw.salt)?,
            hash: decode_fixed(&raw.hash)?,
        })
    }
}

impl From<PinVerifier> for RawVerifier {
    fn from(verifier: PinVerifier) -> Self {
        Self {
            salt: B64.encode(verifier.salt),
            hash: B64.encode(verifier.hash),
        }
    }
}

/// Nonce and ciphertext needed to later decrypt a sealed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope", into = "RawEnvelope")]
pub struct Envelope {
    salt: Option<[u8; SALT_LEN]>,
    iv: [u8; NONCE_LEN],
    data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    iv: String,
    data: String,
}

impl Envelope {
    /// Seal `plaintext` directly under `key`.
    pub fn seal(plaintext: &[u8], key: &[u8; KEY_LEN]) -> Result<Self> {
        let (iv, data) = aead::seal(plaintext, key)?;
        Ok(Self {
            salt: None,
            iv,
            data,
        })
    }

    /// Seal `plaintext` under a key derived from `pin` and a fresh salt.
    pub fn seal_with_pin(plaintext: &[u8], pin: &str) -> Result<Self> {
        let salt = generate_salt()?;
        let key = derive_key(pin, &salt);
        let (iv, data) = aead::seal(plaintext, &key)?;
        Ok(Self {
            salt: Some(salt),
            iv,
            data,
        })
    }

    pub fn open(&self, key: &[u8; KEY_LEN]) -> Result<Zeroizing<Vec<u8>>> {
        aead::open(&self.iv, &self.data, key)
    }

    /// Re-derive the key from `pin` and the stored salt, then open.
    pub fn open_with_pin(&self, pin: &str) -> Result<Zeroizing<Vec<u8>>> {
        let salt = self.salt.ok_or(VaultError::MalformedEnvelope)?;
        let key = derive_key(pin, &salt);
        aead::open(&self.iv, &self.data, &key)
    }
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = VaultError;

    fn try_from(raw: RawEnvelope) -> Result<Self> {
        let salt = raw
            .salt
            .as_deref()
            .map(decode_fixed::<SALT_LEN>)
            .transpose()?;
        let iv = decode_fixed(&raw.iv)?;
        let data = B64
            .decode(&raw.data)
            .map_err(|_| VaultError::MalformedEnvelope)?;
        if data.len() < TAG_LEN {
            return Err(VaultError::MalformedEnvelope);
        }
        Ok(Self { salt, iv, data })
    }
}

impl From<Envelope> for RawEnvelope {
    fn from(envelope: Envelope) -> Self {
        Self {
            salt: envelope.salt.map(|s| B64.encode(s)),
            iv: B64.encode(envelope.iv),
            data: B64.encode(&envelope.data),
        }
    }
}

fn decode_fixed<const N: usize>(encoded: &str) -> Result<[u8; N]> {
    B64.decode(encoded)
        .map_err(|_| VaultError::MalformedEnvelope)?
        .try_into()
        .map_err(|_| VaultError::MalformedEnvelope)
}
