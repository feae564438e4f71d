use std::fmt;

use zeroize::Zeroize;

use super::{KEY_LEN, aead::secure_random};
use crate::error::{Result, VaultError};

/// The vault's long-lived data key.
///
/// Generated once at setup and only ever persisted wrapped under a PIN-derived
/// key. Zeroized when dropped.
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        secure_random(&mut bytes)?;
        Ok(Self { bytes })
    }

    /// Import raw key material recovered from a wrapped envelope.
    pub(crate) fn from_slice(raw: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|_| VaultError::CorruptVault)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}
