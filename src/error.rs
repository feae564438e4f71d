//! Vault error types.

use crate::card::CardId;

pub type Result<T, E = VaultError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// PIN input is not exactly [`crate::pin::PIN_LEN`] ASCII digits.
    #[error("PIN must be exactly {} digits", crate::pin::PIN_LEN)]
    InvalidCredentialFormat,

    #[error("vault is not set up; create a PIN first")]
    NotProvisioned,

    #[error("vault is already set up; reset it before creating a new PIN")]
    AlreadyProvisioned,

    /// Wrong PIN, failed decryption or a failed biometric assertion. The
    /// message is the same for all of them.
    #[error("invalid PIN or corrupted data")]
    AuthenticationFailure,

    /// The PIN verifier matched but the wrapped master key did not open.
    #[error("vault credentials are inconsistent; the vault must be reset")]
    CorruptVault,

    #[error("vault is locked")]
    NotAuthenticated,

    #[error("card {0} not found")]
    RecordNotFound(CardId),

    #[error("card {0} is corrupted")]
    CorruptRecord(CardId),

    #[error("biometric authentication is not available")]
    BiometricUnavailable,

    #[error("malformed envelope")]
    MalformedEnvelope,

    #[error("encryption failed")]
    Encryption,

    #[error("OS random generator unavailable")]
    Random,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl VaultError {
    /// Whether re-prompting the user can resolve this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VaultError::InvalidCredentialFormat
                | VaultError::AuthenticationFailure
                | VaultError::NotProvisioned
                | VaultError::BiometricUnavailable
        )
    }
}
