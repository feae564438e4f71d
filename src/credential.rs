//! The persisted credential record and the operations that maintain it.
//!
//! The record holds a verifier for the current PIN and the master key sealed
//! under a key derived from that same PIN. Both are always replaced together
//! in a single row write.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::crypto::{Envelope, MasterKey, PinVerifier, aead::secure_random, hash_pin, verify_pin_hash};
use crate::error::{Result, VaultError};
use crate::pin::Pin;

const USER_HANDLE_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pin_verifier: PinVerifier,
    wrapped_master_key: Envelope,
    user_handle: String,
    #[serde(default)]
    biometric_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    biometric_credential_ref: Option<String>,
    updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn user_handle(&self) -> &str {
        &self.user_handle
    }

    pub fn biometric_enabled(&self) -> bool {
        self.biometric_enabled
    }

    pub fn biometric_credential_ref(&self) -> Option<&str> {
        self.biometric_credential_ref.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Credential operations over a borrowed backend.
pub struct CredentialStore<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: Backend + ?Sized> CredentialStore<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend }
    }

    pub fn is_provisioned(&self) -> Result<bool> {
        Ok(self.backend.credential()?.is_some())
    }

    pub fn record(&self) -> Result<CredentialRecord> {
        self.backend
            .credential()?
            .ok_or(VaultError::NotProvisioned)
    }

    /// Create the vault credentials for `pin` and return the new master key.
    ///
    /// Refuses to run on a provisioned vault: a second master key would
    /// orphan every card sealed under the first.
    pub fn provision(&mut self, pin: &str) -> Result<MasterKey> {
        let pin = Pin::parse(pin)?;
        if self.is_provisioned()? {
            return Err(VaultError::AlreadyProvisioned);
        }

        let master_key = MasterKey::generate()?;
        let record = CredentialRecord {
            pin_verifier: hash_pin(pin.as_str())?,
            wrapped_master_key: Envelope::seal_with_pin(master_key.as_bytes(), pin.as_str())?,
            user_handle: mint_user_handle()?,
            biometric_enabled: false,
            biometric_credential_ref: None,
            updated_at: Utc::now(),
        };
        self.backend.put_credential(&record)?;

        tracing::info!("vault credentials provisioned");
        Ok(master_key)
    }

    /// Check `pin` against the verifier and unwrap the master key with it.
    pub fn verify_and_unwrap(&self, pin: &str) -> Result<MasterKey> {
        let record = self.record()?;
        unwrap_with(&record, pin)
    }

    /// Re-wrap the same master key under `new_pin`.
    ///
    /// Nothing is written unless `current_pin` verifies and `new_pin` is well
    /// formed.
    pub fn rekey(&mut self, current_pin: &str, new_pin: &str) -> Result<()> {
        let new_pin = Pin::parse(new_pin)?;
        let mut record = self.record()?;
        let master_key = unwrap_with(&record, current_pin)?;

        record.pin_verifier = hash_pin(new_pin.as_str())?;
        record.wrapped_master_key =
            Envelope::seal_with_pin(master_key.as_bytes(), new_pin.as_str())?;
        record.updated_at = Utc::now();
        self.backend.put_credential(&record)?;

        tracing::info!("vault PIN changed");
        Ok(())
    }

    /// Record or clear a biometric enrollment.
    ///
    /// The caller must have verified the PIN immediately before; this only
    /// updates metadata. A reference is kept only while enabled.
    pub fn set_biometric_enrollment(
        &mut self,
        enabled: bool,
        credential_ref: Option<String>,
    ) -> Result<()> {
        let mut record = self.record()?;
        record.biometric_enabled = enabled;
        record.biometric_credential_ref = if enabled { credential_ref } else { None };
        record.updated_at = Utc::now();
        self.backend.put_credential(&record)?;

        tracing::debug!(enabled, "biometric enrollment updated");
        Ok(())
    }
}

fn unwrap_with(record: &CredentialRecord, pin: &str) -> Result<MasterKey> {
    if !verify_pin_hash(pin, &record.pin_verifier) {
        return Err(VaultError::AuthenticationFailure);
    }

    // the verifier and the wrap key come from the same PIN, so a failure here
    // means the record itself is inconsistent
    let raw = record
        .wrapped_master_key
        .open_with_pin(pin)
        .map_err(|_| VaultError::CorruptVault)?;
    MasterKey::from_slice(&raw)
}

fn mint_user_handle() -> Result<String> {
    let mut handle = [0u8; USER_HANDLE_LEN];
    secure_random(&mut handle)?;
    Ok(B64.encode(handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use base64::Engine as _;

    fn provisioned(pin: &str) -> (MemoryBackend, [u8; 32]) {
        let mut backend = MemoryBackend::new();
        let key = CredentialStore::new(&mut backend).provision(pin).unwrap();
        let bytes = *key.as_bytes();
        (backend, bytes)
    }

    #[test]
    fn unprovisioned_store_reports_not_provisioned() {
        let mut backend = MemoryBackend::new();
        let store = CredentialStore::new(&mut backend);

        assert!(!store.is_provisioned().unwrap());
        assert!(matches!(
            store.verify_and_unwrap("1234"),
            Err(VaultError::NotProvisioned)
        ));
    }

    #[test]
    fn provision_then_unwrap_yields_same_key() {
        let (mut backend, key) = provisioned("1234");
        let store = CredentialStore::new(&mut backend);

        assert!(store.is_provisioned().unwrap());
        let unwrapped = store.verify_and_unwrap("1234").unwrap();
        assert_eq!(unwrapped.as_bytes(), &key);
    }

    #[test]
    fn provision_rejects_malformed_pin_without_writing() {
        for bad in ["123", "12345", "abcd", ""] {
            let mut backend = MemoryBackend::new();
            let mut store = CredentialStore::new(&mut backend);

            assert!(matches!(
                store.provision(bad),
                Err(VaultError::InvalidCredentialFormat)
            ));
            assert!(!store.is_provisioned().unwrap());
        }
    }

    #[test]
    fn provision_twice_is_refused() {
        let (mut backend, _) = provisioned("1234");
        let before = backend.credential().unwrap();

        let err = CredentialStore::new(&mut backend).provision("5678").unwrap_err();
        assert!(matches!(err, VaultError::AlreadyProvisioned));
        assert_eq!(backend.credential().unwrap(), before);
    }

    #[test]
    fn wrong_pins_never_unwrap() {
        let (mut backend, _) = provisioned("1234");
        let store = CredentialStore::new(&mut backend);

        for wrong in ["0000", "1235", "4321", "9999"] {
            assert!(matches!(
                store.verify_and_unwrap(wrong),
                Err(VaultError::AuthenticationFailure)
            ));
        }
    }

    #[test]
    fn rekey_keeps_master_key_and_swaps_pin() {
        let (mut backend, key) = provisioned("1234");
        CredentialStore::new(&mut backend)
            .rekey("1234", "4321")
            .unwrap();

        // fresh store over the same backend, as after a restart
        let store = CredentialStore::new(&mut backend);
        assert!(matches!(
            store.verify_and_unwrap("1234"),
            Err(VaultError::AuthenticationFailure)
        ));
        assert_eq!(store.verify_and_unwrap("4321").unwrap().as_bytes(), &key);
    }

    #[test]
    fn rekey_with_wrong_current_pin_changes_nothing() {
        let (mut backend, _) = provisioned("1234");
        let before = backend.credential().unwrap();

        let err = CredentialStore::new(&mut backend)
            .rekey("0000", "4321")
            .unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailure));
        assert_eq!(backend.credential().unwrap(), before);
    }

    #[test]
    fn rekey_with_malformed_new_pin_changes_nothing() {
        let (mut backend, _) = provisioned("1234");
        let before = backend.credential().unwrap();

        let err = CredentialStore::new(&mut backend)
            .rekey("1234", "12")
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidCredentialFormat));
        assert_eq!(backend.credential().unwrap(), before);
    }

    #[test]
    fn mismatched_wrapped_key_is_corrupt_vault() {
        let (mut backend, _) = provisioned("1234");
        let mut record = backend.credential().unwrap().unwrap();
        record.wrapped_master_key = Envelope::seal_with_pin(&[0u8; 32], "9999").unwrap();
        backend.put_credential(&record).unwrap();

        let store = CredentialStore::new(&mut backend);
        assert!(matches!(
            store.verify_and_unwrap("1234"),
            Err(VaultError::CorruptVault)
        ));
    }

    #[test]
    fn user_handle_is_minted_once() {
        let (mut backend, _) = provisioned("1234");
        let handle = backend.credential().unwrap().unwrap().user_handle().to_owned();
        assert_eq!(B64.decode(&handle).unwrap().len(), USER_HANDLE_LEN);

        CredentialStore::new(&mut backend)
            .rekey("1234", "4321")
            .unwrap();
        assert_eq!(backend.credential().unwrap().unwrap().user_handle(), handle);
    }

    #[test]
    fn biometric_enrollment_toggles_independently() {
        let (mut backend, key) = provisioned("1234");
        let mut store = CredentialStore::new(&mut backend);

        store
            .set_biometric_enrollment(true, Some("cred-1".into()))
            .unwrap();
        let record = store.record().unwrap();
        assert!(record.biometric_enabled());
        assert_eq!(record.biometric_credential_ref(), Some("cred-1"));

        store
            .set_biometric_enrollment(false, Some("ignored".into()))
            .unwrap();
        let record = store.record().unwrap();
        assert!(!record.biometric_enabled());
        assert_eq!(record.biometric_credential_ref(), None);

        assert_eq!(store.verify_and_unwrap("1234").unwrap().as_bytes(), &key);
    }

    #[test]
    fn record_json_uses_envelope_formats() {
        let (backend, _) = provisioned("1234");
        let record = backend.credential().unwrap().unwrap();
        let value = serde_json::to_value(&record).unwrap();

        assert!(value["pinVerifier"]["salt"].is_string());
        assert!(value["pinVerifier"]["hash"].is_string());
        assert!(value["wrappedMasterKey"]["salt"].is_string());
        assert!(value["wrappedMasterKey"]["iv"].is_string());
        assert!(value["wrappedMasterKey"]["data"].is_string());
        assert_eq!(value["biometricEnabled"], false);
    }
}
