//! Lock/unlock state machine.
//!
//! A [`Session`] starts `Locked` on every process start. Only a PIN can move
//! it to `Authenticated`; the biometric gate confirms user presence but never
//! produces key material, so a PIN is still required afterwards.

use crate::backend::Backend;
use crate::biometric::{ASSERTION_TIMEOUT, ENROLLMENT_LABEL, GateError, PresenceGate};
use crate::credential::CredentialStore;
use crate::crypto::MasterKey;
use crate::error::{Result, VaultError};
use crate::pin::Pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    /// Locked, but the platform gate confirmed user presence. A PIN is still
    /// needed to unlock.
    PresenceConfirmed,
    Authenticated,
}

// The key lives only inside the authenticated variant, so it exists exactly
// while the session is authenticated.
#[derive(Debug)]
enum State {
    Locked { presence_confirmed: bool },
    Authenticated { master_key: MasterKey },
}

#[derive(Debug)]
pub struct Session {
    state: State,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: State::Locked {
                presence_confirmed: false,
            },
        }
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Locked {
                presence_confirmed: false,
            } => SessionState::Locked,
            State::Locked {
                presence_confirmed: true,
            } => SessionState::PresenceConfirmed,
            State::Authenticated { .. } => SessionState::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, State::Authenticated { .. })
    }

    /// The live master key, or `NotAuthenticated` while locked.
    pub fn master_key(&self) -> Result<&MasterKey> {
        match &self.state {
            State::Authenticated { master_key } => Ok(master_key),
            State::Locked { .. } => Err(VaultError::NotAuthenticated),
        }
    }

    /// First-time setup: provision the vault for `pin` and unlock it.
    pub fn setup_pin<B: Backend + ?Sized>(&mut self, backend: &mut B, pin: &str) -> Result<()> {
        let master_key = CredentialStore::new(backend).provision(pin)?;
        self.state = State::Authenticated { master_key };
        tracing::debug!("session authenticated after setup");
        Ok(())
    }

    /// Verify `pin` and unlock. Any failure leaves the session locked.
    pub fn unlock_with_pin<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        pin: &str,
    ) -> Result<()> {
        let result = Pin::parse(pin)
            .and_then(|pin| CredentialStore::new(backend).verify_and_unwrap(pin.as_str()));

        match result {
            Ok(master_key) => {
                self.state = State::Authenticated { master_key };
                tracing::debug!("session unlocked");
                Ok(())
            }
            Err(e) => {
                self.logout();
                tracing::warn!(error = %e, "PIN unlock failed");
                Err(e)
            }
        }
    }

    /// Run the platform user-presence check for an enrolled vault.
    ///
    /// Success only marks presence as confirmed; the session stays locked
    /// until [`Session::unlock_with_pin`] succeeds.
    pub fn unlock_with_biometric<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        gate: &dyn PresenceGate,
    ) -> Result<()> {
        if self.is_authenticated() {
            return Ok(());
        }

        let record = CredentialStore::new(backend).record()?;
        let credential_ref = match record.biometric_credential_ref() {
            Some(r) if record.biometric_enabled() && gate.is_available() => r,
            _ => return Err(VaultError::BiometricUnavailable),
        };

        gate.assert(credential_ref, ASSERTION_TIMEOUT)
            .map_err(gate_error)?;

        self.state = State::Locked {
            presence_confirmed: true,
        };
        tracing::debug!("user presence confirmed; waiting for PIN");
        Ok(())
    }

    /// Change the PIN of an unlocked vault. The master key stays the same.
    pub fn change_pin<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        current_pin: &str,
        new_pin: &str,
    ) -> Result<()> {
        self.master_key()?;
        CredentialStore::new(backend).rekey(current_pin, new_pin)
    }

    /// Enroll the platform authenticator after re-verifying `pin`.
    pub fn enable_biometric<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        gate: &dyn PresenceGate,
        pin: &str,
    ) -> Result<()> {
        self.master_key()?;
        let mut store = CredentialStore::new(backend);
        store.verify_and_unwrap(pin)?;

        if !gate.is_available() {
            return Err(VaultError::BiometricUnavailable);
        }

        let user_handle = store.record()?.user_handle().to_owned();
        let credential_ref = gate
            .enroll(&user_handle, ENROLLMENT_LABEL)
            .map_err(gate_error)?;
        store.set_biometric_enrollment(true, Some(credential_ref))?;

        tracing::info!("biometric unlock enabled");
        Ok(())
    }

    /// Drop the biometric enrollment after re-verifying `pin`.
    pub fn disable_biometric<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        pin: &str,
    ) -> Result<()> {
        self.master_key()?;
        let mut store = CredentialStore::new(backend);
        store.verify_and_unwrap(pin)?;
        store.set_biometric_enrollment(false, None)?;

        tracing::info!("biometric unlock disabled");
        Ok(())
    }

    /// Forget the master key. Safe to call when already locked.
    pub fn logout(&mut self) {
        if self.is_authenticated() {
            tracing::debug!("session locked");
        }
        self.state = State::Locked {
            presence_confirmed: false,
        };
    }
}

fn gate_error(e: GateError) -> VaultError {
    match e {
        GateError::Unavailable => VaultError::BiometricUnavailable,
        other => {
            tracing::warn!(error = %other, "biometric check failed");
            VaultError::AuthenticationFailure
        }
    }
}
