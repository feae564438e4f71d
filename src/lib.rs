mod backend;
mod biometric;
mod card;
mod credential;
pub mod crypto;
mod error;
mod pin;
mod records;
mod session;

pub use crate::backend::{Backend, CardRow, FileBackend, MemoryBackend, Profile};
pub use crate::biometric::{GateError, NoAuthenticator, PresenceGate};
pub use crate::card::{Card, CardDetails, CardDraft, CardId, CardType, masked};
pub use crate::credential::{CredentialRecord, CredentialStore};
pub use crate::crypto::{Envelope, MasterKey, PinVerifier};
pub use crate::error::{Result, VaultError};
pub use crate::pin::PIN_LEN;
pub use crate::records::CardStore;
pub use crate::session::{Session, SessionState};

use chrono::Utc;
use directories::ProjectDirs;

/// A card vault: one backend and the single session that guards it.
pub struct CardVault<B: Backend> {
    backend: B,
    session: Session,
}

impl<B: Backend> CardVault<B> {
    /// Wrap a backend. The session always starts locked.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_provisioned(&self) -> Result<bool> {
        Ok(self.backend.credential()?.is_some())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn setup_pin(&mut self, pin: &str) -> Result<()> {
        self.session.setup_pin(&mut self.backend, pin)
    }

    pub fn unlock_with_pin(&mut self, pin: &str) -> Result<()> {
        self.session.unlock_with_pin(&mut self.backend, pin)
    }

    pub fn unlock_with_biometric(&mut self, gate: &dyn PresenceGate) -> Result<()> {
        self.session.unlock_with_biometric(&mut self.backend, gate)
    }

    pub fn change_pin(&mut self, current_pin: &str, new_pin: &str) -> Result<()> {
        self.session
            .change_pin(&mut self.backend, current_pin, new_pin)
    }

    pub fn biometric_enabled(&self) -> Result<bool> {
        Ok(self
            .backend
            .credential()?
            .is_some_and(|record| record.biometric_enabled()))
    }

    pub fn enable_biometric(&mut self, gate: &dyn PresenceGate, pin: &str) -> Result<()> {
        self.session
            .enable_biometric(&mut self.backend, gate, pin)
    }

    pub fn disable_biometric(&mut self, pin: &str) -> Result<()> {
        self.session.disable_biometric(&mut self.backend, pin)
    }

    pub fn logout(&mut self) {
        self.session.logout();
    }

    pub fn save_card(&mut self, draft: CardDraft) -> Result<Card> {
        CardStore::new(&mut self.backend).save(draft, &self.session)
    }

    pub fn cards(&mut self, filter: Option<CardType>) -> Result<Vec<Card>> {
        CardStore::new(&mut self.backend).load_all(&self.session, filter)
    }

    pub fn card(&mut self, id: CardId) -> Result<Card> {
        CardStore::new(&mut self.backend).load_one(id, &self.session)
    }

    pub fn delete_card(&mut self, id: CardId) -> Result<()> {
        CardStore::new(&mut self.backend).delete(id)
    }

    pub fn profile(&self) -> Result<Profile> {
        Ok(self.backend.profile()?.unwrap_or_default())
    }

    pub fn save_profile(&mut self, name: &str, email: &str) -> Result<Profile> {
        let profile = Profile {
            name: name.to_owned(),
            email: email.to_owned(),
            updated_at: Some(Utc::now()),
        };
        self.backend.put_profile(&profile)?;
        Ok(profile)
    }

    /// Wipe every table and lock. The only way to re-provision.
    pub fn reset(&mut self) -> Result<()> {
        self.session.logout();
        self.backend.clear()?;
        tracing::info!("vault reset");
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

pub fn default_backend() -> anyhow::Result<FileBackend> {
    use anyhow::Context;

    let project_dirs = ProjectDirs::from("", "", "cardvault")
        .context("could not determine platform directories")?;

    FileBackend::open(project_dirs.data_dir().join("vault.json"))
}
