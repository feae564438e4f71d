use anyhow::Result;

use super::{Backend, CardRow, Profile, Tables};
use crate::card::{CardId, CardType};
use crate::credential::CredentialRecord;

/// Process-local backend. Contents are lost when it is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Tables,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn credential(&self) -> Result<Option<CredentialRecord>> {
        Ok(self.tables.credential.clone())
    }

    fn put_credential(&mut self, record: &CredentialRecord) -> Result<()> {
        self.tables.credential = Some(record.clone());
        Ok(())
    }

    fn card(&self, id: CardId) -> Result<Option<CardRow>> {
        Ok(self.tables.card(id))
    }

    fn cards(&self) -> Result<Vec<(CardId, CardRow)>> {
        Ok(self.tables.cards_where(|_| true))
    }

    fn cards_by_type(&self, kind: CardType) -> Result<Vec<(CardId, CardRow)>> {
        Ok(self.tables.cards_of_type(kind))
    }

    fn put_card(&mut self, id: Option<CardId>, row: CardRow) -> Result<CardId> {
        Ok(self.tables.put_card(id, row))
    }

    fn delete_card(&mut self, id: CardId) -> Result<()> {
        self.tables.delete_card(id);
        Ok(())
    }

    fn profile(&self) -> Result<Option<Profile>> {
        Ok(self.tables.profile.clone())
    }

    fn put_profile(&mut self, profile: &Profile) -> Result<()> {
        self.tables.profile = Some(profile.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.tables = Tables::default();
        Ok(())
    }
}
