//! Persistence backends.
//!
//! The vault keeps three logical tables: the single credential row, the card
//! rows (keyed by a store-assigned id, indexed by type) and the single profile
//! row. A backend only stores what it is given; everything sensitive arrives
//! already sealed.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::card::{CardId, CardType};
use crate::credential::CredentialRecord;
use crate::crypto::Envelope;

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// A persisted card: clear index fields plus the sealed details.
///
/// `type` and `encryptedData` are kept as stored, undecoded, so one damaged
/// row cannot stop the rest of the table from loading. The record store
/// decodes them per row. The id is the row's table key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRow {
    #[serde(rename = "type")]
    pub kind: String,
    pub encrypted_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CardRow {
    pub fn new(
        kind: CardType,
        envelope: &Envelope,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            kind: kind.as_str().to_owned(),
            encrypted_data: serde_json::to_value(envelope)?,
            created_at,
            updated_at,
        })
    }

    /// The stored type, or `None` if it is not one this build knows.
    pub fn card_type(&self) -> Option<CardType> {
        self.kind.parse().ok()
    }

    /// Decode the sealed details envelope.
    pub fn envelope(&self) -> serde_json::Result<Envelope> {
        Envelope::deserialize(&self.encrypted_data)
    }
}

/// Non-sensitive owner details, stored in clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Storage collaborator used by the credential and record stores.
///
/// A completed `put_*` must be durable before the call returns.
pub trait Backend {
    fn credential(&self) -> Result<Option<CredentialRecord>>;

    /// Replace the credential row as a whole.
    fn put_credential(&mut self, record: &CredentialRecord) -> Result<()>;

    fn card(&self, id: CardId) -> Result<Option<CardRow>>;

    fn cards(&self) -> Result<Vec<(CardId, CardRow)>>;

    fn cards_by_type(&self, kind: CardType) -> Result<Vec<(CardId, CardRow)>>;

    /// Overwrite the row at `id`, or insert under a fresh id when `id` is
    /// `None`. Returns the row's id.
    fn put_card(&mut self, id: Option<CardId>, row: CardRow) -> Result<CardId>;

    /// Remove a card row. Removing a missing id is not an error.
    fn delete_card(&mut self, id: CardId) -> Result<()>;

    fn profile(&self) -> Result<Option<Profile>>;

    fn put_profile(&mut self, profile: &Profile) -> Result<()>;

    /// Drop every table's contents.
    fn clear(&mut self) -> Result<()>;
}

/// Table contents shared by the in-memory and file backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Tables {
    #[serde(default)]
    credential: Option<CredentialRecord>,
    #[serde(default)]
    cards: BTreeMap<u64, CardRow>,
    #[serde(default)]
    next_card_id: u64,
    #[serde(default)]
    profile: Option<Profile>,
}

impl Tables {
    fn card(&self, id: CardId) -> Option<CardRow> {
        self.cards.get(&id.0).cloned()
    }

    fn cards_where(&self, filter: impl Fn(&CardRow) -> bool) -> Vec<(CardId, CardRow)> {
        self.cards
            .iter()
            .filter(|(_, row)| filter(row))
            .map(|(id, row)| (CardId(*id), row.clone()))
            .collect()
    }

    fn cards_of_type(&self, kind: CardType) -> Vec<(CardId, CardRow)> {
        self.cards_where(|row| row.kind == kind.as_str())
    }

    fn put_card(&mut self, id: Option<CardId>, row: CardRow) -> CardId {
        let id = match id {
            Some(id) => id,
            None => {
                self.next_card_id += 1;
                CardId(self.next_card_id)
            }
        };
        // ids are never handed out twice, even after deletes
        self.next_card_id = self.next_card_id.max(id.0);
        self.cards.insert(id.0, row);
        id
    }

    fn delete_card(&mut self, id: CardId) {
        self.cards.remove(&id.0);
    }
}
