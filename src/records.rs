//! Encrypted card storage.
//!
//! Each card is stored as its own row: id, type and timestamps in clear for
//! indexing, everything else sealed as one JSON block under the session's
//! master key.

use chrono::Utc;

use crate::backend::{Backend, CardRow};
use crate::card::{Card, CardDetails, CardDraft, CardId, CardType};
use crate::crypto::Envelope;
use crate::error::{Result, VaultError};
use crate::session::Session;

/// Card operations over a borrowed backend.
pub struct CardStore<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: Backend + ?Sized> CardStore<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend }
    }

    /// Seal and persist a card.
    ///
    /// New cards get an id from the backend. Edits overwrite the whole row but
    /// keep the original `created_at`.
    pub fn save(&mut self, draft: CardDraft, session: &Session) -> Result<Card> {
        let key = session.master_key()?;

        let now = Utc::now();
        let created_at = match draft.id {
            Some(id) => {
                self.backend
                    .card(id)?
                    .ok_or(VaultError::RecordNotFound(id))?
                    .created_at
            }
            None => now,
        };

        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(&draft.details)?);
        let envelope = Envelope::seal(&plaintext, key.as_bytes())?;
        let row = CardRow::new(draft.kind, &envelope, created_at, now)?;
        let id = self.backend.put_card(draft.id, row)?;

        tracing::debug!(card_id = %id, kind = %draft.kind, "card saved");
        Ok(Card {
            id,
            kind: draft.kind,
            details: draft.details,
            created_at,
            updated_at: now,
        })
    }

    /// Decrypt every card, optionally only those of one type.
    ///
    /// Rows that fail to decrypt are skipped and logged; the rest are still
    /// returned.
    pub fn load_all(&self, session: &Session, filter: Option<CardType>) -> Result<Vec<Card>> {
        let key = session.master_key()?;

        let rows = match filter {
            Some(kind) => self.backend.cards_by_type(kind)?,
            None => self.backend.cards()?,
        };

        let mut cards = Vec::with_capacity(rows.len());
        for (id, row) in rows {
            match open_row(id, row, key.as_bytes()) {
                Ok(card) => cards.push(card),
                Err(e) => tracing::warn!(card_id = %id, error = %e, "skipping unreadable card"),
            }
        }
        Ok(cards)
    }

    pub fn load_one(&self, id: CardId, session: &Session) -> Result<Card> {
        let key = session.master_key()?;
        let row = self
            .backend
            .card(id)?
            .ok_or(VaultError::RecordNotFound(id))?;
        open_row(id, row, key.as_bytes())
    }

    /// Remove a card. Works without a session and on rows that no longer
    /// decrypt.
    pub fn delete(&mut self, id: CardId) -> Result<()> {
        self.backend.delete_card(id)?;
        tracing::debug!(card_id = %id, "card deleted");
        Ok(())
    }
}

fn open_row(id: CardId, row: CardRow, key: &[u8; crate::crypto::KEY_LEN]) -> Result<Card> {
    let kind = row.card_type().ok_or(VaultError::CorruptRecord(id))?;
    let envelope = row.envelope().map_err(|_| VaultError::CorruptRecord(id))?;
    let plaintext = envelope.open(key).map_err(|e| match e {
        VaultError::AuthenticationFailure => VaultError::AuthenticationFailure,
        _ => VaultError::CorruptRecord(id),
    })?;
    let details: CardDetails =
        serde_json::from_slice(&plaintext).map_err(|_| VaultError::CorruptRecord(id))?;

    Ok(Card {
        id,
        kind,
        details,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn details(number: &str) -> CardDetails {
        CardDetails {
            nickname: "Everyday".into(),
            number: number.into(),
            valid_from: "02/23".into(),
            valid_thru: "02/28".into(),
            holder_name: "J DOE".into(),
            issuer_name: "Example Bank".into(),
            cvv: "321".into(),
            display_color: "#1e3a8a".into(),
        }
    }

    fn sealed(plaintext: &[u8], key: &[u8; 32]) -> serde_json::Value {
        serde_json::to_value(Envelope::seal(plaintext, key).unwrap()).unwrap()
    }

    fn unlocked() -> (MemoryBackend, Session) {
        let mut backend = MemoryBackend::new();
        let mut session = Session::new();
        session.setup_pin(&mut backend, "1234").unwrap();
        (backend, session)
    }

    #[test]
    fn save_and_load_one_roundtrip() {
        let (mut backend, session) = unlocked();
        let mut store = CardStore::new(&mut backend);

        let saved = store
            .save(
                CardDraft::new(CardType::Credit, details("4111111111111111")),
                &session,
            )
            .unwrap();
        let loaded = store.load_one(saved.id, &session).unwrap();

        assert_eq!(loaded.details.number, "4111111111111111");
        assert_eq!(loaded.kind, CardType::Credit);
        assert_eq!(loaded.created_at, saved.created_at);
    }

    #[test]
    fn stored_row_never_contains_card_number() {
        let (mut backend, session) = unlocked();
        CardStore::new(&mut backend)
            .save(
                CardDraft::new(CardType::Credit, details("4111111111111111")),
                &session,
            )
            .unwrap();

        let (_, row) = backend.cards().unwrap().remove(0);
        let json = serde_json::to_string(&row).unwrap();
        assert!(!json.contains("4111111111111111"));
        assert!(!json.contains("cardNumber"));
    }

    #[test]
    fn edit_keeps_id_and_created_at() {
        let (mut backend, session) = unlocked();
        let mut store = CardStore::new(&mut backend);

        let first = store
            .save(CardDraft::new(CardType::Credit, details("4111")), &session)
            .unwrap();
        let edited = store
            .save(
                CardDraft::edit(first.id, CardType::Debit, details("5500")),
                &session,
            )
            .unwrap();

        assert_eq!(edited.id, first.id);
        assert_eq!(edited.created_at, first.created_at);
        assert!(edited.updated_at >= first.updated_at);

        let all = store.load_all(&session, None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].details.number, "5500");
        assert_eq!(all[0].kind, CardType::Debit);
    }

    #[test]
    fn editing_missing_card_is_not_found() {
        let (mut backend, session) = unlocked();
        let err = CardStore::new(&mut backend)
            .save(
                CardDraft::edit(CardId(77), CardType::Credit, details("1")),
                &session,
            )
            .unwrap_err();
        assert!(matches!(err, VaultError::RecordNotFound(CardId(77))));
    }

    #[test]
    fn load_all_filters_by_type() {
        let (mut backend, session) = unlocked();
        let mut store = CardStore::new(&mut backend);
        store
            .save(CardDraft::new(CardType::Credit, details("1")), &session)
            .unwrap();
        store
            .save(CardDraft::new(CardType::Debit, details("2")), &session)
            .unwrap();
        store
            .save(CardDraft::new(CardType::Credit, details("3")), &session)
            .unwrap();

        assert_eq!(store.load_all(&session, None).unwrap().len(), 3);
        let debit = store.load_all(&session, Some(CardType::Debit)).unwrap();
        assert_eq!(debit.len(), 1);
        assert_eq!(debit[0].details.number, "2");
    }

    #[test]
    fn corrupt_row_is_skipped_in_listing() {
        let (mut backend, session) = unlocked();
        let mut ids = Vec::new();
        {
            let mut store = CardStore::new(&mut backend);
            for n in ["1", "2", "3", "4"] {
                ids.push(
                    store
                        .save(CardDraft::new(CardType::Credit, details(n)), &session)
                        .unwrap()
                        .id,
                );
            }
        }

        let mut row = backend.card(ids[1]).unwrap().unwrap();
        row.encrypted_data = sealed(b"{}", &[0u8; 32]);
        backend.put_card(Some(ids[1]), row).unwrap();

        let store = CardStore::new(&mut backend);
        let cards = store.load_all(&session, None).unwrap();
        assert_eq!(cards.len(), 3);
        assert!(cards.iter().all(|c| c.id != ids[1]));

        assert!(matches!(
            store.load_one(ids[1], &session),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn undecodable_payload_is_corrupt_record() {
        let (mut backend, session) = unlocked();
        let id = CardStore::new(&mut backend)
            .save(CardDraft::new(CardType::Credit, details("1")), &session)
            .unwrap()
            .id;

        let mut row = backend.card(id).unwrap().unwrap();
        row.encrypted_data = sealed(b"not json", session.master_key().unwrap().as_bytes());
        backend.put_card(Some(id), row).unwrap();

        let store = CardStore::new(&mut backend);
        assert!(matches!(
            store.load_one(id, &session),
            Err(VaultError::CorruptRecord(i)) if i == id
        ));
        assert!(store.load_all(&session, None).unwrap().is_empty());
    }

    #[test]
    fn undecodable_row_fields_are_corrupt_records() {
        let (mut backend, session) = unlocked();
        let mut ids = Vec::new();
        {
            let mut store = CardStore::new(&mut backend);
            for n in ["1", "2", "3", "4", "5"] {
                ids.push(
                    store
                        .save(CardDraft::new(CardType::Credit, details(n)), &session)
                        .unwrap()
                        .id,
                );
            }
        }

        let damage: [(usize, &str, serde_json::Value); 4] = [
            (0, "iv", "!!corrupt!!".into()),
            (1, "data", "AAAA".into()),
            (2, "data", "%%%".into()),
            (3, "type", "prepaid".into()),
        ];
        for (i, field, value) in damage {
            let mut row = backend.card(ids[i]).unwrap().unwrap();
            if field == "type" {
                row.kind = value.as_str().unwrap().to_owned();
            } else {
                row.encrypted_data[field] = value;
            }
            backend.put_card(Some(ids[i]), row).unwrap();
        }

        let store = CardStore::new(&mut backend);
        let cards = store.load_all(&session, None).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, ids[4]);

        for &id in &ids[..4] {
            assert!(matches!(
                store.load_one(id, &session),
                Err(VaultError::CorruptRecord(i)) if i == id
            ));
        }
    }

    #[test]
    fn delete_works_on_corrupt_rows_and_without_session() {
        let (mut backend, mut session) = unlocked();
        let id = CardStore::new(&mut backend)
            .save(CardDraft::new(CardType::Credit, details("1")), &session)
            .unwrap()
            .id;

        let mut row = backend.card(id).unwrap().unwrap();
        row.encrypted_data["iv"] = "!!corrupt!!".into();
        backend.put_card(Some(id), row).unwrap();

        session.logout();
        CardStore::new(&mut backend).delete(id).unwrap();
        assert!(backend.card(id).unwrap().is_none());
    }

    #[test]
    fn locked_session_cannot_read_or_write() {
        let (mut backend, mut session) = unlocked();
        session.logout();
        let mut store = CardStore::new(&mut backend);

        assert!(matches!(
            store.save(CardDraft::new(CardType::Credit, details("1")), &session),
            Err(VaultError::NotAuthenticated)
        ));
        assert!(matches!(
            store.load_all(&session, None),
            Err(VaultError::NotAuthenticated)
        ));
        assert!(matches!(
            store.load_one(CardId(1), &session),
            Err(VaultError::NotAuthenticated)
        ));
    }

    #[test]
    fn load_one_missing_is_not_found() {
        let (mut backend, session) = unlocked();
        let store = CardStore::new(&mut backend);
        assert!(matches!(
            store.load_one(CardId(5), &session),
            Err(VaultError::RecordNotFound(CardId(5)))
        ));
    }
}
