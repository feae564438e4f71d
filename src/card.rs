//! Payment card records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Store-assigned card identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub u64);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CardId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(CardId)
    }
}

/// Category used to filter listings. Stored in clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Credit,
    Debit,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Credit => "credit",
            CardType::Debit => "debit",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "credit" => Ok(CardType::Credit),
            "debit" => Ok(CardType::Debit),
            other => Err(format!("unknown card type '{other}' (expected credit or debit)")),
        }
    }
}

/// The sensitive part of a card. Only ever persisted sealed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    #[serde(default)]
    pub nickname: String,
    #[serde(rename = "cardNumber")]
    pub number: String,
    pub valid_from: String,
    pub valid_thru: String,
    #[serde(rename = "cardName")]
    pub holder_name: String,
    #[serde(rename = "bankName")]
    pub issuer_name: String,
    pub cvv: String,
    #[serde(rename = "color", default)]
    pub display_color: String,
}

impl Drop for CardDetails {
    fn drop(&mut self) {
        self.nickname.zeroize();
        self.number.zeroize();
        self.valid_from.zeroize();
        self.valid_thru.zeroize();
        self.holder_name.zeroize();
        self.issuer_name.zeroize();
        self.cvv.zeroize();
        self.display_color.zeroize();
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("nickname", &self.nickname)
            .field("number", &masked(&self.number))
            .finish_non_exhaustive()
    }
}

/// Card number reduced to its last four digits.
pub fn masked(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("**** {tail}")
}

/// A card to be saved. `id` is `None` for a new card and set for an edit.
#[derive(Debug, Clone)]
pub struct CardDraft {
    pub id: Option<CardId>,
    pub kind: CardType,
    pub details: CardDetails,
}

impl CardDraft {
    pub fn new(kind: CardType, details: CardDetails) -> Self {
        Self {
            id: None,
            kind,
            details,
        }
    }

    pub fn edit(id: CardId, kind: CardType, details: CardDetails) -> Self {
        Self {
            id: Some(id),
            kind,
            details,
        }
    }
}

/// A decrypted card as returned by the record store.
#[derive(Debug, Clone)]
pub struct Card {
    pub id: CardId,
    pub kind: CardType,
    pub details: CardDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn into_draft(self) -> CardDraft {
        CardDraft::edit(self.id, self.kind, self.details)
    }
}
