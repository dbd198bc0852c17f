//! Deterministic ledger references for retried write requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::DefinitionError;

const IDEMPOTENT_PREFIX: &str = "idem_";
const MANUAL_PREFIX: &str = "manual_";
const AWARD_PREFIX: &str = "bonus_";

/// Longest key a client may supply.
pub const MAX_KEY_LEN: usize = 128;

/// A client-supplied idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Trims and validates a raw key. Blank keys and keys with control
    /// characters are rejected.
    pub fn parse(raw: &str) -> Result<Self, DefinitionError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(DefinitionError::Missing("idempotency_key"));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(DefinitionError::InvalidValue {
                field: "idempotency_key",
                reason: format!("must be at most {} characters", MAX_KEY_LEN),
            });
        }
        if key.chars().any(char::is_control) {
            return Err(DefinitionError::InvalidValue {
                field: "idempotency_key",
                reason: "must not contain control characters".to_string(),
            });
        }
        Ok(Self(key.to_string()))
    }

    /// Parses an optional key, treating blank input as absent.
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, DefinitionError> {
        match raw {
            Some(raw) if !raw.trim().is_empty() => Self::parse(raw).map(Some),
            _ => Ok(None),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ledger `reference_id` every write carrying this key maps to.
    pub fn reference_id(&self) -> String {
        format!("{}{}", IDEMPOTENT_PREFIX, self.0)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = DefinitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

/// Reference for a bonus award: the idempotency key wins, then the
/// transaction id, then a synthetic id derived from the new entry.
pub fn award_reference(
    key: Option<&IdempotencyKey>,
    transaction_id: Option<&str>,
    entry_id: Uuid,
) -> String {
    if let Some(key) = key {
        return key.reference_id();
    }
    match transaction_id.map(str::trim).filter(|t| !t.is_empty()) {
        Some(transaction_id) => transaction_id.to_string(),
        None => format!("{}{}", AWARD_PREFIX, entry_id.simple()),
    }
}

/// Reference for a manual adjustment.
pub fn manual_reference(key: Option<&IdempotencyKey>, entry_id: Uuid) -> String {
    match key {
        Some(key) => key.reference_id(),
        None => format!("{}{}", MANUAL_PREFIX, entry_id.simple()),
    }
}
