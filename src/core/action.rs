use super::error::{LedgerError, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Globally unique action identity, assigned once at creation and stable
/// across every log that ever holds the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn parse(value: &str) -> Result<Self> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|err| LedgerError::InvalidArgument(format!("action id '{}': {}", value, err)))
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Mutation tag carried by every action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    AddTransaction,
    EditTransaction,
    DeleteTransaction,
    AddCategory,
    EditCategory,
    DeleteCategory,
    AddAccount,
    EditAccount,
    DeleteAccount,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddTransaction => "add-transaction",
            Self::EditTransaction => "edit-transaction",
            Self::DeleteTransaction => "delete-transaction",
            Self::AddCategory => "add-category",
            Self::EditCategory => "edit-category",
            Self::DeleteCategory => "delete-category",
            Self::AddAccount => "add-account",
            Self::EditAccount => "edit-account",
            Self::DeleteAccount => "delete-account",
        }
    }

    /// Domain deletes are tombstone actions consumed by the reducers.
    pub fn is_tombstone(&self) -> bool {
        matches!(
            self,
            Self::DeleteTransaction | Self::DeleteCategory | Self::DeleteAccount
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The atomic, immutable unit of change.
///
/// `sequence` is the 1-based position inside whichever log currently holds the
/// action; it is reassigned on append and carries no identity. A freshly built
/// action has sequence 0 until a log accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub sequence: u64,
    pub id: ActionId,
    pub kind: ActionKind,
    pub payload: serde_json::Value,
    pub created_at_unix_ms: i64,
}

impl Action {
    pub fn new(kind: ActionKind, payload: serde_json::Value) -> Self {
        Self {
            sequence: 0,
            id: ActionId::new(),
            kind,
            payload,
            created_at_unix_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Builds an action from a typed payload.
    pub fn with_payload<T: Serialize>(kind: ActionKind, payload: &T) -> Result<Self> {
        let payload = serde_json::to_value(payload).map_err(|err| {
            LedgerError::InvalidArgument(format!("serialize {} payload: {}", kind, err))
        })?;
        Ok(Self::new(kind, payload))
    }

    pub fn with_id(mut self, id: ActionId) -> Self {
        self.id = id;
        self
    }

    pub fn with_created_at(mut self, created_at_unix_ms: i64) -> Self {
        self.created_at_unix_ms = created_at_unix_ms;
        self
    }

    pub(crate) fn at_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|err| {
            LedgerError::DecodeFailure(format!("{} payload of action {}: {}", self.kind, self.id, err))
        })
    }

    /// Total order used when two logs disagree: creation time, then id.
    pub fn merge_cmp(&self, other: &Self) -> Ordering {
        self.created_at_unix_ms
            .cmp(&other.created_at_unix_ms)
            .then_with(|| self.id.cmp(&other.id))
    }
}
