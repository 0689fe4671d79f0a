use super::action::{Action, ActionKind};
use super::error::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Monetary amount in minor units (cents). Signed: outflows are negative.
pub type MinorUnits = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Income,
    Expense,
}

/// Payload of `add-transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub account_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    pub amount_minor: MinorUnits,
    pub occurred_on: NaiveDate,
    #[serde(default)]
    pub memo: String,
}

/// Payload of `edit-transaction`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub clear_category: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_minor: Option<MinorUnits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl TransactionPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, record: &mut TransactionRecord) {
        if let Some(account_id) = &self.account_id {
            record.account_id = account_id.clone();
        }
        if self.clear_category {
            record.category_id = None;
        } else if let Some(category_id) = &self.category_id {
            record.category_id = Some(category_id.clone());
        }
        if let Some(amount_minor) = self.amount_minor {
            record.amount_minor = amount_minor;
        }
        if let Some(occurred_on) = self.occurred_on {
            record.occurred_on = occurred_on;
        }
        if let Some(memo) = &self.memo {
            record.memo = memo.clone();
        }
    }
}

/// Payload of `add-category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
    pub kind: CategoryKind,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Payload of `edit-category`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CategoryKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub clear_parent: bool,
}

impl CategoryPatch {
    pub fn apply_to(&self, record: &mut CategoryRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(kind) = self.kind {
            record.kind = kind;
        }
        if self.clear_parent {
            record.parent_id = None;
        } else if let Some(parent_id) = &self.parent_id {
            record.parent_id = Some(parent_id.clone());
        }
    }
}

/// Payload of `add-account`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub name: String,
    pub currency: String,
    #[serde(default)]
    pub opening_balance_minor: MinorUnits,
}

/// Payload of `edit-account`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_balance_minor: Option<MinorUnits>,
}

impl AccountPatch {
    pub fn apply_to(&self, record: &mut AccountRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(currency) = &self.currency {
            record.currency = currency.clone();
        }
        if let Some(opening) = self.opening_balance_minor {
            record.opening_balance_minor = opening;
        }
    }
}

/// Payload of every `delete-*` tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
}

impl EntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

// Typed constructors used by callers that dispatch domain mutations.
impl Action {
    pub fn add_transaction(record: &TransactionRecord) -> Result<Self> {
        Self::with_payload(ActionKind::AddTransaction, record)
    }

    pub fn edit_transaction(patch: &TransactionPatch) -> Result<Self> {
        Self::with_payload(ActionKind::EditTransaction, patch)
    }

    pub fn delete_transaction(id: impl Into<String>) -> Result<Self> {
        Self::with_payload(ActionKind::DeleteTransaction, &EntityRef::new(id))
    }

    pub fn add_category(record: &CategoryRecord) -> Result<Self> {
        Self::with_payload(ActionKind::AddCategory, record)
    }

    pub fn edit_category(patch: &CategoryPatch) -> Result<Self> {
        Self::with_payload(ActionKind::EditCategory, patch)
    }

    pub fn delete_category(id: impl Into<String>) -> Result<Self> {
        Self::with_payload(ActionKind::DeleteCategory, &EntityRef::new(id))
    }

    pub fn add_account(record: &AccountRecord) -> Result<Self> {
        Self::with_payload(ActionKind::AddAccount, record)
    }

    pub fn edit_account(patch: &AccountPatch) -> Result<Self> {
        Self::with_payload(ActionKind::EditAccount, patch)
    }

    pub fn delete_account(id: impl Into<String>) -> Result<Self> {
        Self::with_payload(ActionKind::DeleteAccount, &EntityRef::new(id))
    }
}
