pub mod action;
pub mod error;
pub mod types;

pub use action::{Action, ActionId, ActionKind};
pub use error::{LedgerError, Result};
pub use types::{
    AccountPatch, AccountRecord, CategoryKind, CategoryPatch, CategoryRecord, EntityRef,
    MinorUnits, TransactionPatch, TransactionRecord,
};
