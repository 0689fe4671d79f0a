use super::Reducer;
use crate::core::{Action, ActionKind, EntityRef, Result, TransactionPatch, TransactionRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Current transactions, keyed by id, plus the permanent tombstone set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionsState {
    live: BTreeMap<String, TransactionRecord>,
    deleted: BTreeSet<String>,
}

impl TransactionsState {
    pub fn get(&self, id: &str) -> Option<&TransactionRecord> {
        self.live.get(id)
    }

    pub fn is_deleted(&self, id: &str) -> bool {
        self.deleted.contains(id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.live.values()
    }

    pub fn for_account<'a>(
        &'a self,
        account_id: &'a str,
    ) -> impl Iterator<Item = &'a TransactionRecord> + 'a {
        self.live
            .values()
            .filter(move |record| record.account_id == account_id)
    }
}

impl Reducer for TransactionsState {
    fn name(&self) -> &'static str {
        "transactions"
    }

    fn reduce(&mut self, action: &Action) -> Result<()> {
        match action.kind {
            ActionKind::AddTransaction => {
                let record: TransactionRecord = action.decode_payload()?;
                if self.deleted.contains(&record.id) || self.live.contains_key(&record.id) {
                    return Ok(());
                }
                self.live.insert(record.id.clone(), record);
            }
            ActionKind::EditTransaction => {
                let patch: TransactionPatch = action.decode_payload()?;
                if let Some(record) = self.live.get_mut(&patch.id) {
                    patch.apply_to(record);
                }
            }
            ActionKind::DeleteTransaction => {
                let target: EntityRef = action.decode_payload()?;
                if self.live.remove(&target.id).is_some() {
                    self.deleted.insert(target.id);
                }
            }
            _ => {}
        }
        Ok(())
    }
}
