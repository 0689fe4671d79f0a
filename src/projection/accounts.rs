use super::Reducer;
use crate::core::{
    AccountPatch, AccountRecord, Action, ActionKind, EntityRef, MinorUnits, Result,
    TransactionPatch, TransactionRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An account as the UI reads it: its definition plus derived totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    #[serde(flatten)]
    pub account: AccountRecord,
    pub balance_minor: MinorUnits,
    pub transaction_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Posting {
    account_id: String,
    amount_minor: MinorUnits,
}

/// Accounts and the postings that feed their balances.
///
/// Postings follow the same add/edit/delete rules as the transactions store,
/// so a balance always equals the opening balance plus the live transactions
/// posted to the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountsState {
    live: BTreeMap<String, AccountRecord>,
    deleted: BTreeSet<String>,
    postings: BTreeMap<String, Posting>,
    voided: BTreeSet<String>,
}

impl AccountsState {
    pub fn get(&self, id: &str) -> Option<&AccountRecord> {
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

    pub fn balance(&self, id: &str) -> Option<AccountBalance> {
        let account = self.live.get(id)?;
        let mut balance_minor = account.opening_balance_minor;
        let mut transaction_count = 0u64;
        for posting in self.postings.values().filter(|p| p.account_id == id) {
            balance_minor = balance_minor.saturating_add(posting.amount_minor);
            transaction_count += 1;
        }
        Some(AccountBalance {
            account: account.clone(),
            balance_minor,
            transaction_count,
        })
    }

    pub fn balances(&self) -> Vec<AccountBalance> {
        let mut totals: BTreeMap<&str, (MinorUnits, u64)> = BTreeMap::new();
        for posting in self.postings.values() {
            let entry = totals.entry(posting.account_id.as_str()).or_default();
            entry.0 = entry.0.saturating_add(posting.amount_minor);
            entry.1 += 1;
        }

        self.live
            .values()
            .map(|account| {
                let (sum, count) = totals.get(account.id.as_str()).copied().unwrap_or((0, 0));
                AccountBalance {
                    account: account.clone(),
                    balance_minor: account.opening_balance_minor.saturating_add(sum),
                    transaction_count: count,
                }
            })
            .collect()
    }

    fn reduce_account(&mut self, action: &Action) -> Result<()> {
        match action.kind {
            ActionKind::AddAccount => {
                let record: AccountRecord = action.decode_payload()?;
                if !self.deleted.contains(&record.id) && !self.live.contains_key(&record.id) {
                    self.live.insert(record.id.clone(), record);
                }
            }
            ActionKind::EditAccount => {
                let patch: AccountPatch = action.decode_payload()?;
                if let Some(record) = self.live.get_mut(&patch.id) {
                    patch.apply_to(record);
                }
            }
            ActionKind::DeleteAccount => {
                let target: EntityRef = action.decode_payload()?;
                if self.live.remove(&target.id).is_some() {
                    self.deleted.insert(target.id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn reduce_posting(&mut self, action: &Action) -> Result<()> {
        match action.kind {
            ActionKind::AddTransaction => {
                let record: TransactionRecord = action.decode_payload()?;
                if !self.voided.contains(&record.id) && !self.postings.contains_key(&record.id) {
                    self.postings.insert(
                        record.id,
                        Posting {
                            account_id: record.account_id,
                            amount_minor: record.amount_minor,
                        },
                    );
                }
            }
            ActionKind::EditTransaction => {
                let patch: TransactionPatch = action.decode_payload()?;
                if let Some(posting) = self.postings.get_mut(&patch.id) {
                    if let Some(account_id) = patch.account_id {
                        posting.account_id = account_id;
                    }
                    if let Some(amount_minor) = patch.amount_minor {
                        posting.amount_minor = amount_minor;
                    }
                }
            }
            ActionKind::DeleteTransaction => {
                let target: EntityRef = action.decode_payload()?;
                if self.postings.remove(&target.id).is_some() {
                    self.voided.insert(target.id);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Reducer for AccountsState {
    fn name(&self) -> &'static str {
        "accounts"
    }

    fn reduce(&mut self, action: &Action) -> Result<()> {
        match action.kind {
            ActionKind::AddTransaction
            | ActionKind::EditTransaction
            | ActionKind::DeleteTransaction => self.reduce_posting(action),
            _ => self.reduce_account(action),
        }
    }
}
