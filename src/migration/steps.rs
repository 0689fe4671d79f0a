//! The ledger's registered schema history.
//!
//! Each step only adds stores or indexes. A store introduced at version N never
//! reads data that a later version is responsible for.

use super::{MigrationStep, SchemaMigrator};
use crate::core::Result;
use crate::storage::{
    ACCOUNTS_STORE, ACTIONS_STORE, CATEGORIES_STORE, CLOUD_REPLICA_STORE, StoreLayout, StoreSpec,
    TRANSACTIONS_STORE,
};

pub const LEDGER_SCHEMA_VERSION: u32 = 3;

fn v1_actions_and_transactions(layout: StoreLayout) -> Result<StoreLayout> {
    layout
        .create_store(ACTIONS_STORE, StoreSpec::action_log())?
        .create_store(TRANSACTIONS_STORE, StoreSpec::document("id"))
}

fn v2_categories_and_replica(layout: StoreLayout) -> Result<StoreLayout> {
    layout
        .create_store(
            CATEGORIES_STORE,
            StoreSpec::document("id").with_index("kind"),
        )?
        .create_store(CLOUD_REPLICA_STORE, StoreSpec::action_log())
}

fn v3_accounts_and_lookups(layout: StoreLayout) -> Result<StoreLayout> {
    layout
        .create_store(ACCOUNTS_STORE, StoreSpec::document("id"))?
        .alter_store(TRANSACTIONS_STORE, |spec| {
            spec.indexes.insert("account_id".to_string());
            spec.indexes.insert("category_id".to_string());
        })
}

/// Full migration chain up to [`LEDGER_SCHEMA_VERSION`].
pub fn ledger_migrations() -> SchemaMigrator {
    SchemaMigrator {
        steps: vec![
            MigrationStep::new(
                1,
                "create action log and transactions store",
                v1_actions_and_transactions,
            ),
            MigrationStep::new(
                2,
                "create categories store and cloud replica",
                v2_categories_and_replica,
            ),
            MigrationStep::new(
                3,
                "create accounts store, index transactions by account and category",
                v3_accounts_and_lookups,
            ),
        ],
    }
}
