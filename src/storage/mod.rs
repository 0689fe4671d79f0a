pub mod database;
pub mod documents;
pub mod journal;
pub mod layout;

pub use database::{DatabaseManifest, LocalDatabase};
pub use documents::DocumentStore;
pub use journal::{DurabilityMode, JournalFile};
pub use layout::{
    ACCOUNTS_STORE, ACTIONS_STORE, CATEGORIES_STORE, CLOUD_REPLICA_STORE, StoreKind, StoreLayout,
    StoreSpec, TRANSACTIONS_STORE,
};

use crate::core::{LedgerError, Result};
use serde::Serialize;
use std::path::Path;
use tokio::fs;

/// Writes `value` as JSON to a sibling temp file, then renames it into place.
pub(crate) async fn write_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| LedgerError::WriteFailure(err.to_string()))?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(|err| {
        LedgerError::WriteFailure(format!("serialize {}: {}", path.display(), err))
    })?;

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, json)
        .await
        .map_err(|err| LedgerError::WriteFailure(err.to_string()))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|err| LedgerError::WriteFailure(err.to_string()))?;
    Ok(())
}
