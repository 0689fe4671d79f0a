// ============================================================================
// ledgersync library
// ============================================================================

pub mod core;
pub mod facade;
pub mod logs;
pub mod migration;
pub mod projection;
pub mod storage;
pub mod sync;

// Re-export main types for convenience
pub use core::{
    AccountPatch, AccountRecord, Action, ActionId, ActionKind, CategoryKind, CategoryPatch,
    CategoryRecord, EntityRef, LedgerError, MinorUnits, Result, TransactionPatch,
    TransactionRecord,
};
pub use facade::{Ledger, LedgerConfig, LedgerStatus};
pub use logs::{ActionLog, AppendOnlyLog, CloudReplica, LogSnapshot};
pub use migration::{
    LEDGER_SCHEMA_VERSION, MigrationReport, MigrationStep, SchemaMigrator, ledger_migrations,
};
pub use projection::{
    AccountBalance, MaterializedStore, ProjectionMode, ProjectionSummary, ProjectionTarget,
    Projector,
};
pub use storage::{DurabilityMode, LocalDatabase, StoreLayout, StoreSpec};
pub use sync::{
    CloudEncoding, CloudFileStore, DirectoryCloudStore, DivergenceKind, FileRef,
    InMemoryCloudStore, SyncEngine, SyncEvent, SyncOutcome, SyncReport, SyncState,
};
