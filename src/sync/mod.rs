//! Reconciliation of the local log with the remote, cloud-file-backed log.

pub mod cloud;
pub mod codec;
pub mod engine;
pub mod events;
pub mod merge;

pub use cloud::{CloudFileStore, DirectoryCloudStore, FileRef, InMemoryCloudStore};
pub use codec::{CLOUD_FORMAT_VERSION, CloudEncoding, decode_actions, detect_encoding, encode_actions};
pub use engine::SyncEngine;
pub use events::{SyncEvent, SyncFailure, SyncOutcome, SyncReport, SyncState};
pub use merge::{
    DivergenceKind, MergePlan, canonical_order, quick_in_sync, reconcile, same_order,
};
