use super::merge::DivergenceKind;
use crate::core::LedgerError;
use crate::projection::ProjectionMode;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Fetching,
    Diffing,
    Merging,
    Pushing,
    Projecting,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::Merging => "merging",
            Self::Pushing => "pushing",
            Self::Projecting => "projecting",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub cycle: u64,
    pub divergence: DivergenceKind,
    pub pulled: u64,
    pub pushed: u64,
    pub uploaded: bool,
    pub projection: Option<ProjectionMode>,
    pub total_actions: u64,
}

/// Failure of one cycle, with the stage it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub cycle: u64,
    pub stage: SyncState,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl SyncFailure {
    pub(crate) fn from_error(cycle: u64, stage: SyncState, err: &LedgerError) -> Self {
        Self {
            cycle,
            stage,
            code: err.code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Start { cycle: u64 },
    Success(SyncReport),
    Error(SyncFailure),
}

impl SyncEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Start { .. } => "SYNC_START",
            Self::Success(_) => "SYNC_SUCCESS",
            Self::Error(_) => "SYNC_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// A cycle was already running; one follow-up cycle is scheduled after it.
    Queued,
}
