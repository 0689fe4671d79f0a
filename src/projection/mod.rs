//! Pure replay of an ordered action sequence into materialized state.

pub mod accounts;
pub mod categories;
pub mod transactions;
pub mod views;

pub use accounts::{AccountBalance, AccountsState};
pub use categories::CategoriesState;
pub use transactions::TransactionsState;
pub use views::{LiveProjection, ProjectedViews};

use crate::core::{Action, ActionId, LedgerError, Result};
use async_trait::async_trait;
use log::warn;
use serde::Serialize;

/// Folds actions into one store. Kinds a reducer does not own are no-ops.
///
/// An `Err` means the payload could not be read; the reducer must leave its
/// state untouched in that case.
pub trait Reducer: Send + Sync {
    fn name(&self) -> &'static str;

    fn reduce(&mut self, action: &Action) -> Result<()>;
}

/// Everything the projector derives from the merged log.
///
/// All maps are ordered, so the canonical serialization of two stores built
/// from the same sequence is byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializedStore {
    pub transactions: TransactionsState,
    pub categories: CategoriesState,
    pub accounts: AccountsState,
    pub applied_actions: u64,
    pub skipped_actions: u64,
    pub last_action_id: Option<ActionId>,
}

impl MaterializedStore {
    pub fn apply(&mut self, action: &Action) {
        let mut unreadable = None;
        for reducer in self.reducers() {
            if let Err(err) = reducer.reduce(action) {
                unreadable.get_or_insert((reducer.name(), err));
            }
        }

        if let Some((store, err)) = unreadable {
            warn!(
                "skipping unreadable action: id='{}' kind='{}' store='{}' error='{}'",
                action.id, action.kind, store, err
            );
            self.skipped_actions += 1;
        } else {
            self.applied_actions += 1;
        }
        self.last_action_id = Some(action.id);
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| LedgerError::InvalidArgument(err.to_string()))
    }

    fn reducers(&mut self) -> [&mut dyn Reducer; 3] {
        [
            &mut self.transactions,
            &mut self.categories,
            &mut self.accounts,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    /// Only the actions past the previous projection were replayed.
    Incremental,
    /// The state was discarded and the whole sequence replayed.
    Rebuilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionSummary {
    pub mode: ProjectionMode,
    pub replayed: u64,
    pub total: u64,
}

/// Replays sequences into a [`MaterializedStore`], remembering which order it
/// last projected so that extensions of that order are applied incrementally.
#[derive(Debug, Clone, Default)]
pub struct Projector {
    state: MaterializedStore,
    projected: Vec<ActionId>,
}

impl Projector {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot full replay.
    pub fn project(actions: &[Action]) -> MaterializedStore {
        let mut state = MaterializedStore::default();
        for action in actions {
            state.apply(action);
        }
        state
    }

    pub fn state(&self) -> &MaterializedStore {
        &self.state
    }

    pub fn projected_len(&self) -> usize {
        self.projected.len()
    }

    /// True when `canonical` starts with exactly the order projected so far.
    pub fn extends_projection(&self, canonical: &[Action]) -> bool {
        canonical.len() >= self.projected.len()
            && self
                .projected
                .iter()
                .zip(canonical)
                .all(|(id, action)| *id == action.id)
    }

    /// Brings the state up to `canonical`, replaying only the new tail when
    /// possible and rebuilding otherwise.
    pub fn sync_to(&mut self, canonical: &[Action]) -> ProjectionSummary {
        if !self.extends_projection(canonical) {
            return self.rebuild(canonical);
        }

        let tail = &canonical[self.projected.len()..];
        for action in tail {
            self.state.apply(action);
            self.projected.push(action.id);
        }
        ProjectionSummary {
            mode: ProjectionMode::Incremental,
            replayed: tail.len() as u64,
            total: canonical.len() as u64,
        }
    }

    pub fn rebuild(&mut self, canonical: &[Action]) -> ProjectionSummary {
        self.state = Self::project(canonical);
        self.projected = canonical.iter().map(|action| action.id).collect();
        ProjectionSummary {
            mode: ProjectionMode::Rebuilt,
            replayed: canonical.len() as u64,
            total: canonical.len() as u64,
        }
    }
}

/// Receiver of the merged order at the end of a sync cycle or a dispatch.
#[async_trait]
pub trait ProjectionTarget: Send + Sync {
    async fn project(&self, canonical: &[Action]) -> Result<ProjectionSummary>;
}
