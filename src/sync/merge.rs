//! Divergence classification and the deterministic merge of two logs.
//!
//! Both logs are read as immutable sequences; nothing here writes. The merged
//! order is a pure function of the two inputs, so two devices holding the same
//! pair of logs compute the same result.

use crate::core::{Action, ActionId};
use crate::logs::ActionLog;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceKind {
    InSync,
    /// Remote is a strict extension of local.
    PullOnly,
    /// Local is a strict extension of remote.
    PushOnly,
    /// Both sides hold entries the other lacks past the common prefix.
    Conflict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub divergence: DivergenceKind,
    /// Length of the positional prefix on which both logs agree.
    pub common_prefix: usize,
    /// The single total order both sides converge to.
    pub merged: Vec<Action>,
    /// Entries of `merged` the local log has to append, in merged order.
    pub missing_locally: Vec<Action>,
    /// Entries of `merged` the remote file lacks.
    pub missing_remotely: Vec<Action>,
    /// Whether the remote file differs from `merged` and must be replaced.
    pub push_required: bool,
}

impl MergePlan {
    pub fn is_noop(&self) -> bool {
        self.missing_locally.is_empty() && !self.push_required
    }
}

pub fn common_prefix_len(local: &[Action], remote: &[Action]) -> usize {
    local
        .iter()
        .zip(remote)
        .take_while(|(left, right)| left.id == right.id)
        .count()
}

/// Classifies the two logs and builds the merge.
///
/// A conflict keeps the common prefix and orders the union of both tails by
/// creation time, then id.
pub fn reconcile(local: &[Action], remote: &[Action]) -> MergePlan {
    let prefix = common_prefix_len(local, remote);

    let (divergence, merged) = if prefix == local.len() && prefix == remote.len() {
        (DivergenceKind::InSync, local.to_vec())
    } else if prefix == local.len() {
        (DivergenceKind::PullOnly, remote.to_vec())
    } else if prefix == remote.len() {
        (DivergenceKind::PushOnly, local.to_vec())
    } else {
        let mut seen = HashSet::new();
        let mut tail = local[prefix..]
            .iter()
            .chain(&remote[prefix..])
            .filter(|action| seen.insert(action.id))
            .cloned()
            .collect::<Vec<_>>();
        tail.sort_by(|left, right| left.merge_cmp(right));

        let mut merged = local[..prefix].to_vec();
        merged.extend(tail);
        (DivergenceKind::Conflict, merged)
    };

    let local_ids = local.iter().map(|a| a.id).collect::<HashSet<ActionId>>();
    let remote_ids = remote.iter().map(|a| a.id).collect::<HashSet<ActionId>>();

    let missing_locally = merged
        .iter()
        .filter(|action| !local_ids.contains(&action.id))
        .cloned()
        .collect();
    let missing_remotely = merged
        .iter()
        .filter(|action| !remote_ids.contains(&action.id))
        .cloned()
        .collect();
    let push_required = merged.len() != remote.len()
        || merged.iter().zip(remote).any(|(left, right)| left.id != right.id);

    MergePlan {
        divergence,
        common_prefix: prefix,
        merged,
        missing_locally,
        missing_remotely,
        push_required,
    }
}

/// The order projections are built from.
pub fn canonical_order(local: &[Action], remote: &[Action]) -> Vec<Action> {
    reconcile(local, remote).merged
}

/// Whether both logs hold the same ids in the same positions.
pub fn same_order(local: &[Action], remote: &[Action]) -> bool {
    local.len() == remote.len() && common_prefix_len(local, remote) == local.len()
}

/// Cheap check on counts and last ids only. `false` rules out being in sync;
/// `true` has to be confirmed with [`same_order`], since two different logs
/// can share a length and a last entry.
pub async fn quick_in_sync(local: &dyn ActionLog, remote: &dyn ActionLog) -> bool {
    let (local_count, remote_count) = (local.get_actions_count().await, remote.get_actions_count().await);
    if local_count != remote_count {
        return false;
    }
    let local_last = local.get_last_action().await.map(|a| a.id);
    let remote_last = remote.get_last_action().await.map(|a| a.id);
    local_last == remote_last
}
