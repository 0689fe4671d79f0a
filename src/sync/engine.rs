use super::cloud::{CloudFileStore, FileRef};
use super::codec::{CloudEncoding, decode_actions, encode_actions};
use super::events::{SyncEvent, SyncFailure, SyncOutcome, SyncReport, SyncState};
use super::merge::{DivergenceKind, canonical_order, quick_in_sync, reconcile, same_order};
use crate::core::Result;
use crate::logs::{ActionLog, AppendOnlyLog, CloudReplica};
use crate::projection::{ProjectionSummary, ProjectionTarget};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{Instrument, Level, event, info_span};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Clears the in-flight flag however the owning future ends, including when
/// it is dropped mid-cycle.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
    state: &'a watch::Sender<SyncState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if *state == SyncState::Idle {
                return false;
            }
            *state = SyncState::Idle;
            true
        });
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Pull, diff, merge, push and re-project, one cycle at a time.
pub struct SyncEngine {
    local: AppendOnlyLog,
    replica: CloudReplica,
    cloud: Arc<dyn CloudFileStore>,
    projection: Arc<dyn ProjectionTarget>,
    /// Serializes reading the logs with projecting them.
    projecting: Mutex<()>,
    file: FileRef,
    encoding: CloudEncoding,
    state_tx: watch::Sender<SyncState>,
    events: broadcast::Sender<SyncEvent>,
    in_flight: AtomicBool,
    rerun: AtomicBool,
    cycles: AtomicU64,
}

impl SyncEngine {
    pub fn new(
        local: AppendOnlyLog,
        replica: CloudReplica,
        cloud: Arc<dyn CloudFileStore>,
        projection: Arc<dyn ProjectionTarget>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            local,
            replica,
            cloud,
            projection,
            projecting: Mutex::new(()),
            file: FileRef::default(),
            encoding: CloudEncoding::default(),
            state_tx,
            events,
            in_flight: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn with_file(mut self, file: FileRef) -> Self {
        self.file = file;
        self
    }

    pub fn with_encoding(mut self, encoding: CloudEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn file(&self) -> &FileRef {
        &self.file
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Projects the canonical order of the logs as they are right now.
    ///
    /// Both logs are read and projected under one lock, so anything appended
    /// before the call is in the projected order.
    pub async fn refresh_projection(&self) -> Result<ProjectionSummary> {
        let _projecting = self.projecting.lock().await;
        let local = self.local.snapshot().await.to_vec();
        let remote = self.replica.snapshot().await.to_vec();
        self.projection.project(&canonical_order(&local, &remote)).await
    }

    /// Drops the cached remote contents; the next cycle refills them.
    pub async fn reset_replica(&self) -> Result<()> {
        self.replica.delete_db().await
    }

    /// Runs one sync cycle.
    ///
    /// While a cycle is in flight this returns [`SyncOutcome::Queued`] and the
    /// running call performs exactly one more cycle once it finishes. A failed
    /// cycle drops any queued follow-up and surfaces its error.
    pub async fn run_sync(&self) -> Result<SyncOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.rerun.store(true, Ordering::SeqCst);
            event!(Level::DEBUG, "sync already running, follow-up queued");
            return Ok(SyncOutcome::Queued);
        }
        let _guard = InFlightGuard {
            flag: &self.in_flight,
            state: &self.state_tx,
        };

        loop {
            let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
            let span = info_span!("ledger.sync", cycle, file = %self.file);
            let result = self.run_cycle(cycle).instrument(span).await;

            match result {
                Ok(report) => {
                    if !self.rerun.swap(false, Ordering::SeqCst) {
                        return Ok(SyncOutcome::Completed(report));
                    }
                }
                Err(err) => {
                    self.rerun.store(false, Ordering::SeqCst);
                    return Err(err);
                }
            }
        }
    }

    async fn run_cycle(&self, cycle: u64) -> Result<SyncReport> {
        let _ = self.events.send(SyncEvent::Start { cycle });
        let mut stage = SyncState::Fetching;

        match self.cycle_stages(cycle, &mut stage).await {
            Ok(report) => {
                self.transition(SyncState::Idle);
                event!(
                    Level::INFO,
                    divergence = ?report.divergence,
                    pulled = report.pulled,
                    pushed = report.pushed,
                    total = report.total_actions,
                    "sync cycle completed"
                );
                let _ = self.events.send(SyncEvent::Success(report.clone()));
                Ok(report)
            }
            Err(err) => {
                let failure = SyncFailure::from_error(cycle, stage, &err);
                self.transition(SyncState::Failed);
                event!(
                    Level::WARN,
                    stage = %stage,
                    code = failure.code,
                    retryable = failure.retryable,
                    error = %err,
                    "sync cycle failed"
                );
                let _ = self.events.send(SyncEvent::Error(failure));
                self.transition(SyncState::Idle);
                Err(err)
            }
        }
    }

    async fn cycle_stages(&self, cycle: u64, stage: &mut SyncState) -> Result<SyncReport> {
        self.enter(stage, SyncState::Fetching);
        let bytes = self.cloud.download_file(&self.file).await?;
        let remote = decode_actions(bytes.as_deref().unwrap_or_default())?;
        self.replica.replace_contents(remote.clone()).await?;

        self.enter(stage, SyncState::Diffing);
        let local = self.local.snapshot().await.to_vec();
        if quick_in_sync(&self.local, &self.replica).await && same_order(&local, &remote) {
            self.enter(stage, SyncState::Projecting);
            let summary = self.refresh_projection().await?;
            return Ok(SyncReport {
                cycle,
                divergence: DivergenceKind::InSync,
                pulled: 0,
                pushed: 0,
                uploaded: false,
                projection: Some(summary.mode),
                total_actions: summary.total,
            });
        }
        let plan = reconcile(&local, &remote);
        event!(
            Level::DEBUG,
            divergence = ?plan.divergence,
            common_prefix = plan.common_prefix,
            missing_locally = plan.missing_locally.len(),
            missing_remotely = plan.missing_remotely.len(),
            "logs diffed"
        );

        self.enter(stage, SyncState::Merging);
        let pulled = plan.missing_locally.len() as u64;
        if pulled > 0 {
            self.local.append(plan.missing_locally.clone()).await?;
        }

        self.enter(stage, SyncState::Pushing);
        let uploaded = plan.push_required;
        if uploaded {
            let bytes = encode_actions(&plan.merged, self.encoding)?;
            self.cloud.upload_file(&self.file, bytes).await?;
            self.replica.replace_contents(plan.merged.clone()).await?;
        }

        self.enter(stage, SyncState::Projecting);
        let summary = self.refresh_projection().await?;

        Ok(SyncReport {
            cycle,
            divergence: plan.divergence,
            pulled,
            pushed: plan.missing_remotely.len() as u64,
            uploaded,
            projection: Some(summary.mode),
            total_actions: summary.total,
        })
    }

    fn enter(&self, stage: &mut SyncState, next: SyncState) {
        *stage = next;
        self.transition(next);
    }

    fn transition(&self, next: SyncState) {
        self.state_tx.send_replace(next);
        event!(Level::DEBUG, state = %next, "sync state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Action, ActionKind, LedgerError};
    use crate::projection::LiveProjection;
    use crate::storage::{DurabilityMode, LocalDatabase};
    use crate::sync::InMemoryCloudStore;
    use serde_json::json;
    use tempfile::TempDir;

    async fn engine(dir: &TempDir, cloud: Arc<InMemoryCloudStore>) -> SyncEngine {
        let mut db = LocalDatabase::open(dir.path(), DurabilityMode::Strict, None)
            .await
            .unwrap();
        crate::migration::ledger_migrations()
            .migrate(&mut db)
            .await
            .unwrap();
        SyncEngine::new(
            AppendOnlyLog::open(&db).await.unwrap(),
            CloudReplica::open(&db).await.unwrap(),
            cloud,
            Arc::new(LiveProjection::in_memory()),
        )
    }

    #[tokio::test]
    async fn test_push_only_uploads_local_actions() {
        let dir = TempDir::new().unwrap();
        let cloud = Arc::new(InMemoryCloudStore::new());
        let engine = engine(&dir, cloud.clone()).await;
        engine
            .local
            .append(vec![Action::new(ActionKind::DeleteAccount, json!({"id": "x"}))])
            .await
            .unwrap();

        let outcome = engine.run_sync().await.unwrap();
        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected a completed cycle");
        };
        assert_eq!(report.divergence, DivergenceKind::PushOnly);
        assert_eq!(report.pushed, 1);
        assert!(report.uploaded);
        assert_eq!(cloud.upload_count(), 1);
        assert_eq!(engine.replica.get_actions_count().await, 1);
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_decode_failure_reports_fetch_stage() {
        let dir = TempDir::new().unwrap();
        let cloud = Arc::new(InMemoryCloudStore::new());
        cloud.put(&FileRef::default(), b"{not json".to_vec()).unwrap();
        let engine = engine(&dir, cloud).await;
        let mut events = engine.subscribe();

        let err = engine.run_sync().await.unwrap_err();
        assert!(matches!(err, LedgerError::DecodeFailure(_)));

        assert_eq!(events.recv().await.unwrap().tag(), "SYNC_START");
        match events.recv().await.unwrap() {
            SyncEvent::Error(failure) => {
                assert_eq!(failure.stage, SyncState::Fetching);
                assert!(failure.retryable);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!engine.is_running());
    }
}
