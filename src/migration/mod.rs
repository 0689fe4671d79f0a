//! Versioned upgrade chain for the local database layout.

pub mod steps;

pub use steps::{LEDGER_SCHEMA_VERSION, ledger_migrations};

use crate::core::{LedgerError, Result};
use crate::storage::{LocalDatabase, StoreLayout};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Pure transition from the layout at version N-1 to the layout at N.
pub type LayoutMigrationFn = Arc<dyn Fn(StoreLayout) -> Result<StoreLayout> + Send + Sync>;

#[derive(Clone)]
pub struct MigrationStep {
    pub target_version: u32,
    pub description: String,
    apply: LayoutMigrationFn,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("target_version", &self.target_version)
            .field("description", &self.description)
            .finish()
    }
}

impl MigrationStep {
    pub fn new<F>(target_version: u32, description: impl Into<String>, apply: F) -> Self
    where
        F: Fn(StoreLayout) -> Result<StoreLayout> + Send + Sync + 'static,
    {
        Self {
            target_version,
            description: description.into(),
            apply: Arc::new(apply),
        }
    }

    /// Runs the step against a layout without touching any database.
    pub fn apply(&self, layout: StoreLayout) -> Result<StoreLayout> {
        (self.apply)(layout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: Vec<u32>,
}

impl MigrationReport {
    pub fn migrated(&self) -> bool {
        !self.applied.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaMigrator {
    steps: Vec<MigrationStep>,
}

impl SchemaMigrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Highest version the chain produces; 0 for an empty chain.
    pub fn latest_version(&self) -> u32 {
        self.steps.last().map(|step| step.target_version).unwrap_or(0)
    }

    /// Registers a step, validating the chain immediately.
    pub fn add_step(&mut self, step: MigrationStep) -> Result<()> {
        self.steps.push(step);
        if let Err(err) = self.validate() {
            self.steps.pop();
            return Err(err);
        }
        Ok(())
    }

    pub fn with_step(mut self, step: MigrationStep) -> Result<Self> {
        self.add_step(step)?;
        Ok(self)
    }

    /// A copy of the chain that stops at `max_version`.
    pub fn truncated(&self, max_version: u32) -> Self {
        Self {
            steps: self
                .steps
                .iter()
                .filter(|step| step.target_version <= max_version)
                .cloned()
                .collect(),
        }
    }

    /// Checks for:
    /// - versions >= 1,
    /// - strictly ascending registration order,
    /// - duplicate versions.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        let mut previous = 0u32;
        for step in &self.steps {
            if step.target_version == 0 {
                return Err(LedgerError::InvalidArgument(
                    "migration target version must be >= 1".to_string(),
                ));
            }
            if !seen.insert(step.target_version) {
                return Err(LedgerError::InvalidArgument(format!(
                    "duplicate migration step for version {}",
                    step.target_version
                )));
            }
            if step.target_version <= previous {
                return Err(LedgerError::InvalidArgument(format!(
                    "migration step {} registered after {}",
                    step.target_version, previous
                )));
            }
            previous = step.target_version;
        }
        Ok(())
    }

    /// Steps that still have to run for a database at `from_version`.
    pub fn pending(&self, from_version: u32) -> Result<Vec<&MigrationStep>> {
        let latest = self.latest_version();
        if from_version > latest {
            return Err(LedgerError::MigrationFailure(format!(
                "database schema version {} is newer than the supported version {}",
                from_version, latest
            )));
        }
        Ok(self
            .steps
            .iter()
            .filter(|step| step.target_version > from_version)
            .collect())
    }

    /// Folds the pending steps over `layout` in memory.
    pub fn plan_layout(&self, from_version: u32, layout: StoreLayout) -> Result<StoreLayout> {
        self.validate()?;
        let mut current = layout;
        for step in self.pending(from_version)? {
            current = Self::run_step(step, current)?;
        }
        Ok(current)
    }

    /// Brings `db` to the latest version, committing after each step.
    ///
    /// A failing step leaves the database at the last committed version and
    /// surfaces `MigrationFailure`; the caller must not use the database.
    pub async fn migrate(&self, db: &mut LocalDatabase) -> Result<MigrationReport> {
        self.validate()
            .map_err(|err| LedgerError::MigrationFailure(err.to_string()))?;

        let from_version = db.schema_version();
        let pending = self.pending(from_version)?;
        let mut applied = Vec::with_capacity(pending.len());

        for step in pending {
            let span = info_span!(
                "ledger.migration.step",
                version = step.target_version,
                description = %step.description
            );

            let next = span.in_scope(|| Self::run_step(step, db.layout().clone()))?;
            db.commit_layout(step.target_version, next)
                .instrument(span.clone())
                .await
                .map_err(|err| {
                    LedgerError::MigrationFailure(format!(
                        "commit of version {} failed: {}",
                        step.target_version, err
                    ))
                })?;
            span.in_scope(|| event!(Level::INFO, "migration step applied"));
            applied.push(step.target_version);
        }

        Ok(MigrationReport {
            from_version,
            to_version: db.schema_version(),
            applied,
        })
    }

    fn run_step(step: &MigrationStep, layout: StoreLayout) -> Result<StoreLayout> {
        let before = layout.clone();
        let next = step.apply(layout).map_err(|err| {
            event!(Level::ERROR, version = step.target_version, error = %err, "migration step failed");
            LedgerError::MigrationFailure(format!(
                "step {} ({}) failed: {}",
                step.target_version, step.description, err
            ))
        })?;

        let dropped = before.dropped_logs(&next);
        if !dropped.is_empty() {
            return Err(LedgerError::MigrationFailure(format!(
                "step {} ({}) would drop action log(s): {}",
                step.target_version,
                step.description,
                dropped.join(", ")
            )));
        }
        Ok(next)
    }
}
