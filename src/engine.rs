//! Cascade execution
//!
//! One engine drives both directions. Undo walks a cascade newest to oldest
//! calling each handler's `reverse`; redo walks an undone cascade in the
//! order it was undone, most recent first, calling `apply`. Steps run one at
//! a time and a failed step never stops the ones after it. Nothing is rolled
//! back.
//!
//! A [`StepObserver`] sees every outcome as soon as its step finishes. The
//! manager uses one to persist undone flags while the cascade is running.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::backup::{BackupRef, BackupStore};
use crate::error::{FailureKind, ReversalError};
use crate::handlers::{Applied, HandlerRegistry};
use crate::operation::{OperationKind, OperationRecord};

/// Which half of the engine to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Undo,
    Redo,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undo => f.write_str("undo"),
            Self::Redo => f.write_str("redo"),
        }
    }
}

/// Result of processing one record
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    /// Id of the processed record
    pub operation_id: String,
    /// Kind of the processed record
    pub kind: OperationKind,
    /// Whether the filesystem change went through
    pub success: bool,
    /// Human-readable result or failure reason
    pub message: String,
    /// Where the pre-mutation snapshot went, if one was taken
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "backup_display")]
    pub backup: Option<BackupRef>,
    /// Failure category when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Set when the change went through but its undone flag could not be saved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

fn backup_display<S: serde::Serializer>(
    backup: &Option<BackupRef>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match backup {
        Some(backup) => serializer.serialize_str(&backup.to_string()),
        None => serializer.serialize_none(),
    }
}

impl OperationOutcome {
    fn from_result(record: &OperationRecord, result: Result<Applied, ReversalError>) -> Self {
        match result {
            Ok(applied) => Self {
                operation_id: record.id().to_string(),
                kind: record.kind(),
                success: true,
                message: applied.message,
                backup: applied.backup,
                failure: None,
                persist_error: None,
            },
            Err(err) => Self {
                operation_id: record.id().to_string(),
                kind: record.kind(),
                success: false,
                message: err.to_string(),
                backup: None,
                failure: Some(err.kind()),
                persist_error: None,
            },
        }
    }
}

/// Per-record outcomes of a cascade, in processing order
#[derive(Debug, Clone, Default, Serialize)]
pub struct CascadeReport {
    pub outcomes: Vec<OperationOutcome>,
}

impl CascadeReport {
    /// Append the outcome of the next step
    pub fn push(&mut self, outcome: OperationOutcome) {
        self.outcomes.push(outcome);
    }

    /// Steps whose filesystem change went through
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    /// Steps that left the filesystem untouched
    pub fn fail_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }

    /// Successful steps whose undone flag could not be saved
    pub fn persist_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.persist_error.is_some())
            .count()
    }

    /// True when every step succeeded
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}

/// Hook run after every step of a cascade
#[async_trait]
pub trait StepObserver: Send {
    /// Called once per record, in processing order. May annotate `outcome`.
    async fn observe(&mut self, direction: Direction, outcome: &mut OperationOutcome);
}

/// Observer that does nothing
#[async_trait]
impl StepObserver for () {
    async fn observe(&mut self, _direction: Direction, _outcome: &mut OperationOutcome) {}
}

/// Reversal (undo) and apply-forward (redo) engine
pub struct CascadeEngine {
    registry: HandlerRegistry,
    backups: Arc<dyn BackupStore>,
}

impl CascadeEngine {
    pub fn new(registry: HandlerRegistry, backups: Arc<dyn BackupStore>) -> Self {
        Self { registry, backups }
    }

    /// Engine with the built-in handler for every kind
    pub fn with_default_handlers(backups: Arc<dyn BackupStore>) -> Self {
        Self::new(HandlerRegistry::default(), backups)
    }

    pub fn backups(&self) -> &dyn BackupStore {
        self.backups.as_ref()
    }

    /// Process a single record
    pub async fn step(&self, direction: Direction, record: &OperationRecord) -> OperationOutcome {
        let result = match self.registry.get(record.kind()) {
            Some(handler) => match direction {
                Direction::Undo => handler.reverse(record, self.backups.as_ref()).await,
                Direction::Redo => handler.apply(record, self.backups.as_ref()).await,
            },
            None => Err(ReversalError::Unsupported(format!(
                "No handler registered for {}",
                record.kind()
            ))),
        };

        let outcome = OperationOutcome::from_result(record, result);
        if outcome.success {
            info!(
                direction = %direction,
                operation_id = %outcome.operation_id,
                kind = %outcome.kind,
                "{}",
                outcome.message
            );
        } else {
            warn!(
                direction = %direction,
                operation_id = %outcome.operation_id,
                kind = %outcome.kind,
                failure = ?outcome.failure,
                "{}",
                outcome.message
            );
        }
        outcome
    }

    /// Process a whole cascade in the order given, handing each outcome to
    /// `observer` before the next step starts
    pub async fn run(
        &self,
        direction: Direction,
        cascade: &[OperationRecord],
        observer: &mut dyn StepObserver,
    ) -> CascadeReport {
        let mut report = CascadeReport::default();
        for record in cascade {
            let mut outcome = self.step(direction, record).await;
            observer.observe(direction, &mut outcome).await;
            report.push(outcome);
        }

        info!(
            direction = %direction,
            total = cascade.len(),
            succeeded = report.success_count(),
            failed = report.fail_count(),
            unpersisted = report.persist_failures(),
            "Cascade finished"
        );
        report
    }

    /// Reverse a newest-first cascade
    pub async fn undo(&self, cascade: &[OperationRecord]) -> CascadeReport {
        self.run(Direction::Undo, cascade, &mut ()).await
    }

    /// Reapply a most-recently-undone-first cascade
    pub async fn redo(&self, cascade: &[OperationRecord]) -> CascadeReport {
        self.run(Direction::Redo, cascade, &mut ()).await
    }
}
