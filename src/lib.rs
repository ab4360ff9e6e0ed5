//! # Burrow
//!
//! Undo and redo for AI agent sessions - dig back through what the agent did.
//!
//! This crate provides:
//! - Extraction of file operations from an agent's activity log
//! - Cascading undo, newest operation first
//! - Redo of undone operations, in the order they were undone
//! - Backups of every file a reversal overwrites or deletes
//! - Local hook-fed sessions and dry-run previews
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   UndoManager                    │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  │
//! │  │    Log     │  │   Local    │  │  Session   │  │
//! │  │ Extractor  │  │  Session   │  │  Locator   │  │
//! │  └────────────┘  └────────────┘  └────────────┘  │
//! │        │               │                         │
//! │        ▼               ▼                         │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │        UndoStateTracker / cascade          │  │
//! │  │   active (newest first) ⇄ undone view      │  │
//! │  └────────────────────────────────────────────┘  │
//! │                      │                           │
//! │                      ▼                           │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │     CascadeEngine → HandlerRegistry        │  │
//! │  │   reverse / apply per kind, BackupStore    │  │
//! │  └────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use burrow::{CascadeTarget, UndoConfig, UndoManager};
//!
//! let manager = UndoManager::new(UndoConfig::default());
//! manager.init().await?;
//!
//! let log = manager.current_log(&cwd).await?.expect("no session");
//!
//! // Undo everything back to (and including) the third newest operation
//! let active = manager.list_active(&log).await?;
//! let cascade = manager.plan_cascade(&active, &CascadeTarget::Index(2))?;
//! let report = manager.undo(&log, &cascade).await;
//!
//! // Redo the most recently undone operation
//! let undone = manager.list_undone(&log).await?;
//! let cascade = manager.plan_cascade(&undone, &CascadeTarget::Index(0))?;
//! manager.redo(&log, &cascade).await;
//! ```

pub mod backup;
pub mod cascade;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod handlers;
pub mod manager;
pub mod operation;
pub mod preview;
pub mod session;
pub mod shell;
pub mod undo_state;

pub use backup::{BackupKey, BackupPurpose, BackupRef, BackupStore, FsBackupStore, MemoryBackupStore};
pub use cascade::{plan_cascade, CascadeTarget};
pub use config::UndoConfig;
pub use discovery::{SessionLocator, SessionLog};
pub use engine::{CascadeEngine, CascadeReport, Direction, OperationOutcome, StepObserver};
pub use error::{FailureKind, ReversalError, UndoError};
pub use extractor::LogExtractor;
pub use handlers::{HandlerRegistry, OperationHandler};
pub use manager::UndoManager;
pub use operation::{OperationKind, OperationPayload, OperationRecord};
pub use preview::{Preview, PreviewAction};
pub use session::{HookInput, LocalSession};
pub use undo_state::{UndoState, UndoStateTracker};
