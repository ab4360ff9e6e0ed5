//! Cascade selection
//!
//! Records build on the filesystem state left by the ones before them, so a
//! record can only be undone together with everything newer than it (and
//! redone together with everything undone after it). Selecting position `i`
//! of a newest-first list selects positions `0..=i`.

use crate::error::UndoError;
use crate::operation::OperationRecord;

/// The record a cascade ends at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeTarget {
    Id(String),
    Index(usize),
}

impl CascadeTarget {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }
}

impl From<usize> for CascadeTarget {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Position of the target in `records`
pub fn locate(records: &[OperationRecord], target: &CascadeTarget) -> Result<usize, UndoError> {
    match target {
        CascadeTarget::Id(id) => records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| UndoError::OperationNotFound(id.clone())),
        CascadeTarget::Index(index) if *index < records.len() => Ok(*index),
        CascadeTarget::Index(index) => Err(UndoError::IndexOutOfRange {
            index: *index,
            len: records.len(),
        }),
    }
}

/// The prefix of `records` up to and including the target
pub fn plan_cascade(
    records: &[OperationRecord],
    target: &CascadeTarget,
) -> Result<Vec<OperationRecord>, UndoError> {
    let end = locate(records, target)?;
    Ok(records[..=end].to_vec())
}
