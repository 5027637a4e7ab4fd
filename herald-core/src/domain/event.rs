//! Change events emitted by the activity watcher

use serde::{Deserialize, Serialize};

use crate::domain::activity::PipelineActivity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A normalized change to one pipeline activity
///
/// `seq` increases strictly in the order the watcher emitted events and is
/// what renders are ordered by, regardless of when they complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub seq: u64,
    pub kind: ChangeKind,
    pub activity: PipelineActivity,
    /// Part of the first listing after startup, so possibly reported before
    #[serde(default)]
    pub existing: bool,
}
