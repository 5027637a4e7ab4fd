//! Notification domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::activity::ActivityId;

/// Stable identifier tying one activity build to one outbound message
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationKey {
    pub activity: ActivityId,
    pub build: String,
}

impl CorrelationKey {
    pub fn new(activity: ActivityId, build: impl Into<String>) -> Self {
        Self {
            activity,
            build: build.into(),
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.activity, self.build)
    }
}

/// The message posted for a correlation key
///
/// Created on the first successful post and updated on every subsequent
/// render. Records are kept for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub key: CorrelationKey,
    pub channel: String,
    pub message_id: String,
    pub content_hash: String,
}

/// Lifecycle of a correlation key
///
/// `Absent -> Posted -> Updated* -> Terminal`. Terminal is only reached once a
/// terminal activity status has been rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationState {
    Absent,
    Posted,
    Updated,
    Terminal,
}

impl NotificationState {
    /// Whether further change events may still produce outbound calls
    pub fn accepts_renders(self) -> bool {
        !matches!(self, NotificationState::Terminal)
    }
}

impl Default for NotificationState {
    fn default() -> Self {
        Self::Absent
    }
}
