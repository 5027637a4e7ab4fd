//! Pipeline activity domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::notification::CorrelationKey;

/// Identity of a pipeline activity record in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityId {
    pub namespace: String,
    pub name: String,
}

impl ActivityId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Repository that owns a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepositoryRef {
    /// `owner/repo`, used for logging and message headers
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Commit that triggered a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
}

/// Status of an activity or of one of its stages
///
/// Values that the orchestrator may add later deserialize to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityStatus {
    Pending,
    Running,
    Succeeded,
    #[serde(alias = "Error")]
    Failed,
    Aborted,
    NotExecuted,
    #[serde(other)]
    Unknown,
}

impl ActivityStatus {
    /// Terminal statuses freeze the notification for a build
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActivityStatus::Succeeded | ActivityStatus::Failed | ActivityStatus::Aborted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Pending => "Pending",
            ActivityStatus::Running => "Running",
            ActivityStatus::Succeeded => "Succeeded",
            ActivityStatus::Failed => "Failed",
            ActivityStatus::Aborted => "Aborted",
            ActivityStatus::NotExecuted => "NotExecuted",
            ActivityStatus::Unknown => "Unknown",
        }
    }
}

impl Default for ActivityStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub status: ActivityStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Rendering position, unique within an activity
    pub ordinal: u32,
}

impl Stage {
    /// Wall-clock duration, only known once the stage has completed
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }
}

/// A single execution of a CI/CD pipeline as observed in the cluster
///
/// The upstream orchestrator owns and mutates this record; the bot only
/// observes snapshots of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineActivity {
    pub id: ActivityId,
    pub repository: RepositoryRef,
    pub build: String,
    pub stages: Vec<Stage>,
    pub status: ActivityStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub commit: CommitInfo,
}

impl PipelineActivity {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Key tying this run to exactly one outbound message
    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.id.clone(), self.build.clone())
    }

    /// Stages sorted by ordinal position
    pub fn stages_in_order(&self) -> Vec<&Stage> {
        let mut stages: Vec<&Stage> = self.stages.iter().collect();
        stages.sort_by_key(|s| s.ordinal);
        stages
    }

    /// The parts of a snapshot that matter for rendering a notification
    ///
    /// Two snapshots with equal fingerprints render the same status, so a
    /// modification between them is not worth forwarding.
    pub fn fingerprint(&self) -> ActivityFingerprint {
        ActivityFingerprint {
            status: self.status,
            stages: self
                .stages_in_order()
                .into_iter()
                .map(|s| StageFingerprint {
                    name: s.name.clone(),
                    status: s.status,
                    completed_at: s.completed_at,
                })
                .collect(),
            completed_at: self.completed_at,
        }
    }
}

/// Comparable summary of an activity's rendered state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityFingerprint {
    status: ActivityStatus,
    stages: Vec<StageFingerprint>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StageFingerprint {
    name: String,
    status: ActivityStatus,
    completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stage(name: &str, status: ActivityStatus, ordinal: u32) -> Stage {
        Stage {
            name: name.to_string(),
            status,
            started_at: None,
            completed_at: None,
            ordinal,
        }
    }

    fn activity(stages: Vec<Stage>) -> PipelineActivity {
        PipelineActivity {
            id: ActivityId::new("jx", "acme-api-main-1"),
            repository: RepositoryRef {
                owner: "acme".to_string(),
                repo: "api".to_string(),
                branch: "main".to_string(),
            },
            build: "1".to_string(),
            stages,
            status: ActivityStatus::Running,
            started_at: None,
            completed_at: None,
            commit: CommitInfo::default(),
        }
    }

    #[test]
    fn test_status_deserializes_unknown_values() {
        let status: ActivityStatus = serde_json::from_str("\"TimedOut\"").unwrap();
        assert_eq!(status, ActivityStatus::Unknown);

        let status: ActivityStatus = serde_json::from_str("\"Error\"").unwrap();
        assert_eq!(status, ActivityStatus::Failed);

        let status: ActivityStatus = serde_json::from_str("\"NotExecuted\"").unwrap();
        assert_eq!(status, ActivityStatus::NotExecuted);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ActivityStatus::Succeeded.is_terminal());
        assert!(ActivityStatus::Failed.is_terminal());
        assert!(ActivityStatus::Aborted.is_terminal());
        assert!(!ActivityStatus::Running.is_terminal());
        assert!(!ActivityStatus::Pending.is_terminal());
        assert!(!ActivityStatus::NotExecuted.is_terminal());
        assert!(!ActivityStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_stages_in_order_sorts_by_ordinal() {
        let a = activity(vec![
            stage("Test", ActivityStatus::Pending, 2),
            stage("Build", ActivityStatus::Running, 1),
        ]);

        let names: Vec<&str> = a.stages_in_order().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Build", "Test"]);
    }

    #[test]
    fn test_fingerprint_ignores_irrelevant_fields() {
        let a = activity(vec![stage("Build", ActivityStatus::Running, 1)]);
        let mut b = a.clone();
        b.commit.message = "amended".to_string();
        b.started_at = Some(Utc::now());
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = a.clone();
        c.stages[0].status = ActivityStatus::Succeeded;
        assert_ne!(a.fingerprint(), c.fingerprint());

        let mut d = a.clone();
        d.completed_at = Some(Utc::now());
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_stage_duration() {
        let mut s = stage("Build", ActivityStatus::Succeeded, 1);
        assert!(s.duration().is_none());

        s.started_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
        s.completed_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 1, 30).unwrap());
        assert_eq!(s.duration(), Some(chrono::Duration::seconds(90)));
    }

    #[test]
    fn test_correlation_key_display() {
        let a = activity(vec![]);
        assert_eq!(a.correlation_key().to_string(), "jx/acme-api-main-1#1");
    }
}
