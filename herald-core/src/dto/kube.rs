//! Kubernetes API wire types
//!
//! Covers just enough of the list/watch protocol and of the `jenkins.io/v1`
//! `PipelineActivity` and `User` resources for the bot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::activity::{
    ActivityId, ActivityStatus, CommitInfo, PipelineActivity, RepositoryRef, Stage,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    #[serde(default)]
    pub resource_version: Option<String>,
}

/// Response of a collection GET
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectList<T> {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// `metav1.Status`, sent as the object of an `ERROR` watch event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusObject {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusObject {
    /// The requested resource version is too old to resume from
    pub fn is_gone(&self) -> bool {
        self.code == Some(410) || self.reason.as_deref() == Some("Expired")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkObject {
    #[serde(default)]
    pub metadata: ObjectMeta,
}

/// One line of a `?watch=true` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    Bookmark(BookmarkObject),
    Error(StatusObject),
}

// =============================================================================
// PipelineActivity
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineActivityResource {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PipelineActivitySpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineActivitySpec {
    /// `owner/repo/branch`
    #[serde(default)]
    pub pipeline: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub status: Option<ActivityStatus>,
    #[serde(default)]
    pub started_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<PipelineActivityStep>,
    #[serde(default)]
    pub git_owner: String,
    #[serde(default)]
    pub git_repository: String,
    #[serde(default)]
    pub git_branch: String,
    /// Git login of the commit author
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_email: String,
    #[serde(default, rename = "lastCommitSHA")]
    pub last_commit_sha: String,
    #[serde(default)]
    pub last_commit_message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineActivityStep {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub stage: Option<StageActivityStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageActivityStep {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<ActivityStatus>,
    #[serde(default)]
    pub started_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_timestamp: Option<DateTime<Utc>>,
}

impl PipelineActivityResource {
    /// Resource version of this object, if the server sent one
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// Converts the resource into the domain snapshot
    ///
    /// `fallback_namespace` is used when the object metadata carries none.
    pub fn into_activity(self, fallback_namespace: &str) -> PipelineActivity {
        let spec = self.spec;

        let mut parts = spec.pipeline.splitn(3, '/');
        let pipeline_owner = parts.next().unwrap_or_default();
        let pipeline_repo = parts.next().unwrap_or_default();
        let pipeline_branch = parts.next().unwrap_or_default();

        let pick = |primary: &str, fallback: &str| {
            if primary.is_empty() {
                fallback.to_string()
            } else {
                primary.to_string()
            }
        };

        let repository = RepositoryRef {
            owner: pick(&spec.git_owner, pipeline_owner),
            repo: pick(&spec.git_repository, pipeline_repo),
            branch: pick(&spec.git_branch, pipeline_branch),
        };

        let stages = spec
            .steps
            .into_iter()
            .filter(|step| step.kind.eq_ignore_ascii_case("stage"))
            .filter_map(|step| step.stage)
            .enumerate()
            .map(|(idx, stage)| Stage {
                name: stage.name,
                status: stage.status.unwrap_or_default(),
                started_at: stage.started_timestamp,
                completed_at: stage.completed_timestamp,
                ordinal: idx as u32,
            })
            .collect();

        let commit = CommitInfo {
            sha: spec.last_commit_sha,
            author_name: pick(&spec.author_name, &spec.author),
            author_email: spec.author_email,
            message: spec.last_commit_message,
        };

        PipelineActivity {
            id: ActivityId::new(
                self.metadata
                    .namespace
                    .unwrap_or_else(|| fallback_namespace.to_string()),
                self.metadata.name,
            ),
            repository,
            build: spec.build,
            stages,
            status: spec.status.unwrap_or_default(),
            started_at: spec.started_timestamp,
            completed_at: spec.completed_timestamp,
            commit,
        }
    }
}

// =============================================================================
// User
// =============================================================================

/// Providers whose account ids are git logins
const GIT_PROVIDERS: &[&str] = &["git", "github", "gitlab", "bitbucketserver", "gitea"];

const SLACK_PROVIDER: &str = "slack";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResource {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: UserSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub accounts: Vec<AccountReference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountReference {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub id: String,
}

impl UserResource {
    /// Id of the linked Slack account, if any
    pub fn slack_id(&self) -> Option<&str> {
        self.spec
            .accounts
            .iter()
            .find(|a| a.provider.eq_ignore_ascii_case(SLACK_PROVIDER) && !a.id.is_empty())
            .map(|a| a.id.as_str())
    }

    /// Whether this user is the given commit author
    pub fn matches_git_identity(&self, author_name: &str, author_email: &str) -> bool {
        let email = author_email.trim();
        if !email.is_empty() && self.spec.email.trim().eq_ignore_ascii_case(email) {
            return true;
        }

        let name = author_name.trim();
        if name.is_empty() {
            return false;
        }

        let login_match = self.spec.accounts.iter().any(|a| {
            GIT_PROVIDERS.iter().any(|p| a.provider.eq_ignore_ascii_case(p))
                && a.id.eq_ignore_ascii_case(name)
        });

        login_match || self.spec.name.eq_ignore_ascii_case(name)
    }
}
