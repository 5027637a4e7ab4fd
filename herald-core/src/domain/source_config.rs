//! Per-repository notification settings
//!
//! The source configuration maps repositories to notification preferences.
//! Settings inherit from repository to group to the document-wide defaults:
//!
//! ```yaml
//! spec:
//!   slack: { channel: "#builds", notify: true, pipeline: all }
//!   groups:
//!     - owner: acme
//!       slack: { channel: "#acme" }
//!       repositories:
//!         - name: api
//!           slack: { notify: false }
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::activity::RepositoryRef;

/// Which pipeline runs of a repository are notified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineFilter {
    All,
    /// Runs on the default branch (`main` or `master`)
    Release,
    /// Runs on pull request branches (`PR-<n>`)
    PullRequest,
}

impl PipelineFilter {
    pub fn matches(self, branch: &str) -> bool {
        let is_pr = branch.to_ascii_uppercase().starts_with("PR-");
        match self {
            PipelineFilter::All => true,
            PipelineFilter::Release => {
                !is_pr && (branch.eq_ignore_ascii_case("main") || branch.eq_ignore_ascii_case("master"))
            }
            PipelineFilter::PullRequest => is_pr,
        }
    }
}

impl Default for PipelineFilter {
    fn default() -> Self {
        Self::All
    }
}

/// Slack settings as written at any level of the file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackSettings {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub notify: Option<bool>,
    #[serde(default)]
    pub pipeline: Option<PipelineFilter>,
}

impl SlackSettings {
    /// Fills unset fields from `parent`
    fn inherit(&self, parent: &SlackSettings) -> SlackSettings {
        SlackSettings {
            channel: self.channel.clone().or_else(|| parent.channel.clone()),
            notify: self.notify.or(parent.notify),
            pipeline: self.pipeline.or(parent.pipeline),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    pub name: String,
    #[serde(default)]
    pub slack: Option<SlackSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryGroup {
    pub owner: String,
    #[serde(default)]
    pub slack: Option<SlackSettings>,
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfigSpec {
    #[serde(default)]
    pub slack: Option<SlackSettings>,
    #[serde(default)]
    pub groups: Vec<RepositoryGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SourceConfigFile {
    #[serde(default)]
    spec: SourceConfigSpec,
}

/// Effective settings for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifySettings {
    pub notify: bool,
    pub channel: String,
    pub pipeline: PipelineFilter,
}

impl NotifySettings {
    /// Whether a run on `branch` should produce a notification
    pub fn should_notify(&self, branch: &str) -> bool {
        self.notify && self.pipeline.matches(branch)
    }
}

/// Loaded source configuration, used as a repository lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfigs {
    default_channel: String,
    spec: SourceConfigSpec,
}

impl SourceConfigs {
    /// Configuration with no repository entries; every repository gets the defaults
    pub fn empty(default_channel: impl Into<String>) -> Self {
        Self {
            default_channel: default_channel.into(),
            spec: SourceConfigSpec::default(),
        }
    }

    pub fn new(default_channel: impl Into<String>, spec: SourceConfigSpec) -> Self {
        Self {
            default_channel: default_channel.into(),
            spec,
        }
    }

    /// Parses the YAML source configuration document
    pub fn from_yaml(
        yaml: &str,
        default_channel: impl Into<String>,
    ) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::empty(default_channel));
        }
        let file: SourceConfigFile = serde_yaml::from_str(yaml)?;
        Ok(Self::new(default_channel, file.spec))
    }

    pub fn spec(&self) -> &SourceConfigSpec {
        &self.spec
    }

    /// Resolves the effective settings for a repository
    pub fn settings_for(&self, repository: &RepositoryRef) -> NotifySettings {
        let root = self.spec.slack.clone().unwrap_or_default();

        let group = self
            .spec
            .groups
            .iter()
            .find(|g| g.owner.eq_ignore_ascii_case(&repository.owner));

        let effective = match group {
            Some(group) => {
                let group_settings = group.slack.clone().unwrap_or_default().inherit(&root);
                group
                    .repositories
                    .iter()
                    .find(|r| r.name.eq_ignore_ascii_case(&repository.repo))
                    .and_then(|r| r.slack.as_ref())
                    .map(|s| s.inherit(&group_settings))
                    .unwrap_or(group_settings)
            }
            None => root,
        };

        NotifySettings {
            notify: effective.notify.unwrap_or(true),
            channel: effective
                .channel
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| self.default_channel.clone()),
            pipeline: effective.pipeline.unwrap_or_default(),
        }
    }
}
