//! Slack Web API wire types

use serde::{Deserialize, Serialize};

use crate::dto::message::Attachment;

/// Body of `chat.postMessage`
#[derive(Debug, Clone, Serialize)]
pub struct PostMessageRequest<'a> {
    pub channel: &'a str,
    pub text: &'a str,
    pub attachments: &'a [Attachment],
    pub unfurl_links: bool,
}

/// Body of `chat.update`
#[derive(Debug, Clone, Serialize)]
pub struct UpdateMessageRequest<'a> {
    pub channel: &'a str,
    pub ts: &'a str,
    pub text: &'a str,
    pub attachments: &'a [Attachment],
}

/// Common envelope of every Web API reply
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

/// Reply of `users.lookupByEmail`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupUserResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub user: Option<SlackUser>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub profile: Option<SlackProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl SlackUser {
    /// Best human-readable name: profile display name, then real name, then handle
    pub fn display_name(&self) -> String {
        let profile = self.profile.as_ref();
        [
            profile.and_then(|p| p.display_name.as_deref()),
            profile.and_then(|p| p.real_name.as_deref()),
            self.real_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|n| !n.trim().is_empty())
        .unwrap_or(self.name.as_str())
        .to_string()
    }
}
