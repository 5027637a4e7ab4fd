//! In-memory repositories and fixtures for unit tests

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use herald_client::{ClientError, Result};
use herald_core::domain::activity::{
    ActivityId, ActivityStatus, CommitInfo, PipelineActivity, RepositoryRef, Stage,
};
use herald_core::domain::event::{ChangeEvent, ChangeKind};
use herald_core::domain::source_config::SourceConfigs;
use herald_core::dto::kube::{AccountReference, ObjectMeta, UserResource, UserSpec};
use herald_core::dto::message::{Payload, PostedMessage};
use herald_core::dto::slack::SlackUser;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::repository::{
    ActivityEventStream, ActivityListing, ActivityRepository, IdentityRepository,
    MessageRepository, StoreEvent, UserDirectory,
};
use crate::service::{Correlator, Dispatcher, IdentityResolver, MessageFormatter};

// =============================================================================
// Fixtures
// =============================================================================

/// An activity of `acme/api` on `main`, build 1, authored by dev@example.com
pub fn activity(name: &str, status: ActivityStatus, stages: Vec<Stage>) -> PipelineActivity {
    PipelineActivity {
        id: ActivityId::new("jx", name),
        repository: RepositoryRef {
            owner: "acme".to_string(),
            repo: "api".to_string(),
            branch: "main".to_string(),
        },
        build: "1".to_string(),
        stages,
        status,
        started_at: None,
        completed_at: None,
        commit: CommitInfo {
            sha: "0123456789abcdef".to_string(),
            author_name: "Dev".to_string(),
            author_email: "dev@example.com".to_string(),
            message: "Fix the build".to_string(),
        },
    }
}

pub fn stage(name: &str, status: ActivityStatus, ordinal: u32) -> Stage {
    Stage {
        name: name.to_string(),
        status,
        started_at: None,
        completed_at: None,
        ordinal,
    }
}

pub fn event(seq: u64, kind: ChangeKind, activity: PipelineActivity) -> ChangeEvent {
    ChangeEvent {
        seq,
        kind,
        activity,
        existing: false,
    }
}

pub fn payload(text: &str) -> Payload {
    Payload {
        text: text.to_string(),
        attachments: Vec::new(),
    }
}

/// Correlator over the given messages with no known users
pub fn correlator(messages: Arc<FakeMessages>) -> Arc<Correlator> {
    let dispatcher = Dispatcher::new(messages, Duration::ZERO, CancellationToken::new());
    let resolver = IdentityResolver::new(
        Arc::new(FakeDirectory::default()),
        Arc::new(FakeIdentities::default()),
        "jx",
    );
    Arc::new(Correlator::new(
        Arc::new(dispatcher),
        Arc::new(resolver),
        MessageFormatter::new(""),
        Arc::new(SourceConfigs::empty("#builds")),
    ))
}

// =============================================================================
// Messages
// =============================================================================

/// A successful messaging call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Post {
        channel: String,
        text: String,
    },
    Update {
        channel: String,
        message_id: String,
        text: String,
    },
}

/// Records calls; scripted failures are returned first, in order
#[derive(Default)]
pub struct FakeMessages {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<VecDeque<ClientError>>,
    matching_failures: Mutex<Vec<(String, ClientError)>>,
    attempts: AtomicUsize,
}

impl FakeMessages {
    pub fn fail_next(&self, error: ClientError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Fails the next call whose rendered text contains `fragment`
    pub fn fail_next_matching(&self, fragment: &str, error: ClientError) {
        self.matching_failures
            .lock()
            .unwrap()
            .push((fragment.to_string(), error));
    }

    /// Every call made, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered text of each created message
    pub fn posts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Post { text, .. } => Some(text),
                Call::Update { .. } => None,
            })
            .collect()
    }

    /// Rendered text of each edit
    pub fn updates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update { text, .. } => Some(text),
                Call::Post { .. } => None,
            })
            .collect()
    }

    /// Message id targeted by each edit
    pub fn update_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update { message_id, .. } => Some(message_id),
                Call::Post { .. } => None,
            })
            .collect()
    }

    fn attempt(&self, text: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let mut matching = self.matching_failures.lock().unwrap();
        if let Some(i) = matching.iter().position(|(f, _)| text.contains(f.as_str())) {
            return Err(matching.remove(i).1);
        }
        drop(matching);

        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MessageRepository for FakeMessages {
    async fn post_message(&self, channel: &str, payload: &Payload) -> Result<PostedMessage> {
        let text = payload.plain_text();
        self.attempt(&text)?;

        let mut calls = self.calls.lock().unwrap();
        calls.push(Call::Post {
            channel: channel.to_string(),
            text,
        });
        Ok(PostedMessage {
            channel: channel.to_string(),
            message_id: format!("1700000000.{:06}", calls.len()),
        })
    }

    async fn update_message(
        &self,
        channel: &str,
        message_id: &str,
        payload: &Payload,
    ) -> Result<PostedMessage> {
        let text = payload.plain_text();
        self.attempt(&text)?;

        self.calls.lock().unwrap().push(Call::Update {
            channel: channel.to_string(),
            message_id: message_id.to_string(),
            text,
        });
        Ok(PostedMessage {
            channel: channel.to_string(),
            message_id: message_id.to_string(),
        })
    }
}

// =============================================================================
// Identities
// =============================================================================

#[derive(Default)]
pub struct FakeDirectory {
    users: Vec<(String, SlackUser)>,
    failing: bool,
    lookups: Mutex<Vec<String>>,
}

impl FakeDirectory {
    pub fn with_user(email: &str, id: &str, name: &str) -> Self {
        let user = SlackUser {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        };
        Self {
            users: vec![(email.to_string(), user)],
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    /// Emails looked up, in order
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<SlackUser>> {
        self.lookups.lock().unwrap().push(email.to_string());

        if self.failing {
            return Err(ClientError::api_error(503, "directory unavailable"));
        }
        Ok(self
            .users
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(email))
            .map(|(_, user)| user.clone()))
    }
}

#[derive(Default)]
pub struct FakeIdentities {
    users: Vec<UserResource>,
    failing: bool,
}

impl FakeIdentities {
    /// A user whose GitHub login links to a Slack id
    pub fn with_link(login: &str, name: &str, slack_id: &str) -> Self {
        let user = UserResource {
            metadata: ObjectMeta {
                name: login.to_string(),
                ..Default::default()
            },
            spec: UserSpec {
                name: name.to_string(),
                email: String::new(),
                accounts: vec![
                    AccountReference {
                        provider: "github".to_string(),
                        id: login.to_string(),
                    },
                    AccountReference {
                        provider: "slack".to_string(),
                        id: slack_id.to_string(),
                    },
                ],
            },
        };
        Self {
            users: vec![user],
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            users: Vec::new(),
            failing: true,
        }
    }
}

#[async_trait]
impl IdentityRepository for FakeIdentities {
    async fn list_users(&self, _namespace: &str) -> Result<Vec<UserResource>> {
        if self.failing {
            return Err(ClientError::api_error(500, "apiserver unavailable"));
        }
        Ok(self.users.clone())
    }
}

// =============================================================================
// Activities
// =============================================================================

/// Serves scripted listings and watches
///
/// Once the scripted watches run out, a watch stays open forever. Once the
/// listings run out, an empty listing is returned.
#[derive(Default)]
pub struct FakeActivities {
    listings: Mutex<VecDeque<Result<ActivityListing>>>,
    watches: Mutex<VecDeque<Vec<Result<StoreEvent>>>>,
    list_calls: AtomicUsize,
    watch_calls: Mutex<Vec<Option<String>>>,
}

impl FakeActivities {
    pub fn push_listing(&self, listing: Result<ActivityListing>) {
        self.listings.lock().unwrap().push_back(listing);
    }

    pub fn push_watch(&self, events: Vec<Result<StoreEvent>>) {
        self.watches.lock().unwrap().push_back(events);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Resource version each watch started from
    pub fn watch_calls(&self) -> Vec<Option<String>> {
        self.watch_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivityRepository for FakeActivities {
    async fn list(&self, _namespace: &str) -> Result<ActivityListing> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.listings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ActivityListing::default()))
    }

    async fn watch(
        &self,
        _namespace: &str,
        resource_version: Option<&str>,
    ) -> Result<ActivityEventStream> {
        self.watch_calls
            .lock()
            .unwrap()
            .push(resource_version.map(str::to_string));

        match self.watches.lock().unwrap().pop_front() {
            Some(events) => Ok(stream::iter(events).boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }
}
