//! Notification correlator
//!
//! Owns the mapping from a pipeline run to the one message that reports it.
//! Each correlation key moves through `Absent -> Posted -> Updated* ->
//! Terminal`; the first render creates the message and every later render
//! edits it in place.
//!
//! Renders for the same key are serialized by a per-key lock and ordered by
//! the watcher's sequence number: an event older than the last one applied
//! to its key is dropped, so a slow render can never overwrite a newer one.
//!
//! A build that had already finished when the process started is recorded as
//! terminal without a message; a previous run reported it.

use herald_core::domain::event::{ChangeEvent, ChangeKind};
use herald_core::domain::notification::{CorrelationKey, NotificationRecord, NotificationState};
use herald_core::domain::source_config::SourceConfigs;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::service::dispatcher::{DispatchError, Dispatcher};
use crate::service::formatter::MessageFormatter;
use crate::service::resolver::IdentityResolver;

/// What handling one change event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A new message was created
    Posted,
    /// The existing message was edited
    Updated,
    /// The rendered payload matched the last one sent
    Unchanged,
    /// The key already reported a terminal status
    Frozen,
    /// A newer event for the key was already applied
    Stale,
    /// Finished before startup, recorded without a message
    Baseline,
    /// The repository is not configured for notifications
    Skipped,
    /// Deletions never touch messages
    Ignored,
}

#[derive(Debug, Default)]
struct KeyEntry {
    state: NotificationState,
    record: Option<NotificationRecord>,
    last_seq: Option<u64>,
}

pub struct Correlator {
    dispatcher: Arc<Dispatcher>,
    resolver: Arc<IdentityResolver>,
    formatter: MessageFormatter,
    source_configs: Arc<SourceConfigs>,
    entries: Mutex<HashMap<CorrelationKey, Arc<Mutex<KeyEntry>>>>,
    tracked: AtomicUsize,
}

impl Correlator {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        resolver: Arc<IdentityResolver>,
        formatter: MessageFormatter,
        source_configs: Arc<SourceConfigs>,
    ) -> Self {
        Self {
            dispatcher,
            resolver,
            formatter,
            source_configs,
            entries: Mutex::new(HashMap::new()),
            tracked: AtomicUsize::new(0),
        }
    }

    /// Applies one change event
    ///
    /// A dispatch failure leaves the key in its previous state: a key whose
    /// first post failed stays `Absent` and is posted on its next event.
    pub async fn handle(&self, event: ChangeEvent) -> Result<RenderOutcome, DispatchError> {
        let ChangeEvent {
            seq,
            kind,
            activity,
            existing,
        } = event;
        let key = activity.correlation_key();

        if kind == ChangeKind::Deleted {
            debug!("Ignoring deletion of {}", key);
            return Ok(RenderOutcome::Ignored);
        }

        let settings = self.source_configs.settings_for(&activity.repository);
        if !settings.should_notify(&activity.repository.branch) {
            debug!(
                "Notifications disabled for {} on branch {}",
                activity.repository.full_name(),
                activity.repository.branch
            );
            return Ok(RenderOutcome::Skipped);
        }

        let slot = self.slot(&key).await;
        let mut guard = slot.lock().await;
        let entry = &mut *guard;

        if entry.last_seq.is_some_and(|last| seq <= last) {
            debug!("Dropping stale event {} for {}", seq, key);
            return Ok(RenderOutcome::Stale);
        }
        entry.last_seq = Some(seq);

        if !entry.state.accepts_renders() {
            debug!("{} already reported {}, not rendering", key, activity.status);
            return Ok(RenderOutcome::Frozen);
        }

        if existing && entry.record.is_none() && activity.is_terminal() {
            debug!("{} finished before startup, not posting", key);
            entry.state = NotificationState::Terminal;
            return Ok(RenderOutcome::Baseline);
        }

        let user = self
            .resolver
            .resolve(&activity.commit.author_name, &activity.commit.author_email)
            .await;
        let payload = self.formatter.format(&activity, &user);
        let content_hash = payload.content_hash();
        let next_state = if activity.is_terminal() {
            NotificationState::Terminal
        } else {
            NotificationState::Updated
        };

        let Some(record) = entry.record.as_mut() else {
            let posted = self
                .dispatcher
                .send(&settings.channel, None, &payload)
                .await
                .inspect_err(|e| warn!("Posting notification for {} failed: {}", key, e))?;

            info!(
                "Posted notification for {} to {} ({})",
                key, posted.channel, activity.status
            );
            entry.record = Some(NotificationRecord {
                key,
                channel: posted.channel,
                message_id: posted.message_id,
                content_hash,
            });
            entry.state = if activity.is_terminal() {
                NotificationState::Terminal
            } else {
                NotificationState::Posted
            };
            self.tracked.fetch_add(1, Ordering::Relaxed);
            return Ok(RenderOutcome::Posted);
        };

        if record.content_hash == content_hash {
            debug!("Notification for {} unchanged", key);
            if activity.is_terminal() {
                entry.state = NotificationState::Terminal;
            }
            return Ok(RenderOutcome::Unchanged);
        }

        self.dispatcher
            .send(&record.channel, Some(&record.message_id), &payload)
            .await
            .inspect_err(|e| warn!("Updating notification for {} failed: {}", key, e))?;

        debug!("Updated notification for {} ({})", key, activity.status);
        record.content_hash = content_hash;
        entry.state = next_state;
        Ok(RenderOutcome::Updated)
    }

    /// Number of keys that have a live message
    ///
    /// Does not wait for in-flight renders.
    pub fn tracked_count(&self) -> usize {
        self.tracked.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub async fn state_of(&self, key: &CorrelationKey) -> NotificationState {
        let slot = self.entries.lock().await.get(key).cloned();
        match slot {
            Some(slot) => slot.lock().await.state,
            None => NotificationState::Absent,
        }
    }

    #[cfg(test)]
    pub async fn record_of(&self, key: &CorrelationKey) -> Option<NotificationRecord> {
        let slot = self.entries.lock().await.get(key).cloned()?;
        let entry = slot.lock().await;
        entry.record.clone()
    }

    async fn slot(&self, key: &CorrelationKey) -> Arc<Mutex<KeyEntry>> {
        self.entries
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDirectory, FakeIdentities, FakeMessages, activity, event, stage};
    use herald_client::ClientError;
    use herald_core::domain::activity::ActivityStatus;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn correlator_with(messages: Arc<FakeMessages>, configs: SourceConfigs) -> Correlator {
        let dispatcher = Dispatcher::new(messages, Duration::ZERO, CancellationToken::new());
        let resolver = IdentityResolver::new(
            Arc::new(FakeDirectory::with_user("dev@example.com", "U1", "dev")),
            Arc::new(FakeIdentities::default()),
            "jx",
        );
        Correlator::new(
            Arc::new(dispatcher),
            Arc::new(resolver),
            MessageFormatter::new(""),
            Arc::new(configs),
        )
    }

    fn correlator(messages: Arc<FakeMessages>) -> Correlator {
        correlator_with(messages, SourceConfigs::empty("#builds"))
    }

    #[tokio::test]
    async fn test_create_then_edit_then_freeze() {
        let messages = Arc::new(FakeMessages::default());
        let correlator = correlator(messages.clone());

        let running = activity(
            "build-1",
            ActivityStatus::Running,
            vec![stage("Build", ActivityStatus::Running, 0)],
        );
        let key = running.correlation_key();
        let outcome = correlator
            .handle(event(1, ChangeKind::Added, running))
            .await
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Posted);
        assert_eq!(correlator.state_of(&key).await, NotificationState::Posted);

        let posts = messages.posts();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].contains("Running"));
        assert!(posts[0].contains("Build"));
        assert!(posts[0].contains("<@U1>"));

        let stages = vec![
            stage("Build", ActivityStatus::Succeeded, 0),
            stage("Test", ActivityStatus::Running, 1),
        ];
        let progressed = activity("build-1", ActivityStatus::Running, stages.clone());
        let outcome = correlator
            .handle(event(2, ChangeKind::Modified, progressed))
            .await
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Updated);

        let record = correlator.record_of(&key).await.unwrap();
        let updates = messages.update_ids();
        assert_eq!(updates, vec![record.message_id.clone()]);

        // Status change alone still forces a render
        let succeeded = activity("build-1", ActivityStatus::Succeeded, stages.clone());
        let outcome = correlator
            .handle(event(3, ChangeKind::Modified, succeeded))
            .await
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Updated);
        assert_eq!(correlator.state_of(&key).await, NotificationState::Terminal);

        let mut late = activity("build-1", ActivityStatus::Succeeded, stages);
        late.commit.message = "amended".to_string();
        let outcome = correlator
            .handle(event(4, ChangeKind::Modified, late))
            .await
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Frozen);

        assert_eq!(messages.posts().len(), 1);
        assert_eq!(messages.update_ids().len(), 2);
        assert_eq!(correlator.tracked_count(), 1);
    }

    #[tokio::test]
    async fn test_identical_render_is_suppressed() {
        let messages = Arc::new(FakeMessages::default());
        let correlator = correlator(messages.clone());
        let snapshot = activity(
            "build-1",
            ActivityStatus::Running,
            vec![stage("Build", ActivityStatus::Running, 0)],
        );

        correlator
            .handle(event(1, ChangeKind::Added, snapshot.clone()))
            .await
            .unwrap();
        let outcome = correlator
            .handle(event(2, ChangeKind::Modified, snapshot))
            .await
            .unwrap();

        assert_eq!(outcome, RenderOutcome::Unchanged);
        assert_eq!(messages.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_event_is_dropped() {
        let messages = Arc::new(FakeMessages::default());
        let correlator = correlator(messages.clone());

        correlator
            .handle(event(5, ChangeKind::Added, activity("build-1", ActivityStatus::Running, vec![])))
            .await
            .unwrap();
        let outcome = correlator
            .handle(event(3, ChangeKind::Modified, activity("build-1", ActivityStatus::Pending, vec![])))
            .await
            .unwrap();

        assert_eq!(outcome, RenderOutcome::Stale);
        assert_eq!(messages.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_create_is_retried_on_next_event() {
        let messages = Arc::new(FakeMessages::default());
        messages.fail_next(ClientError::slack("not_in_channel"));
        let correlator = correlator(messages.clone());

        let first = activity("build-1", ActivityStatus::Running, vec![]);
        let key = first.correlation_key();
        let err = correlator
            .handle(event(1, ChangeKind::Added, first))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Permanent(_)));
        assert_eq!(correlator.state_of(&key).await, NotificationState::Absent);
        assert_eq!(correlator.tracked_count(), 0);

        let outcome = correlator
            .handle(event(
                2,
                ChangeKind::Modified,
                activity("build-1", ActivityStatus::Running, vec![stage("Build", ActivityStatus::Running, 0)]),
            ))
            .await
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Posted);
        assert_eq!(messages.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_events_create_once() {
        let messages = Arc::new(FakeMessages::default());
        let correlator = Arc::new(correlator(messages.clone()));

        let handles: Vec<_> = (1..=8)
            .map(|seq| {
                let correlator = correlator.clone();
                let stages = (0..seq as u32)
                    .map(|i| stage(&format!("Stage {}", i), ActivityStatus::Running, i))
                    .collect();
                let snapshot = activity("build-1", ActivityStatus::Running, stages);
                tokio::spawn(async move {
                    correlator
                        .handle(event(seq, ChangeKind::Modified, snapshot))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(messages.posts().len(), 1);
        assert_eq!(correlator.tracked_count(), 1);
    }

    #[tokio::test]
    async fn test_builds_finished_before_startup_are_not_posted() {
        let messages = Arc::new(FakeMessages::default());
        let correlator = correlator(messages.clone());

        let finished = activity("build-1", ActivityStatus::Succeeded, vec![]);
        let key = finished.correlation_key();
        let mut listed = event(1, ChangeKind::Added, finished.clone());
        listed.existing = true;
        let outcome = correlator.handle(listed).await.unwrap();
        assert_eq!(outcome, RenderOutcome::Baseline);
        assert_eq!(correlator.state_of(&key).await, NotificationState::Terminal);

        let mut late = finished;
        late.commit.message = "amended".to_string();
        let outcome = correlator
            .handle(event(2, ChangeKind::Modified, late))
            .await
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Frozen);

        // Still running at startup: reported as usual
        let mut running = event(3, ChangeKind::Added, activity("build-2", ActivityStatus::Running, vec![]));
        running.existing = true;
        let outcome = correlator.handle(running).await.unwrap();
        assert_eq!(outcome, RenderOutcome::Posted);

        assert_eq!(messages.posts().len(), 1);
        assert!(messages.updates().is_empty());
        assert_eq!(correlator.tracked_count(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_author_is_named_not_mentioned() {
        let messages = Arc::new(FakeMessages::default());
        let correlator = correlator(messages.clone());

        let mut snapshot = activity("build-2", ActivityStatus::Running, vec![]);
        snapshot.commit.author_name = "Outside Contributor".to_string();
        snapshot.commit.author_email = "someone@elsewhere.org".to_string();
        correlator
            .handle(event(1, ChangeKind::Added, snapshot))
            .await
            .unwrap();

        let posts = messages.posts();
        assert!(posts[0].contains("Author: Outside Contributor"));
        assert!(!posts[0].contains("<@"));
    }

    #[tokio::test]
    async fn test_disabled_repository_and_deletions_send_nothing() {
        let configs = SourceConfigs::from_yaml(
            "spec:\n  groups:\n    - owner: acme\n      repositories:\n        - name: api\n          slack:\n            notify: false\n",
            "#builds",
        )
        .unwrap();
        let messages = Arc::new(FakeMessages::default());
        let correlator = correlator_with(messages.clone(), configs);

        let snapshot = activity("build-1", ActivityStatus::Running, vec![]);
        let outcome = correlator
            .handle(event(1, ChangeKind::Added, snapshot.clone()))
            .await
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Skipped);

        let outcome = correlator
            .handle(event(2, ChangeKind::Deleted, snapshot))
            .await
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Ignored);
        assert!(messages.calls().is_empty());
    }
}
