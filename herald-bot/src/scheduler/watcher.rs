//! Activity watcher
//!
//! Keeps a subscription to the pipeline activities of one namespace and
//! turns it into a sequence of [`ChangeEvent`]s. The subscription is listed
//! once, then watched from the listed resource version. When the server
//! closes the watch it is resumed from the last seen version; when the
//! version expires or anything fails, the namespace is listed again.
//!
//! The watcher remembers the last snapshot of each activity. Updates that do
//! not change what a notification would show are dropped here.
//!
//! Events from the first listing after process start are marked `existing`:
//! builds that had already finished then were reported by a previous run.
//! A watch that the server closes without delivering anything counts as a
//! failed attempt, so a stream that keeps closing is reopened with backoff.

use anyhow::{Context, Result};
use futures::StreamExt;
use herald_core::domain::activity::{ActivityId, PipelineActivity};
use herald_core::domain::event::{ChangeEvent, ChangeKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::repository::{ActivityRepository, StoreEvent};
use crate::service::backoff::Backoff;

/// Why a watch ended without error
#[derive(Debug, PartialEq, Eq)]
enum WatchEnd {
    /// The server closed the subscription
    Closed {
        /// Whether anything arrived before it closed
        delivered: bool,
    },
    /// The resume point is no longer available
    Expired,
    /// Nobody consumes events any more
    Stopped,
}

/// Watches pipeline activities in a namespace
pub struct ActivityWatcher {
    repository: Arc<dyn ActivityRepository>,
    namespace: String,
    backoff: Backoff,
    /// Event sequence, shared with restarted watchers
    sequence: Arc<AtomicU64>,
    /// Whether a watch is currently open
    connected: Arc<AtomicBool>,
    /// Set once the first listing of the process has been emitted
    primed: Arc<AtomicBool>,
    resource_version: Option<String>,
    snapshots: HashMap<ActivityId, PipelineActivity>,
}

impl ActivityWatcher {
    pub fn new(
        repository: Arc<dyn ActivityRepository>,
        namespace: impl Into<String>,
        backoff: Backoff,
        sequence: Arc<AtomicU64>,
        connected: Arc<AtomicBool>,
        primed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            repository,
            namespace: namespace.into(),
            backoff,
            sequence,
            connected,
            primed,
            resource_version: None,
            snapshots: HashMap::new(),
        }
    }

    /// Runs until cancelled or until the receiver is dropped
    ///
    /// Failures never end the loop; they are logged and the namespace is
    /// listed again after a backoff.
    pub async fn run(mut self, tx: mpsc::Sender<ChangeEvent>, cancel: CancellationToken) {
        info!("Watching pipeline activities in namespace {}", self.namespace);

        let mut failures = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.sync_and_watch(&tx) => result,
            };
            self.connected.store(false, Ordering::Relaxed);

            match result {
                Ok(WatchEnd::Stopped) => break,
                Ok(WatchEnd::Closed { delivered: true }) => {
                    debug!("Watch closed by server, resuming");
                    failures = 0;
                    continue;
                }
                Ok(WatchEnd::Closed { delivered: false }) => {
                    failures += 1;
                    debug!("Watch closed empty (attempt {})", failures);
                }
                Ok(WatchEnd::Expired) => {
                    info!("Watch resource version expired, listing again");
                    failures = 0;
                    continue;
                }
                Err(e) => {
                    failures += 1;
                    self.resource_version = None;
                    warn!("Activity watch failed (attempt {}): {:#}", failures, e);
                }
            }

            let delay = self
                .backoff
                .delay_for_attempt(failures)
                .unwrap_or(std::time::Duration::from_secs(30));
            debug!("Reopening activity watch in {:?}", delay);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.connected.store(false, Ordering::Relaxed);
        info!("Activity watcher for {} stopped", self.namespace);
    }

    /// Lists if needed, then consumes one watch until it ends
    async fn sync_and_watch(&mut self, tx: &mpsc::Sender<ChangeEvent>) -> Result<WatchEnd> {
        if self.resource_version.is_none() {
            let listing = self
                .repository
                .list(&self.namespace)
                .await
                .context("Failed to list pipeline activities")?;

            debug!(
                "Listed {} activities at version {:?}",
                listing.activities.len(),
                listing.resource_version
            );

            let existing = !self.primed.load(Ordering::SeqCst);
            if !self.reconcile(listing.activities, existing, tx).await {
                return Ok(WatchEnd::Stopped);
            }
            self.primed.store(true, Ordering::SeqCst);
            self.resource_version = listing.resource_version;
        }

        let mut stream = self
            .repository
            .watch(&self.namespace, self.resource_version.as_deref())
            .await
            .context("Failed to open activity watch")?;
        self.connected.store(true, Ordering::Relaxed);

        let mut delivered = false;
        while let Some(item) = stream.next().await {
            let item = item.context("Activity watch interrupted")?;
            delivered = true;
            match item {
                StoreEvent::Applied {
                    kind,
                    activity,
                    resource_version,
                } => {
                    if resource_version.is_some() {
                        self.resource_version = resource_version;
                    }
                    if !self.apply(kind, activity, false, tx).await {
                        return Ok(WatchEnd::Stopped);
                    }
                }
                StoreEvent::Bookmark { resource_version } => {
                    if resource_version.is_some() {
                        self.resource_version = resource_version;
                    }
                }
                StoreEvent::Expired => {
                    self.resource_version = None;
                    return Ok(WatchEnd::Expired);
                }
            }
        }

        Ok(WatchEnd::Closed { delivered })
    }

    /// Brings the snapshots in line with a fresh listing
    ///
    /// Returns `false` once the receiver is gone.
    async fn reconcile(
        &mut self,
        activities: Vec<PipelineActivity>,
        existing: bool,
        tx: &mpsc::Sender<ChangeEvent>,
    ) -> bool {
        let listed: HashSet<ActivityId> = activities.iter().map(|a| a.id.clone()).collect();

        for activity in activities {
            let kind = if self.snapshots.contains_key(&activity.id) {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            };
            if !self.apply(kind, activity, existing, tx).await {
                return false;
            }
        }

        // Records that vanished while nobody was watching
        let missing: Vec<ActivityId> = self
            .snapshots
            .keys()
            .filter(|id| !listed.contains(*id))
            .cloned()
            .collect();
        for id in missing {
            if let Some(activity) = self.snapshots.remove(&id) {
                if !self.emit(ChangeKind::Deleted, activity, false, tx).await {
                    return false;
                }
            }
        }

        true
    }

    /// Records a change and forwards it unless it changes nothing visible
    async fn apply(
        &mut self,
        kind: ChangeKind,
        activity: PipelineActivity,
        existing: bool,
        tx: &mpsc::Sender<ChangeEvent>,
    ) -> bool {
        match kind {
            ChangeKind::Deleted => {
                if activity.is_terminal() {
                    self.snapshots.remove(&activity.id);
                }
            }
            ChangeKind::Added | ChangeKind::Modified => {
                let unchanged = self
                    .snapshots
                    .get(&activity.id)
                    .is_some_and(|previous| previous.fingerprint() == activity.fingerprint());
                if unchanged {
                    debug!("No visible change to {}, dropping {:?}", activity.id, kind);
                    return true;
                }
                self.snapshots.insert(activity.id.clone(), activity.clone());
            }
        }

        self.emit(kind, activity, existing, tx).await
    }

    async fn emit(
        &self,
        kind: ChangeKind,
        activity: PipelineActivity,
        existing: bool,
        tx: &mpsc::Sender<ChangeEvent>,
    ) -> bool {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Event {} {:?} {}", seq, kind, activity.id);
        tx.send(ChangeEvent {
            seq,
            kind,
            activity,
            existing,
        })
        .await
        .is_ok()
    }
}
