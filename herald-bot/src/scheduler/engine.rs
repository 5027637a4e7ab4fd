//! Watch-and-notify engine
//!
//! Runs one supervised watcher task and a bounded pool of render workers.
//! The supervisor restarts the watcher when it panics or exits on its own;
//! the event sequence survives restarts, so ordering stays monotonic.
//!
//! At most one render per correlation key is in flight. Events arriving for
//! a busy key wait outside the pool, coalesced to the newest one, so a key
//! stuck in retries holds one worker and never the others.

use anyhow::{Context, Result};
use herald_core::domain::event::{ChangeEvent, ChangeKind};
use herald_core::domain::notification::CorrelationKey;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::repository::ActivityRepository;
use crate::scheduler::watcher::ActivityWatcher;
use crate::service::backoff::Backoff;
use crate::service::correlator::Correlator;
use crate::service::dispatcher::DispatchError;

/// Time in-flight renders get to finish after shutdown is requested
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Events buffered between the watcher and the workers
const EVENT_BUFFER: usize = 256;

/// The long-running engine
pub struct WatchActivities {
    activities: Arc<dyn ActivityRepository>,
    correlator: Arc<Correlator>,
    namespace: String,
    workers: usize,
    backoff: Backoff,
    sequence: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    primed: Arc<AtomicBool>,
}

impl WatchActivities {
    /// Creates the engine
    ///
    /// # Arguments
    /// * `activities` - Source of pipeline activity changes
    /// * `correlator` - Turns change events into notifications
    /// * `namespace` - Namespace to watch
    /// * `workers` - Maximum number of concurrent renders
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        correlator: Arc<Correlator>,
        namespace: impl Into<String>,
        workers: usize,
    ) -> Self {
        Self {
            activities,
            correlator,
            namespace: namespace.into(),
            workers: workers.max(1),
            backoff: Backoff::default(),
            sequence: Arc::new(AtomicU64::new(0)),
            connected: Arc::new(AtomicBool::new(false)),
            primed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set while the activity watch is open
    pub fn connected(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    /// Runs until `cancel` fires, then drains in-flight renders
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let supervisor = WatchSupervisor {
            activities: Arc::clone(&self.activities),
            namespace: self.namespace.clone(),
            backoff: self.backoff,
            sequence: Arc::clone(&self.sequence),
            connected: Arc::clone(&self.connected),
            primed: Arc::clone(&self.primed),
        };
        let supervisor = tokio::spawn(supervisor.run(tx, cancel.clone()));

        let mut pool = RenderPool::new(Arc::clone(&self.correlator), self.workers);

        info!("Render pool started with {} worker(s)", self.workers);

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                Some(joined) = pool.tasks.join_next_with_id(), if !pool.tasks.is_empty() => {
                    Next::Finished(joined)
                }
                event = rx.recv() => match event {
                    Some(event) => Next::Event(event),
                    None => break,
                },
            };

            let running = match next {
                Next::Finished(joined) => pool.finished(joined, &cancel).await?,
                Next::Event(event) => pool.submit(event, &cancel).await?,
            };
            if !running {
                break;
            }
        }

        pool.drain().await;

        if let Err(e) = supervisor.await {
            warn!("Watch supervisor ended abnormally: {}", e);
        }

        info!("Engine stopped");
        Ok(())
    }
}

enum Next {
    Finished(std::result::Result<(task::Id, ()), JoinError>),
    Event(ChangeEvent),
}

/// Bounded set of renders, one per correlation key
struct RenderPool {
    correlator: Arc<Correlator>,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    keys: HashMap<task::Id, CorrelationKey>,
    /// Keys with a render in flight, and the newest event waiting behind it
    busy: HashMap<CorrelationKey, Option<ChangeEvent>>,
}

impl RenderPool {
    fn new(correlator: Arc<Correlator>, workers: usize) -> Self {
        Self {
            correlator,
            semaphore: Arc::new(Semaphore::new(workers)),
            tasks: JoinSet::new(),
            keys: HashMap::new(),
            busy: HashMap::new(),
        }
    }

    /// Starts a render for `event`, or parks it behind its key's render
    ///
    /// Returns `false` when shutdown was requested while waiting for a worker.
    async fn submit(&mut self, event: ChangeEvent, cancel: &CancellationToken) -> Result<bool> {
        let key = event.activity.correlation_key();

        if let Some(waiting) = self.busy.get_mut(&key) {
            // Deletions never render, so they must not displace a pending update
            if event.kind != ChangeKind::Deleted || waiting.is_none() {
                if let Some(replaced) = waiting.replace(event) {
                    debug!("Event {} for {} superseded", replaced.seq, key);
                }
            }
            return Ok(true);
        }

        self.start(key, event, cancel).await
    }

    /// Releases the key of a finished render and starts its waiting event
    async fn finished(
        &mut self,
        joined: std::result::Result<(task::Id, ()), JoinError>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let id = match joined {
            Ok((id, ())) => id,
            Err(e) => {
                if e.is_panic() {
                    error!("Render task panicked: {}", e);
                }
                e.id()
            }
        };

        let Some(key) = self.keys.remove(&id) else {
            return Ok(true);
        };
        match self.busy.remove(&key).flatten() {
            Some(event) => self.start(key, event, cancel).await,
            None => Ok(true),
        }
    }

    async fn start(
        &mut self,
        key: CorrelationKey,
        event: ChangeEvent,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Ok(false),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.context("Worker pool closed")?
            }
        };

        let correlator = Arc::clone(&self.correlator);
        let handle = self.tasks.spawn(async move {
            let _permit = permit;
            render(&correlator, event).await;
        });
        self.keys.insert(handle.id(), key.clone());
        self.busy.insert(key, None);
        Ok(true)
    }

    /// Gives in-flight renders the grace period, then aborts them
    async fn drain(&mut self) {
        let parked = self.busy.values().filter(|e| e.is_some()).count();
        if parked > 0 {
            debug!("Dropping {} event(s) waiting for a busy key", parked);
        }

        if self.tasks.is_empty() {
            return;
        }

        info!(
            "Waiting up to {:?} for {} in-flight render(s)",
            SHUTDOWN_GRACE,
            self.tasks.len()
        );

        let tasks = &mut self.tasks;
        let finished = time::timeout(SHUTDOWN_GRACE, async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        })
        .await;

        if finished.is_err() {
            warn!("Aborting {} render(s) still running", self.tasks.len());
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }
    }
}

/// Keeps a watcher running until shutdown
struct WatchSupervisor {
    activities: Arc<dyn ActivityRepository>,
    namespace: String,
    backoff: Backoff,
    sequence: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    primed: Arc<AtomicBool>,
}

impl WatchSupervisor {
    async fn run(self, tx: mpsc::Sender<ChangeEvent>, cancel: CancellationToken) {
        let mut restarts = 0u32;

        loop {
            let watcher = ActivityWatcher::new(
                Arc::clone(&self.activities),
                self.namespace.clone(),
                self.backoff,
                Arc::clone(&self.sequence),
                Arc::clone(&self.connected),
                Arc::clone(&self.primed),
            );

            match tokio::spawn(watcher.run(tx.clone(), cancel.clone())).await {
                Ok(()) if cancel.is_cancelled() || tx.is_closed() => break,
                Ok(()) => warn!("Activity watcher exited unexpectedly"),
                Err(e) if e.is_panic() => error!("Activity watcher panicked: {}", e),
                Err(e) => warn!("Activity watcher task failed: {}", e),
            }

            restarts += 1;
            let delay = self
                .backoff
                .delay_for_attempt(restarts)
                .unwrap_or(Duration::from_secs(30));
            info!("Restarting activity watcher in {:?}", delay);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = time::sleep(delay) => {}
            }
        }
    }
}

async fn render(correlator: &Correlator, event: ChangeEvent) {
    let key = event.activity.correlation_key();
    let seq = event.seq;

    match correlator.handle(event).await {
        Ok(outcome) => debug!("Event {} for {}: {:?}", seq, key, outcome),
        Err(DispatchError::Cancelled) => debug!("Render of {} cancelled", key),
        // Logged by the correlator; the key keeps its last state
        Err(_) => {}
    }
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Render task panicked: {}", e);
        }
    }
}
