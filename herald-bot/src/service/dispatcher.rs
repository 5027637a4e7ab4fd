//! Outbound message dispatcher
//!
//! All create and edit calls go through one queue: a fair async mutex held
//! for the duration of a single attempt. Consecutive calls are spaced by a
//! minimum interval, so bursts queue up instead of tripping the platform's
//! rate limit. Retries release the queue while they back off.

use herald_client::ClientError;
use herald_core::dto::message::{Payload, PostedMessage};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::repository::MessageRepository;
use crate::service::backoff::Backoff;

/// Maximum attempts per logical send
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The platform rejected the call in a way retrying cannot fix
    #[error("rejected: {0}")]
    Permanent(#[source] ClientError),

    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ClientError,
    },

    #[error("cancelled by shutdown")]
    Cancelled,
}

pub struct Dispatcher {
    messages: Arc<dyn MessageRepository>,
    min_interval: Duration,
    backoff: Backoff,
    cancel: CancellationToken,
    /// Completion time of the previous call; the lock is the outbound queue
    last_call: Mutex<Option<Instant>>,
}

impl Dispatcher {
    /// Creates a dispatcher with the default retry policy
    ///
    /// # Arguments
    /// * `messages` - Messaging capability
    /// * `min_interval` - Minimum spacing between two outbound calls
    /// * `cancel` - Shutdown signal; pending backoffs end early when it fires
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        min_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self::with_backoff(
            messages,
            min_interval,
            Backoff::default().with_max_attempts(MAX_ATTEMPTS),
            cancel,
        )
    }

    pub fn with_backoff(
        messages: Arc<dyn MessageRepository>,
        min_interval: Duration,
        backoff: Backoff,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            messages,
            min_interval,
            backoff,
            cancel,
            last_call: Mutex::new(None),
        }
    }

    /// Creates a message, or edits `existing` when given
    ///
    /// Transient failures are retried with backoff, honouring a platform
    /// supplied retry delay. Permanent failures return immediately.
    pub async fn send(
        &self,
        channel: &str,
        existing: Option<&str>,
        payload: &Payload,
    ) -> Result<PostedMessage, DispatchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match self.attempt(channel, existing, payload).await {
                Ok(posted) => {
                    if attempt > 1 {
                        info!(
                            "Delivered message to {} after {} attempt(s)",
                            channel, attempt
                        );
                    }
                    return Ok(posted);
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                return Err(DispatchError::Permanent(error));
            }

            let Some(delay) = self.backoff.delay_for_attempt(attempt) else {
                return Err(DispatchError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            };
            let delay = error.retry_after().unwrap_or(delay);

            warn!(
                "Call to {} failed (attempt {}): {}. Retrying in {:?}",
                channel, attempt, error, delay
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(DispatchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(
        &self,
        channel: &str,
        existing: Option<&str>,
        payload: &Payload,
    ) -> Result<PostedMessage, ClientError> {
        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let next = previous + self.min_interval;
            if next > Instant::now() {
                debug!("Spacing call to {} until {:?}", channel, next);
                tokio::time::sleep_until(next).await;
            }
        }

        let result = match existing {
            None => self.messages.post_message(channel, payload).await,
            Some(message_id) => {
                self.messages
                    .update_message(channel, message_id, payload)
                    .await
            }
        };

        *last_call = Some(Instant::now());
        result
    }
}
