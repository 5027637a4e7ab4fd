//! Identity resolver
//!
//! Maps a commit author to a Slack user so the notification can mention
//! them. Resolution never fails: lookup errors are logged and the chain
//! falls through to an unresolved result carrying the raw author name.
//!
//! Resolution order:
//! 1. Slack directory lookup by email (case-insensitive)
//! 2. Cluster `User` resource linking the git identity to a Slack account
//! 3. Unresolved

use herald_core::domain::user::{ResolutionMethod, ResolvedUser};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::repository::{IdentityRepository, UserDirectory};

/// How long a resolution stays valid
pub const CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Maximum number of cached resolutions
pub const CACHE_CAPACITY: usize = 1024;

/// Bounded cache with per-entry expiry
struct TtlCache {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<String, (Instant, ResolvedUser)>,
}

impl TtlCache {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<ResolvedUser> {
        self.entries
            .get(key)
            .filter(|(inserted, _)| inserted.elapsed() < self.ttl)
            .map(|(_, user)| user.clone())
    }

    fn insert(&mut self, key: String, user: ResolvedUser) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let ttl = self.ttl;
            self.entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);

            if self.entries.len() >= self.capacity {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|(_, (inserted, _))| *inserted)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    self.entries.remove(&oldest);
                }
            }
        }

        self.entries.insert(key, (Instant::now(), user));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Resolves commit authors to Slack users with caching
pub struct IdentityResolver {
    directory: Arc<dyn UserDirectory>,
    identities: Arc<dyn IdentityRepository>,
    namespace: String,
    cache: RwLock<TtlCache>,
}

impl IdentityResolver {
    /// Creates a resolver with the default TTL and capacity
    ///
    /// # Arguments
    /// * `directory` - The messaging platform's user directory
    /// * `identities` - Cluster-side user records
    /// * `namespace` - Namespace holding the user records
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        identities: Arc<dyn IdentityRepository>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::with_cache(directory, identities, namespace, CACHE_TTL, CACHE_CAPACITY)
    }

    pub fn with_cache(
        directory: Arc<dyn UserDirectory>,
        identities: Arc<dyn IdentityRepository>,
        namespace: impl Into<String>,
        ttl: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            directory,
            identities,
            namespace: namespace.into(),
            cache: RwLock::new(TtlCache::new(ttl, capacity)),
        }
    }

    /// Number of cached resolutions, expired ones included
    #[cfg(test)]
    pub async fn cached(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Resolves a commit author
    ///
    /// Both inputs may be empty. The result is cached unless one of the
    /// lookups failed, so a transient directory outage is retried on the
    /// next notification instead of being remembered as a miss.
    pub async fn resolve(&self, author_name: &str, author_email: &str) -> ResolvedUser {
        let name = author_name.trim();
        let email = author_email.trim().to_lowercase();
        let key = cache_key(name, &email);

        if let Some(user) = self.cache.read().await.get(&key) {
            return user;
        }

        let (user, lookup_failed) = self.lookup(name, &email).await;

        if !lookup_failed {
            self.cache.write().await.insert(key, user.clone());
        }

        user
    }

    async fn lookup(&self, name: &str, email: &str) -> (ResolvedUser, bool) {
        let mut lookup_failed = false;

        if !email.is_empty() {
            match self.directory.find_by_email(email).await {
                Ok(Some(user)) => {
                    debug!("Resolved {} to Slack user {} by email", email, user.id);
                    let display_name = user.display_name();
                    return (
                        ResolvedUser::resolved(user.id, display_name, ResolutionMethod::ExactEmail),
                        false,
                    );
                }
                Ok(None) => debug!("No Slack user with email {}", email),
                Err(e) => {
                    warn!("Slack user lookup for {} failed: {}", email, e);
                    lookup_failed = true;
                }
            }
        }

        if !name.is_empty() || !email.is_empty() {
            match self.identities.list_users(&self.namespace).await {
                Ok(users) => {
                    let linked = users
                        .iter()
                        .filter(|u| u.matches_git_identity(name, email))
                        .find_map(|u| u.slack_id().map(|id| (u, id.to_string())));

                    if let Some((user, slack_id)) = linked {
                        debug!(
                            "Resolved {} to Slack user {} via user {}",
                            name, slack_id, user.metadata.name
                        );
                        let display_name = if user.spec.name.is_empty() {
                            name.to_string()
                        } else {
                            user.spec.name.clone()
                        };
                        return (
                            ResolvedUser::resolved(slack_id, display_name, ResolutionMethod::Username),
                            lookup_failed,
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        "Listing users in namespace {} failed: {}",
                        self.namespace, e
                    );
                    lookup_failed = true;
                }
            }
        }

        (ResolvedUser::unresolved(fallback_name(name, email)), lookup_failed)
    }
}

fn cache_key(name: &str, email: &str) -> String {
    if email.is_empty() {
        format!("name:{}", name.to_lowercase())
    } else {
        email.to_string()
    }
}

/// Name shown when no user matched
fn fallback_name(name: &str, email: &str) -> String {
    if !name.is_empty() {
        return name.to_string();
    }
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => local.to_string(),
        _ => "unknown".to_string(),
    }
}
