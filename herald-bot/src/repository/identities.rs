//! Identity repositories
//!
//! Two directories feed the identity resolver: the messaging platform's own
//! user directory (matched by email) and the cluster's `User` resources that
//! link git identities to messaging handles.

use async_trait::async_trait;
use herald_client::{ClusterClient, Result, SlackClient};
use herald_core::dto::kube::UserResource;
use herald_core::dto::slack::SlackUser;

/// Messaging-platform user directory
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a member by email; `None` when nobody has it
    async fn find_by_email(&self, email: &str) -> Result<Option<SlackUser>>;
}

/// Cluster-side identity records
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Lists the user resources of a namespace
    async fn list_users(&self, namespace: &str) -> Result<Vec<UserResource>>;
}

#[async_trait]
impl UserDirectory for SlackClient {
    async fn find_by_email(&self, email: &str) -> Result<Option<SlackUser>> {
        self.lookup_user_by_email(email).await
    }
}

#[async_trait]
impl IdentityRepository for ClusterClient {
    async fn list_users(&self, namespace: &str) -> Result<Vec<UserResource>> {
        match ClusterClient::list_users(self, namespace).await {
            Ok(users) => Ok(users),
            // The User resource is optional in a cluster
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
