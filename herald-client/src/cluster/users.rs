//! User endpoints

use herald_core::dto::kube::{ObjectList, UserResource};

use super::ClusterClient;
use crate::error::Result;

impl ClusterClient {
    /// List the `User` resources of a namespace
    pub async fn list_users(&self, namespace: &str) -> Result<Vec<UserResource>> {
        let url = self.resource_url(namespace, "users");
        let response = self.authorized_get(&url).await?.send().await?;

        let list: ObjectList<UserResource> = self.handle_response(response).await?;
        Ok(list.items)
    }
}
