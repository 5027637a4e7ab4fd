//! PipelineActivity endpoints

use herald_core::dto::kube::{ObjectList, PipelineActivityResource};
use tracing::debug;

use super::{ClusterClient, WatchStream, decode_watch_lines};
use crate::error::Result;

/// Server-side timeout of a single watch request
const WATCH_TIMEOUT_SECONDS: u64 = 300;

impl ClusterClient {
    /// List the pipeline activities in a namespace
    ///
    /// # Returns
    /// The collection, whose `metadata.resourceVersion` is the point a
    /// subsequent watch resumes from
    pub async fn list_pipeline_activities(
        &self,
        namespace: &str,
    ) -> Result<ObjectList<PipelineActivityResource>> {
        let url = self.resource_url(namespace, "pipelineactivities");
        let response = self.authorized_get(&url).await?.send().await?;

        self.handle_response(response).await
    }

    /// Watch pipeline activity changes in a namespace
    ///
    /// # Arguments
    /// * `namespace` - Namespace to watch
    /// * `resource_version` - Version to resume from, usually taken from a list
    ///
    /// # Returns
    /// A stream that ends when the server closes the watch
    pub async fn watch_pipeline_activities(
        &self,
        namespace: &str,
        resource_version: Option<&str>,
    ) -> Result<WatchStream<PipelineActivityResource>> {
        let url = self.resource_url(namespace, "pipelineactivities");

        let mut query = vec![
            ("watch", "true".to_string()),
            ("allowWatchBookmarks", "true".to_string()),
            ("timeoutSeconds", WATCH_TIMEOUT_SECONDS.to_string()),
        ];
        if let Some(version) = resource_version {
            query.push(("resourceVersion", version.to_string()));
        }

        debug!(
            "Opening pipeline activity watch in {} from {:?}",
            namespace, resource_version
        );

        let response = self
            .authorized_get(&url)
            .await?
            .query(&query)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        Ok(decode_watch_lines(response.bytes_stream()))
    }
}
