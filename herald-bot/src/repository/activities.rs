//! Pipeline activity repository
//!
//! Lists and watches activity records, converting the cluster's wire
//! resources into domain snapshots.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use herald_client::{ClientError, ClusterClient, Result};
use herald_core::domain::activity::PipelineActivity;
use herald_core::domain::event::ChangeKind;
use herald_core::dto::kube::{PipelineActivityResource, WatchEvent};

/// Point-in-time state of every activity in a namespace
#[derive(Debug, Clone, Default)]
pub struct ActivityListing {
    pub activities: Vec<PipelineActivity>,
    /// Version a watch resumes from
    pub resource_version: Option<String>,
}

/// One item of an activity subscription
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Applied {
        kind: ChangeKind,
        activity: PipelineActivity,
        resource_version: Option<String>,
    },
    /// Progress marker without an object change
    Bookmark { resource_version: Option<String> },
    /// The resume point is gone; the caller must list again
    Expired,
}

pub type ActivityEventStream = BoxStream<'static, Result<StoreEvent>>;

/// Repository trait for observing pipeline activities
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Lists all activities of a namespace
    async fn list(&self, namespace: &str) -> Result<ActivityListing>;

    /// Subscribes to changes after `resource_version`
    ///
    /// The stream ends when the server closes the subscription.
    async fn watch(
        &self,
        namespace: &str,
        resource_version: Option<&str>,
    ) -> Result<ActivityEventStream>;
}

#[async_trait]
impl ActivityRepository for ClusterClient {
    async fn list(&self, namespace: &str) -> Result<ActivityListing> {
        let list = self.list_pipeline_activities(namespace).await?;

        Ok(ActivityListing {
            activities: list
                .items
                .into_iter()
                .map(|r| r.into_activity(namespace))
                .collect(),
            resource_version: list.metadata.resource_version,
        })
    }

    async fn watch(
        &self,
        namespace: &str,
        resource_version: Option<&str>,
    ) -> Result<ActivityEventStream> {
        let stream = self
            .watch_pipeline_activities(namespace, resource_version)
            .await?;
        let namespace = namespace.to_string();

        Ok(stream
            .map(move |item| {
                let applied = |kind: ChangeKind, resource: PipelineActivityResource| {
                    let resource_version = resource.resource_version().map(str::to_string);
                    StoreEvent::Applied {
                        kind,
                        activity: resource.into_activity(&namespace),
                        resource_version,
                    }
                };

                match item? {
                    WatchEvent::Added(r) => Ok(applied(ChangeKind::Added, r)),
                    WatchEvent::Modified(r) => Ok(applied(ChangeKind::Modified, r)),
                    WatchEvent::Deleted(r) => Ok(applied(ChangeKind::Deleted, r)),
                    WatchEvent::Bookmark(b) => Ok(StoreEvent::Bookmark {
                        resource_version: b.metadata.resource_version,
                    }),
                    WatchEvent::Error(status) if status.is_gone() => Ok(StoreEvent::Expired),
                    WatchEvent::Error(status) => Err(ClientError::api_error(
                        status.code.unwrap_or(500),
                        status
                            .message
                            .unwrap_or_else(|| "watch error".to_string()),
                    )),
                }
            })
            .boxed())
    }
}
