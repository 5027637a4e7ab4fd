//! Message repository

use async_trait::async_trait;
use herald_client::{Result, SlackClient};
use herald_core::dto::message::{Payload, PostedMessage};

/// Repository trait for creating and editing messages
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Posts a new message
    async fn post_message(&self, channel: &str, payload: &Payload) -> Result<PostedMessage>;

    /// Replaces the content of an existing message
    async fn update_message(
        &self,
        channel: &str,
        message_id: &str,
        payload: &Payload,
    ) -> Result<PostedMessage>;
}

#[async_trait]
impl MessageRepository for SlackClient {
    async fn post_message(&self, channel: &str, payload: &Payload) -> Result<PostedMessage> {
        SlackClient::post_message(self, channel, payload).await
    }

    async fn update_message(
        &self,
        channel: &str,
        message_id: &str,
        payload: &Payload,
    ) -> Result<PostedMessage> {
        SlackClient::update_message(self, channel, message_id, payload).await
    }
}
