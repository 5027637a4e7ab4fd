//! Message endpoints (`chat.postMessage`, `chat.update`)

use herald_core::dto::message::{Payload, PostedMessage};
use herald_core::dto::slack::{PostMessageRequest, SlackResponse, UpdateMessageRequest};

use super::SlackClient;
use crate::error::{ClientError, Result};

impl SlackClient {
    /// Post a new message to a channel
    ///
    /// # Arguments
    /// * `channel` - Channel name or id
    /// * `payload` - The rendered notification
    ///
    /// # Returns
    /// The channel id and message timestamp the platform assigned
    pub async fn post_message(&self, channel: &str, payload: &Payload) -> Result<PostedMessage> {
        let url = self.method_url("chat.postMessage");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&PostMessageRequest {
                channel,
                text: &payload.text,
                attachments: &payload.attachments,
                unfurl_links: false,
            })
            .send()
            .await?;

        let reply: SlackResponse = self.handle_response(response).await?;
        posted(reply, channel)
    }

    /// Edit an existing message in place
    ///
    /// # Arguments
    /// * `channel` - Channel id the message was posted to
    /// * `message_id` - Timestamp of the message
    /// * `payload` - The new rendering
    pub async fn update_message(
        &self,
        channel: &str,
        message_id: &str,
        payload: &Payload,
    ) -> Result<PostedMessage> {
        let url = self.method_url("chat.update");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&UpdateMessageRequest {
                channel,
                ts: message_id,
                text: &payload.text,
                attachments: &payload.attachments,
            })
            .send()
            .await?;

        let reply: SlackResponse = self.handle_response(response).await?;
        posted(reply, channel)
    }
}

fn posted(reply: SlackResponse, requested_channel: &str) -> Result<PostedMessage> {
    let message_id = reply
        .ts
        .ok_or_else(|| ClientError::ParseError("Response is missing the message ts".to_string()))?;

    Ok(PostedMessage {
        channel: reply
            .channel
            .unwrap_or_else(|| requested_channel.to_string()),
        message_id,
    })
}
