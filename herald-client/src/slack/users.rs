//! User directory endpoints

use herald_core::dto::slack::{LookupUserResponse, SlackUser};

use super::SlackClient;
use crate::error::{ClientError, Result};

impl SlackClient {
    /// Find a workspace member by email address
    ///
    /// # Returns
    /// `None` when no member has that email
    pub async fn lookup_user_by_email(&self, email: &str) -> Result<Option<SlackUser>> {
        let url = self.method_url("users.lookupByEmail");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("email", email)])
            .send()
            .await?;

        found_user(self.handle_response::<LookupUserResponse>(response).await)
    }
}

/// An unknown email is an answer, not an error
fn found_user(reply: Result<LookupUserResponse>) -> Result<Option<SlackUser>> {
    match reply {
        Ok(reply) => Ok(reply.user),
        Err(ClientError::Slack { error }) if error == "users_not_found" => Ok(None),
        Err(e) => Err(e),
    }
}
