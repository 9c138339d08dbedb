use tracing::{info, instrument};

use super::{error_for_response, GmailClient};
use crate::error::Result;
use crate::types::{SendRequest, SendResponse};

impl GmailClient {
    // Send a raw RFC 2822 message, optionally into an existing thread
    #[instrument(skip(self, request), fields(thread_id = ?request.thread_id, raw_len = request.raw.len()))]
    pub(super) async fn post_send(&self, request: SendRequest) -> Result<String> {
        let response = self
            .client
            .post(self.url(&["messages", "send"])?)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response, "Failed to send email").await);
        }

        let sent: SendResponse = response.json().await?;
        info!(message_id = %sent.id, "message sent");
        Ok(sent.id)
    }
}
