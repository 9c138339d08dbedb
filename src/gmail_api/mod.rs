//! Gmail API module split into logical submodules
//!
//! This module provides all Gmail API functionality organized into:
//! - auth: OAuth2 credential loading, consent and token persistence
//! - messages: listing and fetching messages
//! - operations: sending raw messages

pub mod auth;
pub mod messages;
pub mod operations;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{ListQuery, Message, MessageFormat, MessageRef, SendRequest};

pub use auth::{clear_token, try_authenticate, AuthConfig};

pub const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

/// The Gmail calls astropost makes. Implemented by [`GmailClient`] over HTTP
/// and mocked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GmailApi: Send + Sync {
    /// Most recent message references, newest first.
    async fn list_messages(&self, query: &ListQuery) -> Result<Vec<MessageRef>>;

    /// One message. An id Gmail does not know yields `Error::NotFound`.
    async fn get_message(&self, id: &str, format: MessageFormat) -> Result<Message>;

    /// Send an already-encoded message, returning the new message id.
    async fn send_message(&self, request: SendRequest) -> Result<String>;
}

/// HTTP client for the Gmail REST API, authenticated with a bearer token.
#[derive(Clone)]
pub struct GmailClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl GmailClient {
    pub fn new(client: reqwest::Client, token: String) -> Self {
        Self::with_base_url(client, token, GMAIL_BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, token: String, base_url: &str) -> Self {
        Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `<base>/users/me/<segments...>`, each segment percent-encoded so an
    /// id can never change the request path.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let invalid = || Error::Validation(format!("Invalid Gmail base URL '{}'", self.base_url));
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["users", "me"])
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl GmailApi for GmailClient {
    async fn list_messages(&self, query: &ListQuery) -> Result<Vec<MessageRef>> {
        self.fetch_message_refs(query).await
    }

    async fn get_message(&self, id: &str, format: MessageFormat) -> Result<Message> {
        self.fetch_message(id, format).await
    }

    async fn send_message(&self, request: SendRequest) -> Result<String> {
        self.post_send(request).await
    }
}

// Turn a non-success response into the matching error, body included verbatim
async fn error_for_response(response: reqwest::Response, context: &str) -> Error {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    match status {
        reqwest::StatusCode::UNAUTHORIZED => Error::Authentication(format!(
            "{}: access token rejected ({}). Remove the token file to re-authorize.",
            context, error_text
        )),
        reqwest::StatusCode::FORBIDDEN => Error::Authentication(format!(
            "{}: insufficient permissions ({}). Remove the token file to re-authorize with the required scopes.",
            context, error_text
        )),
        _ => Error::transport(Some(status.as_u16()), format!("{}: {}", context, error_text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> GmailClient {
        GmailClient::with_base_url(reqwest::Client::new(), "t".to_string(), base_url)
    }

    #[test]
    fn test_url_appends_segments_to_base_path() {
        let url = client(GMAIL_BASE_URL).url(&["messages", "send"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://gmail.googleapis.com/gmail/v1/users/me/messages/send"
        );

        let url = client("http://127.0.0.1:8080/").url(&["messages"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/users/me/messages");
    }

    #[test]
    fn test_url_escapes_ids() {
        let url = client(GMAIL_BASE_URL)
            .url(&["messages", "../labels?x=1#y"])
            .unwrap();
        assert_eq!(
            url.path(),
            "/gmail/v1/users/me/messages/..%2Flabels%3Fx=1%23y"
        );
        assert!(url.query().is_none());
    }

    #[test]
    fn test_invalid_base_url_is_validation_error() {
        let err = client("not a url").url(&["messages"]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
