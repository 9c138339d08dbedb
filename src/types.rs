use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub messages: Option<Vec<MessageRef>>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Message {
    pub id: Option<String>,
    pub snippet: Option<String>,
    pub payload: Option<MessagePart>,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    #[serde(rename = "labelIds")]
    pub label_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MessagePart {
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub headers: Option<Vec<Header>>,
    pub body: Option<MessagePartBody>,
    pub parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Header {
    pub name: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessagePartBody {
    pub data: Option<String>,
}

/// Body of `users.messages.send`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SendRequest {
    pub raw: String,
    #[serde(rename = "threadId", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendResponse {
    pub id: String,
}

/// Which representation `users.messages.get` should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    Full,
    Metadata,
}

impl MessageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFormat::Full => "full",
            MessageFormat::Metadata => "metadata",
        }
    }
}

/// Parameters for listing recent messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub max_results: u32,
    pub label: Option<String>,
    pub query: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            max_results: 5,
            label: Some("INBOX".to_string()),
            query: None,
        }
    }
}
