use crate::types::{Header, Message, MessagePart};
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::engine::Engine;

/// A Gmail message with its headers and bodies decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Email {
    pub id: String,
    pub thread_id: Option<String>,
    pub from: String,
    pub to: String,
    pub cc: Option<String>,
    pub subject: String,
    pub date: String,
    pub message_id: Option<String>,
    pub references: Option<String>,
    pub snippet: String,
    pub labels: Vec<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
}

impl Email {
    pub fn from_message(message: &Message) -> Self {
        let default_part = MessagePart::default();
        let payload = message.payload.as_ref().unwrap_or(&default_part);
        let headers = payload.headers.as_deref().unwrap_or(&[]);
        let header = |name: &str| header_value(headers, name);

        Self {
            id: message.id.clone().unwrap_or_default(),
            thread_id: message.thread_id.clone(),
            from: header("From").unwrap_or_default(),
            to: header("To").unwrap_or_default(),
            cc: header("Cc"),
            subject: header("Subject").unwrap_or_default(),
            date: header("Date").unwrap_or_default(),
            message_id: header("Message-ID"),
            references: header("References"),
            snippet: message.snippet.clone().unwrap_or_default(),
            labels: message.label_ids.clone().unwrap_or_default(),
            text_body: extract_plain_text_body(payload),
            html_body: extract_html_body(payload),
        }
    }

    /// Best body for display: HTML first, plain text as fallback.
    pub fn display_body(&self) -> String {
        match (&self.html_body, &self.text_body) {
            (Some(html), _) => html_to_text(html),
            (None, Some(text)) => text.clone(),
            (None, None) => String::new(),
        }
    }

    /// Best body for quoting in a reply or forward: plain text first.
    pub fn quotable_body(&self) -> String {
        match (&self.text_body, &self.html_body) {
            (Some(text), _) if !text.trim().is_empty() => text.trim_end().to_string(),
            (_, Some(html)) => html_to_text(html).trim_end().to_string(),
            (Some(text), None) => text.trim_end().to_string(),
            (None, None) => self.snippet.clone(),
        }
    }
}

/// Case-insensitive header lookup, first match wins.
pub fn header_value(headers: &[Header], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| {
            h.name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.value.clone())
}

pub fn html_to_text(html: &str) -> String {
    nanohtml2text::html2text(html).trim().to_string()
}

// Gmail emits URL-safe base64, usually padded but not always
fn decode_part_data(data: &str) -> Option<String> {
    let decoded = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')))
        .ok()?;
    String::from_utf8(decoded).ok()
}

fn is_attachment(part: &MessagePart) -> bool {
    part.filename.as_deref().is_some_and(|f| !f.is_empty())
}

fn extract_body_of_type(payload: &MessagePart, wanted: &str) -> Option<String> {
    if is_attachment(payload) {
        return None;
    }

    if let Some(mime_type) = &payload.mime_type {
        if mime_type.eq_ignore_ascii_case(wanted) {
            if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_ref()) {
                if let Some(text) = decode_part_data(data) {
                    return Some(text);
                }
            }
        }
    }

    // Recursively search parts
    if let Some(parts) = &payload.parts {
        for part in parts {
            if let Some(text) = extract_body_of_type(part, wanted) {
                if !text.trim().is_empty() {
                    return Some(text);
                }
            }
        }
    }

    None
}

// Extract plain text content specifically
pub fn extract_plain_text_body(payload: &MessagePart) -> Option<String> {
    extract_body_of_type(payload, "text/plain")
}

// Extract HTML content specifically
pub fn extract_html_body(payload: &MessagePart) -> Option<String> {
    extract_body_of_type(payload, "text/html")
}
