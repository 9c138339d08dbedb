//! RFC 5322 / MIME message assembly on top of `mail-builder`.
//!
//! [`MimeBuilder`] accumulates addresses, threading ids, a text body
//! (optionally with an HTML alternative) and attachments, then emits one
//! immutable [`MimeMessage`]. Header folding, encoded-words and transfer
//! encodings are left to `mail_builder`. Nothing here touches the network.

use base64::engine::general_purpose::URL_SAFE;
use base64::engine::Engine;
use mail_builder::headers::address::Address;
use mail_builder::headers::message_id::MessageId;
use mail_builder::MessageBuilder;
use std::borrow::Cow;
use std::path::Path;

use crate::error::{Error, Result};

/// A file to attach, already read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = infer_content_type(&filename, &data);
        Self {
            filename,
            content_type,
            data,
        }
    }

    /// Read an attachment from disk. A missing or unreadable file is a
    /// validation failure, reported before anything is sent.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            Error::Validation(format!("Attachment file '{}': {}", path.display(), e))
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Self::new(filename, data))
    }
}

/// Content type from the file extension, falling back to sniffing the bytes.
pub fn infer_content_type(filename: &str, data: &[u8]) -> String {
    if let Some(mime) = mime_guess::from_path(filename).first() {
        return mime.essence_str().to_string();
    }
    match std::str::from_utf8(data) {
        Ok(text) if !text.contains('\0') => "text/plain".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// Strip CR and LF so a value cannot inject extra headers.
pub fn sanitize_header(value: &str) -> String {
    value.replace(['\r', '\n'], "").trim().to_string()
}

/// Split `Name <addr>` into its display name and address. A bare address
/// has no name.
pub fn split_address(value: &str) -> (Option<String>, String) {
    let value = value.trim();
    if let (Some(open), true) = (value.rfind('<'), value.ends_with('>')) {
        let email = value[open + 1..value.len() - 1].trim().to_string();
        let name = value[..open].trim().trim_matches('"').trim();
        let name = (!name.is_empty()).then(|| name.to_string());
        return (name, email);
    }
    (None, value.to_string())
}

fn address_list(values: &[String]) -> Address<'_> {
    Address::new_list(
        values
            .iter()
            .map(|value| {
                let (name, email) = split_address(value);
                Address::new_address(name, email)
            })
            .collect(),
    )
}

// mail-builder adds the angle brackets itself
fn bare_message_id(id: &str) -> &str {
    id.trim().trim_start_matches('<').trim_end_matches('>')
}

/// An encoded message ready for transport.
#[derive(Debug, Clone, PartialEq)]
pub struct MimeMessage {
    raw: Vec<u8>,
    top_level_parts: usize,
}

impl MimeMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The message as text. Non-UTF-8 bytes are replaced, so use
    /// [`MimeMessage::as_bytes`] for anything that is sent.
    pub fn to_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }

    /// Number of top-level entities: 1 for a bare text entity (plain or
    /// alternative), K+1 when K attachments are present.
    pub fn top_level_parts(&self) -> usize {
        self.top_level_parts
    }

    /// URL-safe base64 of the whole message, as the Gmail `raw` field expects.
    pub fn to_gmail_raw(&self) -> String {
        URL_SAFE.encode(&self.raw)
    }
}

#[derive(Debug, Default)]
pub struct MimeBuilder {
    date: Option<i64>,
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: String,
    in_reply_to: Option<String>,
    references: Vec<String>,
    text: String,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

fn clean_list(values: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| sanitize_header(v.as_ref()))
        .filter(|v| !v.is_empty())
        .collect()
}

impl MimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the Unix epoch.
    pub fn date(mut self, timestamp: i64) -> Self {
        self.date = Some(timestamp);
        self
    }

    pub fn from_address(mut self, address: &str) -> Self {
        let address = sanitize_header(address);
        self.from = (!address.is_empty()).then_some(address);
        self
    }

    pub fn to(mut self, addresses: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.to = clean_list(addresses);
        self
    }

    pub fn cc(mut self, addresses: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.cc = clean_list(addresses);
        self
    }

    pub fn bcc(mut self, addresses: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.bcc = clean_list(addresses);
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = sanitize_header(subject);
        self
    }

    pub fn in_reply_to(mut self, id: &str) -> Self {
        let id = sanitize_header(id);
        self.in_reply_to = (!id.is_empty()).then_some(id);
        self
    }

    /// Whitespace-separated `References` chain.
    pub fn references(mut self, chain: &str) -> Self {
        self.references = clean_list(sanitize_header(chain).split_whitespace());
        self
    }

    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn attachments(mut self, attachments: impl IntoIterator<Item = Attachment>) -> Self {
        self.attachments
            .extend(attachments.into_iter().map(|attachment| Attachment {
                filename: sanitize_header(&attachment.filename),
                content_type: sanitize_header(&attachment.content_type),
                data: attachment.data,
            }));
        self
    }

    pub fn build(self) -> Result<MimeMessage> {
        let mut message = MessageBuilder::new();
        if let Some(timestamp) = self.date {
            message = message.date(timestamp);
        }
        if let Some(from) = &self.from {
            let (name, email) = split_address(from);
            message = message.from(Address::new_address(name, email));
        }
        if !self.to.is_empty() {
            message = message.to(address_list(&self.to));
        }
        if !self.cc.is_empty() {
            message = message.cc(address_list(&self.cc));
        }
        if !self.bcc.is_empty() {
            message = message.bcc(address_list(&self.bcc));
        }
        if !self.subject.is_empty() {
            message = message.subject(self.subject.as_str());
        }
        if let Some(id) = &self.in_reply_to {
            message = message.in_reply_to(bare_message_id(id));
        }
        if !self.references.is_empty() {
            let ids: Vec<&str> = self.references.iter().map(|id| bare_message_id(id)).collect();
            message = message.references(MessageId::from(ids));
        }

        message = message.text_body(self.text.as_str());
        if let Some(html) = &self.html {
            message = message.html_body(html.as_str());
        }
        for attachment in &self.attachments {
            message = message.attachment(
                attachment.content_type.as_str(),
                attachment.filename.as_str(),
                attachment.data.as_slice(),
            );
        }

        let raw = message
            .write_to_vec()
            .map_err(|e| Error::Validation(format!("Could not encode message: {}", e)))?;

        Ok(MimeMessage {
            raw,
            top_level_parts: self.attachments.len() + 1,
        })
    }
}
