//! Outgoing message composition: validation, reply/forward threading and
//! quoting, then MIME assembly via [`MimeBuilder`].
//!
//! [`prepare`] is pure and works on an already-fetched original. [`send`]
//! adds the two network steps around it: fetch the original (reply/forward
//! only), then hand the encoded message to the transport.

use pulldown_cmark::{html, Event, Options, Parser};
use tracing::{debug, info};

use crate::email_content::{html_to_text, Email};
use crate::error::{Error, Result};
use crate::gmail_api::messages::fetch_email;
use crate::gmail_api::GmailApi;
use crate::mime::{Attachment, MimeBuilder, MimeMessage};
use crate::types::SendRequest;

const REPLY_PREFIX: &str = "Re:";
const FORWARD_PREFIX: &str = "Fwd:";
const FORWARD_SEPARATOR: &str = "---------- Forwarded message ---------";

/// How a draft relates to an existing message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ComposeMode {
    #[default]
    New,
    Reply(String),
    Forward(String),
}

impl ComposeMode {
    pub fn original_id(&self) -> Option<&str> {
        match self {
            ComposeMode::New => None,
            ComposeMode::Reply(id) | ComposeMode::Forward(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: Option<String>,
    pub body: String,
    /// Send only the `text/plain` part, without the rendered HTML alternative.
    pub plain_only: bool,
    pub attachments: Vec<Attachment>,
    pub mode: ComposeMode,
}

/// The result of composing a draft, before it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub thread_id: Option<String>,
    pub message: MimeMessage,
}

impl Outgoing {
    pub fn send_request(&self) -> SendRequest {
        SendRequest {
            raw: self.message.to_gmail_raw(),
            thread_id: self.thread_id.clone(),
        }
    }
}

/// Checks that need no network access.
pub fn validate(draft: &Draft) -> Result<()> {
    if draft.to.is_empty() {
        return Err(Error::Validation("At least one recipient is required".into()));
    }
    if let Some(blank) = draft.to.iter().position(|r| r.trim().is_empty()) {
        return Err(Error::Validation(format!("Recipient #{} is empty", blank + 1)));
    }
    let has_subject = draft.subject.as_deref().is_some_and(|s| !s.trim().is_empty());
    if draft.mode == ComposeMode::New && !has_subject {
        return Err(Error::Validation(
            "A subject is required unless replying or forwarding".into(),
        ));
    }
    if let Some(id) = draft.mode.original_id() {
        if id.trim().is_empty() {
            return Err(Error::Validation("Original message id must not be empty".into()));
        }
    }
    Ok(())
}

fn has_prefix(subject: &str, prefix: &str) -> bool {
    let subject = subject.trim_start();
    subject
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// `Re: <subject>`, unless the subject already carries a reply prefix.
pub fn reply_subject(original: &str) -> String {
    if has_prefix(original, REPLY_PREFIX) {
        original.trim().to_string()
    } else {
        format!("{} {}", REPLY_PREFIX, original.trim())
    }
}

/// `Fwd: <subject>`, unless the subject already carries `Fwd:` or `Fw:`.
pub fn forward_subject(original: &str) -> String {
    if has_prefix(original, FORWARD_PREFIX) || has_prefix(original, "Fw:") {
        original.trim().to_string()
    } else {
        format!("{} {}", FORWARD_PREFIX, original.trim())
    }
}

fn reply_quote(original: &Email) -> String {
    let quoted: Vec<String> = original
        .quotable_body()
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {}", line)
            }
        })
        .collect();
    format!(
        "On {}, {} wrote:\n{}",
        original.date,
        original.from,
        quoted.join("\n")
    )
}

fn forward_quote(original: &Email) -> String {
    let mut block = format!(
        "{}\nFrom: {}\nDate: {}\nSubject: {}\nTo: {}\n",
        FORWARD_SEPARATOR, original.from, original.date, original.subject, original.to
    );
    if let Some(cc) = &original.cc {
        block.push_str(&format!("Cc: {}\n", cc));
    }
    block.push('\n');
    block.push_str(&original.quotable_body());
    block
}

/// `References` for a reply: the original's chain followed by its id.
fn references_for(original: &Email) -> Option<String> {
    let message_id = original.message_id.as_deref()?.trim();
    if message_id.is_empty() {
        return None;
    }
    let chain = original.references.as_deref().unwrap_or("").trim();
    if chain.is_empty() {
        Some(message_id.to_string())
    } else {
        Some(format!("{} {}", chain, message_id))
    }
}

pub fn is_html_document(body: &str) -> bool {
    let head = body.trim_start().to_ascii_lowercase();
    head.starts_with("<html") || head.starts_with("<!doctype html")
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// Contents of the first ```-fenced block, if one is closed
fn fenced_block(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find("```") {
        let open = search_from + offset + 3;
        let after = &text[open..];
        let info_len = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if let Some(content) = after[info_len..].strip_prefix('\n') {
            return content.find("```").map(|close| &content[..close]);
        }
        search_from = open;
    }
    None
}

/// Trim the body. When it contains a closed ``` fence, only the fenced
/// contents are kept.
pub fn sanitize_body(text: &str) -> String {
    fenced_block(text).unwrap_or(text).trim().to_string()
}

/// Markdown to HTML. Single line breaks are kept as `<br />`, the way they
/// read in the plain-text part.
pub fn render_markdown(text: &str) -> String {
    let options =
        Options::ENABLE_TABLES | Options::ENABLE_FOOTNOTES | Options::ENABLE_STRIKETHROUGH;
    let events = Parser::new_ext(text, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

fn text_to_html(text: &str) -> String {
    escape_html(text).replace("\r\n", "\n").replace('\n', "<br>\n")
}

fn render_html(body: &str, quoted: Option<&str>) -> String {
    let quoted_html = quoted.map(|q| {
        format!(
            "<blockquote style=\"margin: 20px 0 0 0; padding-left: 10px; border-left: 2px solid #ccc; color: #555;\">{}</blockquote>",
            text_to_html(q)
        )
    });

    if is_html_document(body) {
        // Caller supplied a full document, only the quote is appended
        return match quoted_html {
            Some(q) => format!("{}<br><br>{}", body, q),
            None => body.to_string(),
        };
    }

    format!(
        "<html>\n  <body style=\"font-family: Arial, sans-serif; line-height: 1.6; color: #333;\">\n    <div style=\"max-width: 600px; margin: 0 auto;\">\n{}    {}\n    </div>\n  </body>\n</html>\n",
        render_markdown(body),
        quoted_html.unwrap_or_default()
    )
}

/// Compose a draft into a ready-to-send message. `original` must be the
/// fetched message for reply/forward modes and is ignored otherwise.
pub fn prepare(draft: &Draft, original: Option<&Email>) -> Result<Outgoing> {
    validate(draft)?;

    let explicit_subject = draft
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let (subject, quoted, in_reply_to, references, thread_id) = match (&draft.mode, original) {
        (ComposeMode::New, _) => (
            explicit_subject.unwrap_or_default().to_string(),
            None,
            None,
            None,
            None,
        ),
        (ComposeMode::Reply(_), Some(original)) => (
            explicit_subject
                .map(str::to_string)
                .unwrap_or_else(|| reply_subject(&original.subject)),
            Some(reply_quote(original)),
            original.message_id.clone().filter(|id| !id.trim().is_empty()),
            references_for(original),
            original.thread_id.clone(),
        ),
        (ComposeMode::Forward(_), Some(original)) => (
            explicit_subject
                .map(str::to_string)
                .unwrap_or_else(|| forward_subject(&original.subject)),
            Some(forward_quote(original)),
            None,
            None,
            None,
        ),
        (mode, None) => {
            return Err(Error::NotFound(
                mode.original_id().unwrap_or_default().to_string(),
            ))
        }
    };

    let body = sanitize_body(&draft.body);
    let plain_body = if is_html_document(&body) {
        html_to_text(&body)
    } else {
        body.clone()
    };
    let text_body = match &quoted {
        Some(q) if plain_body.is_empty() => q.clone(),
        Some(q) => format!("{}\n\n{}", plain_body.trim_end(), q),
        None => plain_body,
    };
    let html_body = (!draft.plain_only).then(|| render_html(&body, quoted.as_deref()));

    let mut builder = MimeBuilder::new()
        .date(chrono::Utc::now().timestamp())
        .to(&draft.to)
        .cc(&draft.cc)
        .bcc(&draft.bcc)
        .subject(&subject);
    if let Some(from) = &draft.from {
        builder = builder.from_address(from);
    }
    if let Some(id) = &in_reply_to {
        builder = builder.in_reply_to(id);
    }
    if let Some(refs) = &references {
        builder = builder.references(refs);
    }
    builder = builder.text_body(text_body.clone());
    if let Some(html) = &html_body {
        builder = builder.html_body(html.clone());
    }
    let message = builder
        .attachments(draft.attachments.iter().cloned())
        .build()?;

    Ok(Outgoing {
        subject,
        text_body,
        html_body,
        in_reply_to,
        references,
        thread_id,
        message,
    })
}

/// Validate, fetch the original when replying or forwarding, compose and send.
/// Returns the id Gmail assigned to the sent message.
pub async fn send<A: GmailApi + ?Sized>(api: &A, draft: &Draft) -> Result<String> {
    validate(draft)?;

    let original = match draft.mode.original_id() {
        Some(id) => {
            debug!(original_id = id, "fetching original message");
            Some(fetch_email(api, id).await?)
        }
        None => None,
    };

    let outgoing = prepare(draft, original.as_ref())?;
    info!(
        subject = %outgoing.subject,
        recipients = draft.to.len(),
        attachments = draft.attachments.len(),
        threaded = outgoing.thread_id.is_some(),
        "sending message"
    );
    api.send_message(outgoing.send_request()).await
}
