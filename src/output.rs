//! Plain-text terminal rendering for `list` and `get`.

use crate::email_content::Email;

const DATE_WIDTH: usize = 25;
const FROM_WIDTH: usize = 40;
const SUBJECT_WIDTH: usize = 60;

// Truncate on a char boundary, marking the cut with an ellipsis
fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut out: String = value.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

pub fn format_email_table(emails: &[Email]) -> String {
    if emails.is_empty() {
        return "No emails found.\n".to_string();
    }

    let id_width = emails
        .iter()
        .map(|e| e.id.len())
        .max()
        .unwrap_or(0)
        .max("ID".len());

    let mut out = format!("Latest {} emails\n", emails.len());
    out.push_str(&format!(
        "{:<id_width$}  {:<DATE_WIDTH$}  {:<FROM_WIDTH$}  {}\n",
        "ID", "Date", "From", "Subject"
    ));
    for email in emails {
        out.push_str(&format!(
            "{:<id_width$}  {:<DATE_WIDTH$}  {:<FROM_WIDTH$}  {}\n",
            email.id,
            truncate(&email.date, DATE_WIDTH),
            truncate(or_placeholder(&email.from, "(unknown sender)"), FROM_WIDTH),
            truncate(or_placeholder(&email.subject, "(no subject)"), SUBJECT_WIDTH),
        ));
    }
    out
}

pub fn format_email(email: &Email, raw_html: bool) -> String {
    let mut out = format!("Email ID: {}\n", email.id);
    out.push_str(&format!("From: {}\n", or_placeholder(&email.from, "(unknown sender)")));
    out.push_str(&format!("To: {}\n", or_placeholder(&email.to, "(unknown recipient)")));
    if let Some(cc) = &email.cc {
        out.push_str(&format!("Cc: {}\n", cc));
    }
    out.push_str(&format!("Date: {}\n", or_placeholder(&email.date, "(unknown date)")));
    out.push_str(&format!("Subject: {}\n", or_placeholder(&email.subject, "(no subject)")));
    if !email.labels.is_empty() {
        out.push_str(&format!("Labels: {}\n", email.labels.join(", ")));
    }
    out.push('\n');

    let body = match (&email.html_body, raw_html) {
        (Some(html), true) => html.clone(),
        _ => email.display_body(),
    };
    out.push_str(body.trim_end());
    out.push('\n');
    out
}
