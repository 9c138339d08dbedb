use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::compose::{ComposeMode, Draft};
use crate::error::{Error, Result};
use crate::gmail_api::{clear_token, AuthConfig};
use crate::mime::Attachment;

#[derive(Parser, Debug)]
#[clap(author, version, about = "List, read and send Gmail messages from the terminal", long_about = None)]
pub struct Cli {
    /// OAuth client secret (installed-app JSON). Defaults to <config dir>/astropost/credentials.json.
    #[clap(long, global = true, env = "ASTROPOST_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Token cache file. Defaults to <config dir>/astropost/token.json.
    #[clap(long, global = true, env = "ASTROPOST_TOKEN")]
    pub token: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Remove the stored token and exit.
    #[clap(long)]
    pub clear_token: bool,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// List the most recent messages
    #[clap(visible_alias = "ls")]
    List {
        /// Number of messages to list
        #[clap(default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..=500))]
        count: u32,

        /// Only list messages carrying this label
        #[clap(long, default_value = "INBOX")]
        label: String,

        /// Gmail search query (replaces the label filter)
        #[clap(long, short)]
        query: Option<String>,
    },

    /// Show one message
    #[clap(visible_alias = "show")]
    Get {
        /// Message id, as printed by `list`
        id: String,

        /// Print the HTML body as-is instead of rendering it to text
        #[clap(long)]
        html: bool,
    },

    /// Send, reply to or forward a message
    Send(SendArgs),
}

#[derive(Args, Debug, PartialEq, Default)]
pub struct SendArgs {
    /// Recipient addresses
    #[clap(long, visible_alias = "to", num_args = 1.., required = true)]
    pub recipients: Vec<String>,

    /// Subject line (optional when replying or forwarding)
    #[clap(long, short)]
    pub subject: Option<String>,

    /// Body text
    #[clap(long, short, conflicts_with = "input_file")]
    pub body: Option<String>,

    /// Read the body from a file
    #[clap(long, short = 'f', visible_alias = "file")]
    pub input_file: Option<PathBuf>,

    #[clap(long, num_args = 1..)]
    pub cc: Vec<String>,

    #[clap(long, num_args = 1..)]
    pub bcc: Vec<String>,

    /// Sender address (defaults to the authenticated account)
    #[clap(long)]
    pub from_address: Option<String>,

    /// Reply to this message id, threading the new message
    #[clap(long, visible_alias = "reply-to", conflicts_with = "forward_id")]
    pub reply_to_id: Option<String>,

    /// Forward this message id
    #[clap(long, visible_alias = "forward")]
    pub forward_id: Option<String>,

    /// Files to attach
    #[clap(long, short, num_args = 1..)]
    pub attach: Vec<PathBuf>,

    /// Send only plain text, without the HTML part rendered from Markdown
    #[clap(long)]
    pub plain_text: bool,
}

impl SendArgs {
    pub fn mode(&self) -> ComposeMode {
        match (&self.reply_to_id, &self.forward_id) {
            (Some(id), _) => ComposeMode::Reply(id.clone()),
            (None, Some(id)) => ComposeMode::Forward(id.clone()),
            (None, None) => ComposeMode::New,
        }
    }

    /// Build the draft, reading the body file and attachments from disk.
    /// Any missing file is reported here, before authentication.
    pub fn into_draft(self) -> Result<Draft> {
        let mode = self.mode();
        let body = match (&self.input_file, &self.body) {
            (Some(path), _) => std::fs::read_to_string(path).map_err(|e| {
                Error::Validation(format!("Body input file '{}': {}", path.display(), e))
            })?,
            (None, Some(body)) => body.clone(),
            (None, None) => String::new(),
        };
        let attachments = self
            .attach
            .iter()
            .map(|path| Attachment::from_path(path))
            .collect::<Result<Vec<_>>>()?;

        Ok(Draft {
            from: self.from_address,
            to: self.recipients,
            cc: self.cc,
            bcc: self.bcc,
            subject: self.subject,
            body,
            plain_only: self.plain_text,
            attachments,
            mode,
        })
    }
}

impl Cli {
    pub fn auth_config(&self) -> AuthConfig {
        let defaults = AuthConfig::default();
        AuthConfig::new(
            self.credentials.clone().unwrap_or(defaults.credentials_path),
            self.token.clone().unwrap_or(defaults.token_path),
        )
    }
}

pub fn handle_token_clear(config: &AuthConfig) -> Result<()> {
    if clear_token(&config.token_path)? {
        println!("Token removed from {}. Exiting.", config.token_path.display());
    } else {
        println!("No stored token at {}.", config.token_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("astropost").chain(args.iter().copied())).unwrap()
    }

    fn send_args(args: &[&str]) -> SendArgs {
        match parse(args).command {
            Some(Command::Send(send)) => send,
            other => panic!("expected send, got {:?}", other),
        }
    }

    #[test]
    fn test_list_defaults_to_five_inbox_messages() {
        assert_eq!(
            parse(&["list"]).command,
            Some(Command::List {
                count: 5,
                label: "INBOX".to_string(),
                query: None
            })
        );
        assert!(matches!(
            parse(&["ls", "10"]).command,
            Some(Command::List { count: 10, .. })
        ));
    }

    #[test]
    fn test_list_rejects_zero_count() {
        assert!(Cli::try_parse_from(["astropost", "list", "0"]).is_err());
    }

    #[test]
    fn test_show_is_an_alias_for_get() {
        assert_eq!(
            parse(&["show", "18c0ffee"]).command,
            Some(Command::Get {
                id: "18c0ffee".to_string(),
                html: false
            })
        );
    }

    #[test]
    fn test_send_parses_all_options() {
        let send = send_args(&[
            "send",
            "--to",
            "a@example.com",
            "b@example.com",
            "-s",
            "Subject",
            "-b",
            "Body",
            "--cc",
            "c@example.com",
            "--bcc",
            "d@example.com",
            "--from-address",
            "me@example.com",
        ]);
        assert_eq!(send.recipients, vec!["a@example.com", "b@example.com"]);
        assert_eq!(send.subject.as_deref(), Some("Subject"));
        assert_eq!(send.body.as_deref(), Some("Body"));
        assert_eq!(send.cc, vec!["c@example.com"]);
        assert_eq!(send.bcc, vec!["d@example.com"]);
        assert_eq!(send.from_address.as_deref(), Some("me@example.com"));
        assert_eq!(send.mode(), ComposeMode::New);
    }

    #[test]
    fn test_plain_text_flag_disables_html_part() {
        let send = send_args(&["send", "--to", "a@example.com", "-s", "x"]);
        assert!(!send.plain_text);
        let send = send_args(&["send", "--to", "a@example.com", "-s", "x", "--plain-text"]);
        assert!(send.into_draft().unwrap().plain_only);
    }

    #[test]
    fn test_send_requires_recipients() {
        assert!(Cli::try_parse_from(["astropost", "send", "-s", "x"]).is_err());
    }

    #[test]
    fn test_reply_and_forward_are_mutually_exclusive() {
        assert!(Cli::try_parse_from([
            "astropost",
            "send",
            "--to",
            "a@example.com",
            "--reply-to-id",
            "1",
            "--forward-id",
            "2"
        ])
        .is_err());

        let send = send_args(&["send", "--to", "a@example.com", "--reply-to", "abc"]);
        assert_eq!(send.mode(), ComposeMode::Reply("abc".to_string()));
        let send = send_args(&["send", "--to", "a@example.com", "--forward", "abc"]);
        assert_eq!(send.mode(), ComposeMode::Forward("abc".to_string()));
    }

    #[test]
    fn test_into_draft_reads_body_file_and_attachments() {
        let mut body_file = tempfile::NamedTempFile::new().unwrap();
        write!(body_file, "Body from file").unwrap();
        let mut attachment = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(attachment, "attached").unwrap();

        let args = SendArgs {
            recipients: vec!["a@example.com".to_string()],
            subject: Some("Report".to_string()),
            input_file: Some(body_file.path().to_path_buf()),
            attach: vec![attachment.path().to_path_buf()],
            ..Default::default()
        };
        let draft = args.into_draft().unwrap();

        assert_eq!(draft.body, "Body from file");
        assert_eq!(draft.attachments.len(), 1);
        assert_eq!(draft.attachments[0].content_type, "text/plain");
        assert_eq!(draft.attachments[0].data, b"attached");
    }

    #[test]
    fn test_into_draft_missing_files_are_validation_errors() {
        let args = SendArgs {
            recipients: vec!["a@example.com".to_string()],
            attach: vec![PathBuf::from("/nonexistent/astropost/report.pdf")],
            ..Default::default()
        };
        assert!(matches!(args.into_draft(), Err(Error::Validation(_))));

        let args = SendArgs {
            recipients: vec!["a@example.com".to_string()],
            input_file: Some(PathBuf::from("/nonexistent/astropost/body.txt")),
            ..Default::default()
        };
        assert!(matches!(args.into_draft(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_explicit_paths_override_defaults() {
        let cli = parse(&["--credentials", "/tmp/c.json", "--token", "/tmp/t.json", "list"]);
        let config = cli.auth_config();
        assert_eq!(config.credentials_path, PathBuf::from("/tmp/c.json"));
        assert_eq!(config.token_path, PathBuf::from("/tmp/t.json"));
    }
}
