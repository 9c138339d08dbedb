use tracing::debug;

use crate::cli::{Cli, Command};
use crate::compose::{self, Draft};
use crate::error::Result;
use crate::gmail_api::messages::{fetch_email, list_recent};
use crate::gmail_api::{try_authenticate, GmailApi, GmailClient};
use crate::output::{format_email, format_email_table};
use crate::types::ListQuery;

/// A command with its local inputs resolved and validated.
#[derive(Debug, PartialEq)]
pub enum Action {
    List(ListQuery),
    Get { id: String, raw_html: bool },
    Send(Draft),
}

/// Read files and validate arguments. Runs before authentication, so bad
/// input never reaches the network.
pub fn prepare_action(command: Command) -> Result<Action> {
    match command {
        Command::List {
            count,
            label,
            query,
        } => Ok(Action::List(ListQuery {
            max_results: count,
            label: Some(label),
            query,
        })),
        Command::Get { id, html } => Ok(Action::Get { id, raw_html: html }),
        Command::Send(args) => {
            let draft = args.into_draft()?;
            compose::validate(&draft)?;
            Ok(Action::Send(draft))
        }
    }
}

// Authenticate and build the HTTP client
pub async fn initialize_client(cli: &Cli) -> Result<GmailClient> {
    let config = cli.auth_config();
    debug!(credentials = %config.credentials_path.display(), "authenticating");
    let token = try_authenticate(&config).await?;
    Ok(GmailClient::new(reqwest::Client::new(), token))
}

/// Run one action and return what should be printed on stdout.
pub async fn run_action<A: GmailApi + ?Sized>(api: &A, action: Action) -> Result<String> {
    match action {
        Action::List(query) => {
            let emails = list_recent(api, &query).await?;
            Ok(format_email_table(&emails))
        }
        Action::Get { id, raw_html } => {
            let email = fetch_email(api, &id).await?;
            Ok(format_email(&email, raw_html))
        }
        Action::Send(draft) => {
            let id = compose::send(api, &draft).await?;
            Ok(format!("Message Id: {}\n", id))
        }
    }
}
