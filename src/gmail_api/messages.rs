use tracing::{debug, instrument, warn};

use super::{error_for_response, GmailApi, GmailClient};
use crate::email_content::Email;
use crate::error::{Error, Result};
use crate::types::{ListQuery, Message, MessageFormat, MessageRef, MessagesResponse};

/// Gmail caps `maxResults` at 500.
pub const MAX_PAGE_SIZE: u32 = 500;

impl GmailClient {
    #[instrument(skip(self), level = "debug")]
    pub(super) async fn fetch_message_refs(&self, query: &ListQuery) -> Result<Vec<MessageRef>> {
        let limit = query.max_results.clamp(1, MAX_PAGE_SIZE);
        let mut params = vec![("maxResults", limit.to_string())];
        // A search query replaces the default label restriction
        if let Some(q) = &query.query {
            params.push(("q", q.clone()));
        } else if let Some(label) = &query.label {
            params.push(("labelIds", label.clone()));
        }

        let response = self
            .client
            .get(self.url(&["messages"])?)
            .query(&params)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response, "Failed to list messages").await);
        }

        let messages_data: MessagesResponse = response.json().await?;
        let mut refs = messages_data.messages.unwrap_or_default();
        refs.truncate(limit as usize);
        debug!(count = refs.len(), "listed message references");
        Ok(refs)
    }

    #[instrument(skip(self), level = "debug")]
    pub(super) async fn fetch_message(&self, id: &str, format: MessageFormat) -> Result<Message> {
        if id.trim().is_empty() {
            return Err(Error::Validation("Message id must not be empty".to_string()));
        }

        let response = self
            .client
            .get(self.url(&["messages", id])?)
            .query(&[("format", format.as_str())])
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        // Gmail answers 400 "Invalid id value" for ids it cannot parse
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            return Err(Error::NotFound(id.to_string()));
        }
        if !status.is_success() {
            return Err(error_for_response(response, "Failed to fetch message").await);
        }

        Ok(response.json().await?)
    }
}

/// Summaries of the most recent messages, one metadata fetch per reference.
/// A reference that no longer resolves (deleted since the listing) is
/// skipped; any other failure aborts the listing.
pub async fn list_recent<A: GmailApi + ?Sized>(api: &A, query: &ListQuery) -> Result<Vec<Email>> {
    let refs = api.list_messages(query).await?;
    let mut emails = Vec::with_capacity(refs.len());
    for msg_ref in refs.iter().take(query.max_results as usize) {
        let message = match api.get_message(&msg_ref.id, MessageFormat::Metadata).await {
            Ok(message) => message,
            Err(Error::NotFound(id)) => {
                warn!(id = %id, "listed message no longer exists, skipping");
                continue;
            }
            Err(e) => return Err(e),
        };
        let mut email = Email::from_message(&message);
        if email.id.is_empty() {
            email.id = msg_ref.id.clone();
        }
        emails.push(email);
    }
    Ok(emails)
}

/// One message with headers and decoded bodies.
pub async fn fetch_email<A: GmailApi + ?Sized>(api: &A, id: &str) -> Result<Email> {
    let message = api.get_message(id, MessageFormat::Full).await?;
    let mut email = Email::from_message(&message);
    if email.id.is_empty() {
        email.id = id.to_string();
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail_api::MockGmailApi;
    use crate::types::{Header, MessagePart};

    fn metadata_message(id: &str, subject: &str) -> Message {
        Message {
            id: Some(id.to_string()),
            thread_id: Some(format!("thread-{}", id)),
            payload: Some(MessagePart {
                headers: Some(vec![Header {
                    name: Some("Subject".to_string()),
                    value: Some(subject.to_string()),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_recent_fetches_metadata_for_each_reference() {
        let mut api = MockGmailApi::new();
        api.expect_list_messages()
            .withf(|q| q.max_results == 2)
            .times(1)
            .returning(|_| {
                Ok(vec![
                    MessageRef {
                        id: "a".to_string(),
                        thread_id: None,
                    },
                    MessageRef {
                        id: "b".to_string(),
                        thread_id: None,
                    },
                ])
            });
        api.expect_get_message()
            .withf(|_, format| *format == MessageFormat::Metadata)
            .times(2)
            .returning(|id, _| Ok(metadata_message(id, &format!("subject {}", id))));

        let query = ListQuery {
            max_results: 2,
            ..Default::default()
        };
        let emails = list_recent(&api, &query).await.unwrap();

        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].id, "a");
        assert_eq!(emails[1].subject, "subject b");
    }

    #[tokio::test]
    async fn test_list_recent_never_exceeds_requested_count() {
        let mut api = MockGmailApi::new();
        api.expect_list_messages().returning(|_| {
            Ok((0..5)
                .map(|i| MessageRef {
                    id: format!("m{}", i),
                    thread_id: None,
                })
                .collect())
        });
        api.expect_get_message()
            .times(3)
            .returning(|id, _| Ok(metadata_message(id, "s")));

        let query = ListQuery {
            max_results: 3,
            ..Default::default()
        };
        assert_eq!(list_recent(&api, &query).await.unwrap().len(), 3);
    }

    fn refs(ids: &[&str]) -> Vec<MessageRef> {
        ids.iter()
            .map(|id| MessageRef {
                id: id.to_string(),
                thread_id: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_list_recent_skips_messages_deleted_since_listing() {
        let mut api = MockGmailApi::new();
        api.expect_list_messages()
            .returning(|_| Ok(refs(&["a", "gone", "c"])));
        api.expect_get_message().times(3).returning(|id, _| {
            if id == "gone" {
                Err(Error::NotFound(id.to_string()))
            } else {
                Ok(metadata_message(id, id))
            }
        });

        let emails = list_recent(&api, &ListQuery::default()).await.unwrap();

        let ids: Vec<_> = emails.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_list_recent_aborts_on_transport_error() {
        let mut api = MockGmailApi::new();
        api.expect_list_messages()
            .returning(|_| Ok(refs(&["a", "b", "c"])));
        api.expect_get_message().times(2).returning(|id, _| {
            if id == "b" {
                Err(Error::transport(Some(503), "backend unavailable"))
            } else {
                Ok(metadata_message(id, id))
            }
        });

        let err = list_recent(&api, &ListQuery::default()).await.unwrap_err();
        assert!(matches!(err, Error::Transport { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn test_fetch_email_propagates_not_found() {
        let mut api = MockGmailApi::new();
        api.expect_get_message()
            .withf(|id, format| id == "missing" && *format == MessageFormat::Full)
            .returning(|id, _| Err(Error::NotFound(id.to_string())));

        let err = fetch_email(&api, "missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(id) if id == "missing"));
    }
}
