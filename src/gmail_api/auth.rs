use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use yup_oauth2::{ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod};

use crate::error::{Error, Result};

/// Read mail for `list`/`get` and for quoting originals, send for `send`.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
];

pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";
pub const TOKEN_FILE_NAME: &str = "token.json";

/// Where the OAuth client secret is read from and the token cache is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfig {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
}

impl AuthConfig {
    pub fn new(credentials_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
        }
    }

    /// `<config dir>/astropost`, or the working directory when the platform
    /// has no config dir.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("astropost"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        let dir = Self::default_dir();
        Self::new(dir.join(CREDENTIALS_FILE_NAME), dir.join(TOKEN_FILE_NAME))
    }
}

// Define a trait for OAuth flow operations to allow mocking
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthFlow: Send + Sync {
    /// Produce an access token, refreshing or prompting for consent as needed
    /// and persisting the result at `token_path`.
    async fn perform_flow(
        &self,
        secret: ApplicationSecret,
        scopes: Vec<String>,
        token_path: PathBuf,
    ) -> Result<String>;
}

// Installed-app flow with a local redirect server, token cached on disk
pub struct RealOAuthFlow;

#[async_trait]
impl OAuthFlow for RealOAuthFlow {
    async fn perform_flow(
        &self,
        secret: ApplicationSecret,
        scopes: Vec<String>,
        token_path: PathBuf,
    ) -> Result<String> {
        let auth =
            InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
                .persist_tokens_to_disk(token_path)
                .build()
                .await
                .map_err(|e| Error::Authentication(format!("Failed to build authenticator: {}", e)))?;
        let scopes_refs: Vec<&str> = scopes.iter().map(|s| s.as_str()).collect();
        let token = auth
            .token(&scopes_refs)
            .await
            .map_err(|e| Error::Authentication(e.to_string()))?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| Error::Authentication("Authorization server returned no access token".into()))
    }
}

async fn load_client_secret(credentials_path: &Path) -> Result<ApplicationSecret> {
    yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| {
            Error::Authentication(format!(
                "Failed to read client secret from {}: {}. Download an OAuth client (Desktop app) JSON from the Google Cloud console and place it there.",
                credentials_path.display(),
                e
            ))
        })
}

/// Remove the cached token. Returns whether a token file existed.
pub fn clear_token(token_path: &Path) -> Result<bool> {
    match std::fs::remove_file(token_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Authentication(format!(
            "Failed to remove token file {}: {}",
            token_path.display(),
            e
        ))),
    }
}

// Main authentication function
pub async fn try_authenticate(config: &AuthConfig) -> Result<String> {
    try_authenticate_internal(config, &RealOAuthFlow).await
}

async fn try_authenticate_internal<O: OAuthFlow>(config: &AuthConfig, oauth_flow_impl: &O) -> Result<String> {
    let secret = load_client_secret(&config.credentials_path).await?;

    if let Some(parent) = config.token_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Authentication(format!(
                    "Failed to create token directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let scopes: Vec<String> = SCOPES.iter().map(|s| s.to_string()).collect();
    debug!(token_path = %config.token_path.display(), "acquiring access token");

    match oauth_flow_impl
        .perform_flow(secret.clone(), scopes.clone(), config.token_path.clone())
        .await
    {
        Ok(token) => Ok(token),
        Err(e) => {
            // A stale or revoked refresh token: drop it and ask for consent once more
            if !clear_token(&config.token_path)? {
                return Err(e);
            }
            warn!(error = %e, "stored token rejected, re-authorizing");
            oauth_flow_impl
                .perform_flow(secret, scopes, config.token_path.clone())
                .await
                .map_err(|e| Error::Authentication(format!("Authentication still failed after retry: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CLIENT_SECRET_JSON: &str = r#"{
        "installed": {
            "client_id": "client-id.apps.googleusercontent.com",
            "project_id": "astropost-test",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "shh",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    fn config_in(dir: &TempDir, with_credentials: bool) -> AuthConfig {
        let config = AuthConfig::new(
            dir.path().join(CREDENTIALS_FILE_NAME),
            dir.path().join("nested").join(TOKEN_FILE_NAME),
        );
        if with_credentials {
            std::fs::write(&config.credentials_path, CLIENT_SECRET_JSON).unwrap();
        }
        config
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_running_flow() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, false);
        let mut flow = MockOAuthFlow::new();
        flow.expect_perform_flow().times(0);

        let err = try_authenticate_internal(&config, &flow).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_successful_flow_returns_token() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, true);
        let expected_path = config.token_path.clone();
        let mut flow = MockOAuthFlow::new();
        flow.expect_perform_flow()
            .withf(move |secret, scopes, path| {
                secret.client_id == "client-id.apps.googleusercontent.com"
                    && scopes.len() == SCOPES.len()
                    && *path == expected_path
            })
            .times(1)
            .returning(|_, _, _| Ok("access-token".to_string()));

        let token = try_authenticate_internal(&config, &flow).await.unwrap();
        assert_eq!(token, "access-token");
        assert!(config.token_path.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_rejected_stored_token_is_cleared_and_retried_once() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, true);
        std::fs::create_dir_all(config.token_path.parent().unwrap()).unwrap();
        std::fs::write(&config.token_path, "[]").unwrap();

        let mut calls = 0;
        let mut flow = MockOAuthFlow::new();
        flow.expect_perform_flow().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Err(Error::Authentication("invalid_grant".to_string()))
            } else {
                Ok("fresh-token".to_string())
            }
        });

        let token = try_authenticate_internal(&config, &flow).await.unwrap();
        assert_eq!(token, "fresh-token");
        assert!(!config.token_path.exists());
    }

    #[tokio::test]
    async fn test_denied_consent_without_stored_token_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, true);
        let mut flow = MockOAuthFlow::new();
        flow.expect_perform_flow()
            .times(1)
            .returning(|_, _, _| Err(Error::Authentication("access_denied".to_string())));

        let err = try_authenticate_internal(&config, &flow).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(msg) if msg == "access_denied"));
    }

    #[test]
    fn test_clear_token_reports_whether_file_existed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TOKEN_FILE_NAME);
        assert!(!clear_token(&path).unwrap());
        std::fs::write(&path, "[]").unwrap();
        assert!(clear_token(&path).unwrap());
        assert!(!path.exists());
    }
}
