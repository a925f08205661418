//! Credential lifecycle: OAuth2 password login, host-platform SSO exchange,
//! and the token persisted in the preference store.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{Error, Result};
use crate::storage::PreferenceStore;

/// How users sign in for a given deployment. The two paths never coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    Password,
    HostSso,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    Bearer,
    Basic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub scheme: AuthScheme,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && self.expires_at.map_or(true, |expiry| expiry > now)
    }

    pub fn header_value(&self) -> String {
        match self.scheme {
            AuthScheme::Bearer => format!("Bearer {}", self.token),
            AuthScheme::Basic => format!("Basic {}", self.token),
        }
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, self.header_value())
    }
}

/// Session handed over by the host fleet-management platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSession {
    pub database: String,
    pub user_name: String,
    pub session_id: String,
    pub server: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub mode: AuthMode,
    pub authenticated: bool,
    pub scheme: Option<AuthScheme>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub token_url: String,
    pub sso_exchange_url: String,
    pub client_id: String,
    pub timeout: StdDuration,
}

pub struct SessionManager {
    http: Client,
    config: AuthConfig,
    store: Arc<PreferenceStore>,
}

impl SessionManager {
    pub fn new(config: AuthConfig, store: Arc<PreferenceStore>) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            store,
        })
    }

    pub fn mode(&self) -> AuthMode {
        self.config.mode
    }

    /// Exchanges a username and password for an OAuth2 bearer token.
    pub async fn login_with_password(&self, username: &str, password: &str) -> Result<Credential> {
        if self.config.mode != AuthMode::Password {
            return Err(Error::Auth(
                "password login is disabled for host SSO deployments".to_string(),
            ));
        }

        info!("Requesting token for user {}", username);
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
                ("client_id", self.config.client_id.as_str()),
            ])
            .send()
            .await?;

        self.store_token_response(response).await
    }

    /// Exchanges a host-platform session for a bearer token.
    pub async fn login_with_host_session(&self, session: &HostSession) -> Result<Credential> {
        if self.config.mode != AuthMode::HostSso {
            return Err(Error::Auth(
                "host SSO is disabled for password deployments".to_string(),
            ));
        }

        info!(
            "Exchanging host session for {}@{}",
            session.user_name, session.database
        );
        let response = self
            .http
            .post(&self.config.sso_exchange_url)
            .json(session)
            .send()
            .await?;

        self.store_token_response(response).await
    }

    /// Stores HTTP basic credentials. They carry no expiry.
    pub async fn use_basic_credentials(&self, username: &str, password: &str) -> Result<Credential> {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        let credential = Credential {
            scheme: AuthScheme::Basic,
            token,
            expires_at: None,
        };
        self.store.save_credential(&credential).await?;
        Ok(credential)
    }

    pub async fn logout(&self) -> Result<()> {
        info!("Clearing stored credential");
        self.store.clear_credential().await
    }

    pub async fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.store.credential(now).await.is_some()
    }

    pub async fn status(&self, now: DateTime<Utc>) -> SessionStatus {
        let credential = self.store.credential(now).await;
        SessionStatus {
            mode: self.config.mode,
            authenticated: credential.is_some(),
            scheme: credential.as_ref().map(|c| c.scheme),
            expires_at: credential.and_then(|c| c.expires_at),
        }
    }

    async fn store_token_response(&self, response: Response) -> Result<Credential> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Token request rejected with {}: {}", status, body);
            return Err(Error::Auth(format!("token request rejected ({})", status)));
        }

        let token: TokenResponse = response.json().await?;
        if let Some(kind) = token.token_type.as_deref() {
            if !kind.eq_ignore_ascii_case("bearer") {
                warn!("Unexpected token type {}, treating as bearer", kind);
            }
        }

        let credential = Credential {
            scheme: AuthScheme::Bearer,
            token: token.access_token,
            expires_at: token
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        };
        self.store.save_credential(&credential).await?;
        info!("Session established, expires at {:?}", credential.expires_at);
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential {
            scheme: AuthScheme::Bearer,
            token: "abc".to_string(),
            expires_at,
        }
    }

    fn manager(mode: AuthMode) -> SessionManager {
        SessionManager::new(
            AuthConfig {
                mode,
                token_url: "http://127.0.0.1:9/oauth/token".to_string(),
                sso_exchange_url: "http://127.0.0.1:9/sso/exchange".to_string(),
                client_id: "test".to_string(),
                timeout: StdDuration::from_secs(1),
            },
            Arc::new(PreferenceStore::in_memory()),
        )
        .unwrap()
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(credential(None).is_valid(now));
        assert!(credential(Some(now + Duration::minutes(1))).is_valid(now));
        assert!(!credential(Some(now)).is_valid(now));
        assert!(!credential(Some(now - Duration::minutes(1))).is_valid(now));
    }

    #[test]
    fn test_header_value() {
        assert_eq!(credential(None).header_value(), "Bearer abc");
    }

    #[tokio::test]
    async fn test_basic_credentials_encoded() {
        let session = manager(AuthMode::Password);
        let credential = session.use_basic_credentials("ops", "s3cret").await.unwrap();

        assert_eq!(credential.header_value(), "Basic b3BzOnMzY3JldA==");
        assert!(session.is_authenticated(Utc::now()).await);

        session.logout().await.unwrap();
        assert!(!session.is_authenticated(Utc::now()).await);
    }

    #[tokio::test]
    async fn test_auth_paths_are_exclusive() {
        let password_only = manager(AuthMode::Password);
        let host = HostSession {
            database: "fleet".to_string(),
            user_name: "ops".to_string(),
            session_id: "s".to_string(),
            server: "host.example".to_string(),
        };
        assert!(matches!(
            password_only.login_with_host_session(&host).await,
            Err(Error::Auth(_))
        ));

        let sso_only = manager(AuthMode::HostSso);
        assert!(matches!(
            sso_only.login_with_password("ops", "pw").await,
            Err(Error::Auth(_))
        ));
    }
}
