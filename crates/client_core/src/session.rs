use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use storage::LocalStore;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    error::{ClientError, ClientResult},
    gateway::LearningApi,
};

pub const TOKEN_KEY: &str = "token";
pub const USER_EMAIL_KEY: &str = "userEmail";

#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    token: String,
    user_email: String,
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("token", &"<redacted>")
            .field("user_email", &self.user_email)
            .finish()
    }
}

/// Authenticated identity held by the client.
///
/// Token and email live in one optional pair so a half-populated session
/// cannot be constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    credentials: Option<SessionCredentials>,
}

impl Session {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn authenticated(token: impl Into<String>, user_email: impl Into<String>) -> Self {
        Self {
            credentials: Some(SessionCredentials {
                token: token.into(),
                user_email: user_email.into(),
            }),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.token.as_str())
    }

    pub fn user_email(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.user_email.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn require_token(&self) -> ClientResult<&str> {
        self.token().ok_or(ClientError::AuthRequired)
    }
}

/// Durable client-local storage for the session pair.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn load(&self) -> Result<(Option<String>, Option<String>)>;
    async fn save(&self, token: &str, user_email: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
impl SessionPersistence for LocalStore {
    async fn load(&self) -> Result<(Option<String>, Option<String>)> {
        let token = self.get(TOKEN_KEY).await?;
        let user_email = self.get(USER_EMAIL_KEY).await?;
        Ok((token, user_email))
    }

    async fn save(&self, token: &str, user_email: &str) -> Result<()> {
        self.set_many(&[(TOKEN_KEY, token), (USER_EMAIL_KEY, user_email)])
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.remove_many(&[TOKEN_KEY, USER_EMAIL_KEY]).await?;
        Ok(())
    }
}

/// Process-lifetime persistence, used by `--ephemeral` runs and tests.
#[derive(Default)]
pub struct InMemorySessionPersistence {
    entries: Mutex<HashMap<&'static str, String>>,
}

impl InMemorySessionPersistence {
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}

#[async_trait]
impl SessionPersistence for InMemorySessionPersistence {
    async fn load(&self) -> Result<(Option<String>, Option<String>)> {
        let entries = self.entries.lock().await;
        Ok((
            entries.get(TOKEN_KEY).cloned(),
            entries.get(USER_EMAIL_KEY).cloned(),
        ))
    }

    async fn save(&self, token: &str, user_email: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(TOKEN_KEY, token.to_string());
        entries.insert(USER_EMAIL_KEY, user_email.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

pub struct SessionStore {
    api: Arc<dyn LearningApi>,
    persistence: Arc<dyn SessionPersistence>,
    session: Mutex<Session>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn LearningApi>, persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            api,
            persistence,
            session: Mutex::new(Session::empty()),
        }
    }

    pub async fn current(&self) -> Session {
        self.session.lock().await.clone()
    }

    /// Loads the persisted session. Storage problems and blank or half-written
    /// entries degrade to an empty session instead of failing startup.
    pub async fn restore(&self) -> Session {
        let restored = match self.persistence.load().await {
            Ok((Some(token), Some(user_email)))
                if !token.is_empty() && !user_email.is_empty() =>
            {
                info!(user_email = %user_email, "restored persisted session");
                Session::authenticated(token, user_email)
            }
            Ok((None, None)) => Session::empty(),
            Ok(_) => {
                warn!("ignoring incomplete persisted session");
                Session::empty()
            }
            Err(err) => {
                warn!(error = %err, "failed to read persisted session");
                Session::empty()
            }
        };

        *self.session.lock().await = restored.clone();
        restored
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Session> {
        let response = self.api.login(email, password).await?;
        if response.access_token.is_empty() {
            return Err(ClientError::Decode(
                "login response carried an empty access token".to_string(),
            ));
        }

        self.persistence
            .save(&response.access_token, email)
            .await
            .map_err(|e| ClientError::Storage(format!("{e:#}")))?;

        let session = Session::authenticated(response.access_token, email);
        *self.session.lock().await = session.clone();
        info!(user_email = %email, "logged in");
        Ok(session)
    }

    pub async fn register(&self, email: &str, password: &str) -> ClientResult<Value> {
        let response = self.api.register(email, password).await?;
        info!(user_email = %email, "registered account");
        Ok(response)
    }

    /// Idempotent. The in-memory session is cleared even when removing the
    /// persisted keys fails.
    pub async fn logout(&self) -> ClientResult<()> {
        let previous = std::mem::take(&mut *self.session.lock().await);
        self.persistence
            .clear()
            .await
            .map_err(|e| ClientError::Storage(format!("{e:#}")))?;
        if let Some(user_email) = previous.user_email() {
            info!(user_email = %user_email, "logged out");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
