use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::jwt::{JwtError, JwtService};
use super::models::Session;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Token(#[from] JwtError),
    #[error("session id in token is not a UUID")]
    MalformedSessionId,
    #[error("session is unknown or has been ended")]
    Unknown,
    #[error("session has expired")]
    Expired,
}

/// Active sessions keyed by id. The browser holds a signed token that names
/// the session, so ending a session here invalidates the cookie even before
/// the token itself expires.
#[derive(Clone)]
pub struct SessionService {
    jwt: JwtService,
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(jwt: JwtService, ttl: Duration) -> Self {
        Self {
            jwt,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Starts a session for `username` and returns the cookie token.
    pub async fn start(&self, username: &str) -> Result<String, SessionError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            username: username.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        let token = self.jwt.generate_token(&session)?;

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !s.is_expired());
        log::info!(
            "Session {} started for {} ({} active)",
            session.id,
            username,
            sessions.len() + 1
        );
        sessions.insert(session.id, session);
        Ok(token)
    }

    pub async fn resolve(&self, token: &str) -> Result<Session, SessionError> {
        let claims = self.jwt.verify_token(token)?;
        let id = Uuid::parse_str(&claims.sid).map_err(|_| SessionError::MalformedSessionId)?;

        let sessions = self.sessions.read().await;
        let session = sessions.get(&id).ok_or(SessionError::Unknown)?;
        if session.is_expired() {
            return Err(SessionError::Expired);
        }
        if session.username != claims.sub {
            return Err(SessionError::Unknown);
        }
        Ok(session.clone())
    }

    /// Ends the session named by `token`. Returns the username it belonged
    /// to, or `None` when the token does not name a live session.
    pub async fn end(&self, token: &str) -> Option<String> {
        let claims = self.jwt.verify_token(token).ok()?;
        let id = Uuid::parse_str(&claims.sid).ok()?;
        let removed = self.sessions.write().await.remove(&id)?;
        log::info!("Session {} ended for {}", removed.id, removed.username);
        Some(removed.username)
    }

    #[cfg(test)]
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
