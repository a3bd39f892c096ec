use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{PoisonError, RwLock};

use super::models::User;
use super::password::{PasswordError, hash_password, verify_password};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("username and password are required")]
    MissingCredentials,
    #[error("username {0:?} already exists")]
    DuplicateUser(String),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    Hashing(#[from] PasswordError),
}

/// Account storage used by the signup and login handlers.
pub trait UserStore: Send + Sync {
    fn create_user(&self, username: &str, password: &str) -> Result<(), AuthError>;

    fn verify_credentials(&self, username: &str, password: &str) -> Result<(), AuthError>;

    fn contains(&self, username: &str) -> bool;
}

/// Process-lifetime store; accounts are lost on restart.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl UserStore for InMemoryUserStore {
    fn create_user(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if self.contains(username) {
            return Err(AuthError::DuplicateUser(username.to_string()));
        }

        let password_hash = hash_password(password)?;

        // Re-checked under the write lock: another signup may have won the race
        // while we were hashing.
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        match users.entry(username.to_string()) {
            Entry::Occupied(_) => Err(AuthError::DuplicateUser(username.to_string())),
            Entry::Vacant(slot) => {
                let user = slot.insert(User::new(username.to_string(), password_hash));
                log::debug!("User {} created at {}", user.username, user.created_at);
                Ok(())
            }
        }
    }

    fn verify_credentials(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let password_hash = {
            let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
            match users.get(username) {
                Some(user) => user.password_hash.clone(),
                None => return Err(AuthError::InvalidCredentials),
            }
        };

        match verify_password(password, &password_hash) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::InvalidCredentials),
            Err(e) => {
                log::error!("Stored hash for {} is unreadable: {}", username, e);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    fn contains(&self, username: &str) -> bool {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(username)
    }
}
