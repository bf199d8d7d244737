//! Credential lookup for remote logins

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

/// Environment variable consulted when no password is passed on the command line
pub const PASSWORD_ENV: &str = "EOM_PASSWORD";

/// Error types for credential lookup
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("No password available for {0} (use --password or set EOM_PASSWORD)")]
    Missing(String),

    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
}

/// A user/password pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"********")
            .finish()
    }
}

/// Source of login credentials
pub trait CredentialStore: Send + Sync {
    fn get_credentials(&self, user: &str) -> Result<Credentials, CredentialError>;
}

/// Password from an explicit value or the `EOM_PASSWORD` variable
#[derive(Default)]
pub struct EnvCredentialStore {
    password: Option<String>,
}

impl EnvCredentialStore {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

impl CredentialStore for EnvCredentialStore {
    fn get_credentials(&self, user: &str) -> Result<Credentials, CredentialError> {
        let password = match &self.password {
            Some(password) => password.clone(),
            None => std::env::var(PASSWORD_ENV)
                .map_err(|_| CredentialError::Missing(user.to_string()))?,
        };
        Ok(Credentials::new(user, password))
    }
}

/// Memoizes the first successful lookup per user
pub struct CachedCredentialStore<S> {
    inner: S,
    cache: Mutex<HashMap<String, Credentials>>,
}

impl<S: CredentialStore> CachedCredentialStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl<S: CredentialStore> CredentialStore for CachedCredentialStore<S> {
    fn get_credentials(&self, user: &str) -> Result<Credentials, CredentialError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|e| CredentialError::Unavailable(e.to_string()))?;

        if let Some(credentials) = cache.get(user) {
            return Ok(credentials.clone());
        }

        let credentials = self.inner.get_credentials(user)?;
        cache.insert(user.to_string(), credentials.clone());
        Ok(credentials)
    }
}
