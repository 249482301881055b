//! Credentials and credential providers

use std::fmt;
use std::sync::RwLock;

/// Errors raised while constructing credentials
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("Access key id must not be empty")]
    EmptyAccessKey,

    #[error("Secret key must not be empty")]
    EmptySecretKey,

    #[error("Environment variable {0} is not set")]
    MissingVariable(&'static str),
}

/// An access key pair, optionally with a session token for temporary credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_key: String,
    session_token: Option<String>,
}

impl Credentials {
    /// Create long-term credentials. Both parts must be non-empty.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, CredentialsError> {
        let access_key_id = access_key_id.into();
        let secret_key = secret_key.into();

        if access_key_id.trim().is_empty() {
            return Err(CredentialsError::EmptyAccessKey);
        }
        if secret_key.is_empty() {
            return Err(CredentialsError::EmptySecretKey);
        }

        Ok(Self {
            access_key_id,
            secret_key,
            session_token: None,
        })
    }

    /// Attach a session token, turning these into temporary credentials.
    /// An empty token is ignored.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.session_token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of credentials, polled fresh for every signed request
pub trait CredentialsProvider: Send + Sync {
    fn credentials(&self) -> Credentials;
}

/// Provider that always returns the same credentials
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider {
    credentials: Credentials,
}

impl StaticCredentialsProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialsProvider for StaticCredentialsProvider {
    fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }
}

/// Provider reading `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
/// `AWS_SESSION_TOKEN` on every call.
///
/// The variables are validated once at construction. If they later become
/// invalid (unset, emptied) the last good credentials keep being served, so a
/// rotation in progress never turns into a per-request failure.
#[derive(Debug)]
pub struct EnvCredentialsProvider {
    last_good: RwLock<Credentials>,
}

impl EnvCredentialsProvider {
    pub fn new() -> Result<Self, CredentialsError> {
        let credentials = Self::read_env()?;
        Ok(Self {
            last_good: RwLock::new(credentials),
        })
    }

    fn read_env() -> Result<Credentials, CredentialsError> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| CredentialsError::MissingVariable("AWS_ACCESS_KEY_ID"))?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| CredentialsError::MissingVariable("AWS_SECRET_ACCESS_KEY"))?;

        let mut credentials = Credentials::new(access_key, secret_key)?;
        if let Ok(token) = std::env::var("AWS_SESSION_TOKEN") {
            credentials = credentials.with_session_token(token);
        }
        Ok(credentials)
    }
}

impl CredentialsProvider for EnvCredentialsProvider {
    fn credentials(&self) -> Credentials {
        match Self::read_env() {
            Ok(fresh) => {
                if let Ok(mut last) = self.last_good.write() {
                    if *last != fresh {
                        tracing::debug!(access_key_id = %fresh.access_key_id(), "Credentials rotated");
                        *last = fresh.clone();
                    }
                }
                fresh
            }
            Err(e) => {
                tracing::warn!(error = %e, "Environment credentials unavailable, using last known");
                match self.last_good.read() {
                    Ok(last) => last.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                }
            }
        }
    }
}
