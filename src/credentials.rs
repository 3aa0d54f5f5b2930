//! Credential lookup for the notification channel.
//!
//! The client only ever reads the current token. Refreshing and clearing it
//! belong to whatever HTTP layer owns the session, which holds the same
//! [`TokenStore`] and calls [`TokenStore::set_token`] / [`TokenStore::clear`].

use parking_lot::RwLock;

/// Source of the bearer token used to authenticate the channel.
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` if the user is not logged in.
    fn token(&self) -> Option<String>;
}

/// Mutable token slot shared between the session layer and the client.
#[derive(Default)]
pub struct TokenStore {
    token: RwLock<Option<String>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Replace the token after a refresh. Empty tokens count as logged out.
    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        *self.token.write() = if token.is_empty() { None } else { Some(token) };
    }

    /// Forget the token (logout).
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl CredentialProvider for TokenStore {
    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

/// Reads the token from an environment variable on every lookup.
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredentials {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|t| !t.is_empty())
    }
}
