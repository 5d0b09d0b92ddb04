//! Session context: the credential supplier boundary
//!
//! The identity flow itself lives outside this crate; the core only reads
//! the current bearer token and reacts to it changing. A [`SessionHandle`]
//! is the supplier side (install / clear), a [`Session`] is the consumer
//! side handed to the gateway, browser and sweep. The pair replaces any
//! ambient global auth state: created at session start, cleared at logout.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

/// Supplier side of a session: installs and clears the bearer token.
pub struct SessionHandle {
    tx: watch::Sender<Option<SecretString>>,
}

/// Consumer side of a session. Cheap to clone; every clone observes the
/// same token transitions.
#[derive(Clone)]
pub struct Session {
    rx: watch::Receiver<Option<SecretString>>,
}

impl Session {
    /// Create a session with no credential installed yet.
    pub fn new() -> (SessionHandle, Session) {
        let (tx, rx) = watch::channel(None);
        (SessionHandle { tx }, Session { rx })
    }

    /// Create a session with a token already installed. Convenience for the
    /// CLI and tests, where the token arrives out of band. The seeded token
    /// counts as already observed, so `changed` only fires for later
    /// installs.
    pub fn with_token(token: impl Into<String>) -> (SessionHandle, Session) {
        let (tx, rx) = watch::channel(Some(SecretString::from(token.into())));
        (SessionHandle { tx }, Session { rx })
    }

    /// The current bearer token, or `None` when no session is active.
    pub fn token(&self) -> Option<SecretString> {
        self.rx.borrow().clone()
    }

    pub fn has_token(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the next token transition. Returns `false` once the
    /// supplier side has been dropped (no further transitions can happen).
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl SessionHandle {
    /// Install a fresh bearer token, replacing any previous one.
    pub fn install_token(&self, token: impl Into<String>) {
        self.tx.send_replace(Some(SecretString::from(token.into())));
        info!("session credential installed");
    }

    /// Install the access token out of a stored token set. Refuses expired
    /// tokens (the supplier should refresh first); returns whether a token
    /// was installed.
    pub fn install(&self, tokens: &StoredTokens) -> bool {
        if tokens.is_expired() {
            warn!("refusing to install expired access token");
            self.clear();
            return false;
        }
        self.install_token(tokens.access_token.clone());
        true
    }

    /// Invalidate the session (logout). Consumers observe `None`.
    pub fn clear(&self) {
        self.tx.send_replace(None);
        info!("session credential cleared");
    }
}

/// Token set as handed over by an external identity flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp; `None` means no known expiry
    pub expires_at: Option<i64>,
    pub token_type: String,
    pub scopes: Vec<String>,
}

impl StoredTokens {
    /// Check if the access token is expired (with 5 min buffer)
    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            let now = chrono::Utc::now().timestamp();
            expires_at <= now + 300
        } else {
            false // No expiry = assume valid
        }
    }
}
