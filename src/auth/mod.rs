//! Session tokens and where they live.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub mod file;
pub mod refresh;
pub mod session;

/// Access and refresh token as issued by login and refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived bearer token sent with every authorized request.
    #[serde(rename = "token")]
    pub access_token: String,
    /// Used once to obtain the next pair.
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Storage for the current session's tokens.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> Option<String>;
    async fn get_refresh_token(&self) -> Option<String>;
    async fn set_tokens(&self, tokens: TokenPair);
    /// Forget the session. Clearing an empty session is a no-op.
    async fn clear(&self);
}

/// Holds the token provider of the active session.
///
/// Cloning shares the binding, so a provider registered through one handle is
/// seen by every client holding another.
#[derive(Clone, Default)]
pub struct TokenProviderRegistry {
    binding: Arc<RwLock<Option<Arc<dyn TokenProvider>>>>,
}

impl TokenProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `provider`, replacing any earlier one.
    pub fn register(&self, provider: Arc<dyn TokenProvider>) {
        self.binding.write().replace(provider);
    }

    pub fn current(&self) -> Option<Arc<dyn TokenProvider>> {
        self.binding.read().clone()
    }
}

impl std::fmt::Debug for TokenProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProviderRegistry")
            .field("registered", &self.binding.read().is_some())
            .finish()
    }
}
