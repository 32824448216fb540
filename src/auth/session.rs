use parking_lot::Mutex;
use tracing::debug;

use super::{TokenPair, TokenProvider};

/// Keeps the session in process memory only.
#[derive(Debug, Default)]
pub struct MemorySession {
    tokens: Mutex<Option<TokenPair>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }

    pub fn snapshot(&self) -> Option<TokenPair> {
        self.tokens.lock().clone()
    }
}

#[async_trait::async_trait]
impl TokenProvider for MemorySession {
    async fn get_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .as_ref()
            .map(|tokens| tokens.access_token.clone())
    }

    async fn get_refresh_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .as_ref()
            .map(|tokens| tokens.refresh_token.clone())
    }

    async fn set_tokens(&self, tokens: TokenPair) {
        self.tokens.lock().replace(tokens);
        debug!(message = "Stored session tokens in memory");
    }

    async fn clear(&self) {
        let had_session = self.tokens.lock().take().is_some();
        debug!(message = "Cleared in-memory session", had_session);
    }
}
