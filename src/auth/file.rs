//! Session tokens persisted to a JSON file between runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{TokenPair, TokenProvider};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Token provider backed by a file holding `{"token": ..., "refreshToken": ...}`.
#[derive(Debug)]
pub struct FileSession {
    path: PathBuf,
    tokens: Mutex<Option<TokenPair>>,
}

/// What may be on disk; a session is only usable when both halves are present.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Stored {
    token: Option<String>,
    refresh_token: Option<String>,
}

impl FileSession {
    /// Reads the session at `path`. A missing or unreadable file is an empty session.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let tokens = match tokio::fs::read(&path).await {
            Ok(raw) => Self::parse(&path, &raw),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        debug!(message = "Loaded session file", path = %path.display(), has_session = tokens.is_some());
        Ok(Self {
            path,
            tokens: Mutex::new(tokens),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(path: &Path, raw: &[u8]) -> Option<TokenPair> {
        match serde_json::from_slice::<Stored>(raw) {
            Ok(Stored {
                token: Some(access_token),
                refresh_token: Some(refresh_token),
            }) => Some(TokenPair {
                access_token,
                refresh_token,
            }),
            Ok(_) => None,
            Err(err) => {
                warn!(message = "Ignoring unreadable session file", path = %path.display(), error = %err);
                None
            }
        }
    }

    async fn persist(&self, tokens: Option<&TokenPair>) -> Result<(), Error> {
        match tokens {
            Some(tokens) => {
                let raw = serde_json::to_vec_pretty(tokens).map_err(std::io::Error::from)?;
                tokio::fs::write(&self.path, raw).await?;
            }
            None => match tokio::fs::remove_file(&self.path).await {
                Err(err) if err.kind() != ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            },
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenProvider for FileSession {
    async fn get_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .await
            .as_ref()
            .map(|tokens| tokens.access_token.clone())
    }

    async fn get_refresh_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .await
            .as_ref()
            .map(|tokens| tokens.refresh_token.clone())
    }

    async fn set_tokens(&self, tokens: TokenPair) {
        let mut current = self.tokens.lock().await;
        if let Err(err) = self.persist(Some(&tokens)).await {
            warn!(message = "Unable to write session file", path = %self.path.display(), error = %err);
        }
        current.replace(tokens);
    }

    async fn clear(&self) {
        let mut current = self.tokens.lock().await;
        if let Err(err) = self.persist(None).await {
            warn!(message = "Unable to remove session file", path = %self.path.display(), error = %err);
        }
        current.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: access.into(),
            refresh_token: refresh.into(),
        }
    }

    #[tokio::test]
    async fn missing_file_is_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = FileSession::load(dir.path().join("session.json")).await.unwrap();
        assert_eq!(session.get_token().await, None);
    }

    #[tokio::test]
    async fn tokens_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let session = FileSession::load(&path).await.unwrap();
        session.set_tokens(pair("t1", "r1")).await;

        let reloaded = FileSession::load(&path).await.unwrap();
        assert_eq!(reloaded.get_token().await.as_deref(), Some("t1"));
        assert_eq!(reloaded.get_refresh_token().await.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn clear_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let session = FileSession::load(&path).await.unwrap();
        session.set_tokens(pair("t1", "r1")).await;
        session.clear().await;
        session.clear().await;

        assert!(!path.exists());
        assert_eq!(session.get_refresh_token().await, None);
    }

    #[tokio::test]
    async fn partial_pair_is_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, r#"{"token":"t1"}"#).await.unwrap();

        let session = FileSession::load(&path).await.unwrap();
        assert_eq!(session.get_token().await, None);
    }

    #[tokio::test]
    async fn garbage_file_is_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let session = FileSession::load(&path).await.unwrap();
        assert_eq!(session.get_token().await, None);
    }
}
