//! Token persistence for ChargeSync
//!
//! The engine owns exactly one opaque token record. Where that record
//! lives is the host's choice, expressed through the [`TokenStore`]
//! capability interface with two stock implementations: in-memory for
//! library use and a JSON file for durable embedding.

use crate::error::Result;
use crate::logging::get_logger;
use crate::models::Token;
use std::path::{Path, PathBuf};

/// Pluggable storage for the token record
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the stored token record, if any
    async fn load(&self) -> Result<Option<Token>>;

    /// Save the token record
    async fn save(&self, token: &Token) -> Result<()>;
}

/// Volatile store; tokens are re-acquired on every restart
#[derive(Default)]
pub struct MemoryTokenStore {
    token: tokio::sync::Mutex<Option<Token>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<Token>> {
        Ok(self.token.lock().await.clone())
    }

    async fn save(&self, token: &Token) -> Result<()> {
        *self.token.lock().await = Some(token.clone());
        Ok(())
    }
}

/// Durable store keeping the token record as a JSON file
pub struct FileTokenStore {
    file_path: PathBuf,
    logger: crate::logging::StructuredLogger,
}

impl FileTokenStore {
    /// Create a new file-backed store
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let logger = get_logger("storage");
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            logger,
        }
    }
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<Token>> {
        if !self.file_path.exists() {
            self.logger.info("No stored token record found");
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&self.file_path).await?;
        let token: Token = serde_json::from_str(&contents)?;
        self.logger.info("Loaded token record from disk");
        Ok(Some(token))
    }

    async fn save(&self, token: &Token) -> Result<()> {
        if let Some(dir) = self.file_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let contents = serde_json::to_string_pretty(token)?;
        tokio::fs::write(&self.file_path, contents).await?;
        self.logger.debug("Saved token record to disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_token() -> Token {
        Token {
            access_token: Some("access".to_string()),
            access_token_expiration: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
            refresh_token: Some("refresh".to_string()),
            refresh_token_expiration: Some(Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert!(store.load().await.unwrap().is_none());

        let token = sample_token();
        store.save(&token).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, token.access_token);
        assert_eq!(loaded.refresh_token, token.refresh_token);
        assert_eq!(loaded.access_token_expiration, token.access_token_expiration);
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::new(&path);
        assert!(store.load().await.unwrap().is_none());

        let token = sample_token();
        store.save(&token).await.unwrap();

        // A fresh store instance sees the persisted record
        let reopened = FileTokenStore::new(&path);
        let loaded = reopened.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, token.access_token);
        assert_eq!(
            loaded.refresh_token_expiration,
            token.refresh_token_expiration
        );
    }
}
