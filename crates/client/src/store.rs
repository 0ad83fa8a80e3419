//! Durable token storage
//!
//! [`KeyValueStore`] is the storage capability (the native stand-in for
//! origin-scoped browser storage). [`TokenStore`] layers the four token
//! keys on top of it and makes multi-key writes and clears appear atomic
//! to readers going through the same `TokenStore`.

use crate::error::{ClientError, Result};
use crate::types::AuthTokens;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const TOKEN_EXPIRY_KEY: &str = "tokenExpiry";
pub const REFRESH_TOKEN_EXPIRY_KEY: &str = "refreshTokenExpiry";

pub(crate) const TOKEN_KEYS: [&str; 4] = [
    AUTH_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    TOKEN_EXPIRY_KEY,
    REFRESH_TOKEN_EXPIRY_KEY,
];

/// String key-value persistence
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON file
///
/// Every mutation rewrites the whole file through a sibling temp file and
/// a rename, so the file on disk is always a complete document.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ClientError::Storage(format!("corrupt store {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(ClientError::storage(e)),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ClientError::storage)?;
        }
        let content = serde_json::to_vec_pretty(entries).map_err(ClientError::storage)?;
        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(ClientError::storage)?;

        // Owner read/write only; set before the token bytes land
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp, permissions)
                .await
                .map_err(ClientError::storage)?;
        }

        file.write_all(&content)
            .await
            .map_err(ClientError::storage)?;
        file.sync_all().await.map_err(ClientError::storage)?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(ClientError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}

/// The four persisted token fields
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
    lock: Arc<RwLock<()>>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            lock: Arc::new(RwLock::new(())),
        }
    }

    /// A token store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Persist all four fields; absent optionals are stored as ""
    pub async fn write(&self, tokens: &AuthTokens) -> Result<()> {
        let _guard = self.lock.write().await;
        self.backend.set(AUTH_TOKEN_KEY, &tokens.token).await?;
        self.backend
            .set(
                REFRESH_TOKEN_KEY,
                tokens.refresh_token.as_deref().unwrap_or_default(),
            )
            .await?;
        self.backend
            .set(TOKEN_EXPIRY_KEY, &tokens.expires_at)
            .await?;
        self.backend
            .set(
                REFRESH_TOKEN_EXPIRY_KEY,
                tokens.refresh_token_expires_at.as_deref().unwrap_or_default(),
            )
            .await?;
        debug!("Stored auth tokens");
        Ok(())
    }

    pub async fn read(&self) -> Result<Option<String>> {
        let _guard = self.lock.read().await;
        self.get_non_empty(AUTH_TOKEN_KEY).await
    }

    pub async fn read_expiry(&self) -> Result<Option<String>> {
        let _guard = self.lock.read().await;
        self.get_non_empty(TOKEN_EXPIRY_KEY).await
    }

    /// Read the whole record; `None` unless a token is present
    pub async fn read_tokens(&self) -> Result<Option<AuthTokens>> {
        let _guard = self.lock.read().await;
        let Some(token) = self.get_non_empty(AUTH_TOKEN_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(AuthTokens {
            token,
            refresh_token: self.get_non_empty(REFRESH_TOKEN_KEY).await?,
            expires_at: self
                .get_non_empty(TOKEN_EXPIRY_KEY)
                .await?
                .unwrap_or_default(),
            refresh_token_expires_at: self.get_non_empty(REFRESH_TOKEN_EXPIRY_KEY).await?,
        }))
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        for key in TOKEN_KEYS {
            self.backend.remove(key).await?;
        }
        debug!("Cleared auth tokens");
        Ok(())
    }

    async fn get_non_empty(&self, key: &str) -> Result<Option<String>> {
        Ok(self.backend.get(key).await?.filter(|v| !v.is_empty()))
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}
