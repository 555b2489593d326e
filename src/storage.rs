use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// The two durable credential slots.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl StoredTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl std::fmt::Debug for StoredTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTokens")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Client-side storage that survives restarts.
///
/// Both slots are written and cleared together; only the refresh protocol
/// replaces the access token on its own.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<StoredTokens>;

    async fn save(&self, tokens: &StoredTokens) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.load().await?.access_token)
    }

    async fn refresh_token(&self) -> Result<Option<String>> {
        Ok(self.load().await?.refresh_token)
    }
}

/// JSON file holding the two token entries.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<StoredTokens> {
        Ok(load_tokens(&self.path).await)
    }

    async fn save(&self, tokens: &StoredTokens) -> Result<()> {
        persist_tokens(&self.path, tokens).await
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed token file");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Unreadable or corrupt files count as "no tokens stored".
pub async fn load_tokens(path: &Path) -> StoredTokens {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(tokens) => tokens,
            Err(err) => {
                error!("failed to parse token file {}: {err}", path.display());
                StoredTokens::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoredTokens::default(),
        Err(err) => {
            error!("failed to read token file {}: {err}", path.display());
            StoredTokens::default()
        }
    }
}

pub async fn persist_tokens(path: &Path, tokens: &StoredTokens) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(tokens)?;
    fs::write(path, payload).await?;
    restrict_permissions(path).await?;
    Ok(())
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// In-process store. Clones share the same slots, which is how tests model a
/// client restart over the same durable storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    tokens: Arc<Mutex<StoredTokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: StoredTokens) -> Self {
        Self {
            tokens: Arc::new(Mutex::new(tokens)),
        }
    }

    pub async fn snapshot(&self) -> StoredTokens {
        self.tokens.lock().await.clone()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<StoredTokens> {
        Ok(self.snapshot().await)
    }

    async fn save(&self, tokens: &StoredTokens) -> Result<()> {
        *self.tokens.lock().await = tokens.clone();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.tokens.lock().await = StoredTokens::default();
        Ok(())
    }
}
