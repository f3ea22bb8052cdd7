//! Secret stores. Values are looked up by name on every call.

use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use reviewhook_core::SecretStore;

/// Reads `<dir>/<name>`, e.g. a mounted secrets volume.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<String>> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            anyhow::bail!("invalid secret name '{}'", name);
        }

        let path = self.dir.join(name);
        debug!("Reading secret '{}' from {}", name, path.display());

        match tokio::fs::read_to_string(&path).await {
            // Mounted secrets usually end with a newline
            Ok(value) => Ok(Some(value.trim_end_matches(['\r', '\n']).to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read secret '{}'", name)),
        }
    }
}

/// Reads environment variables named exactly like the secret.
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<String>> {
        Ok(std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_secret_is_read_without_trailing_newline() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("githubToken"), "s3cr3t\n").unwrap();

        let store = FileSecretStore::new(dir.path());

        assert_eq!(
            store.get_secret("githubToken").await.unwrap(),
            Some("s3cr3t".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_file_secret_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileSecretStore::new(dir.path());

        assert_eq!(store.get_secret("githubPK").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_path_like_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileSecretStore::new(dir.path());

        assert!(store.get_secret("../etc/passwd").await.is_err());
        assert!(store.get_secret("..").await.is_err());
    }

    #[tokio::test]
    async fn test_env_secret_store() {
        std::env::set_var("REVIEWHOOK_TEST_SECRET_ENV", "from-env");

        let store = EnvSecretStore;

        assert_eq!(
            store.get_secret("REVIEWHOOK_TEST_SECRET_ENV").await.unwrap(),
            Some("from-env".to_string())
        );
        assert_eq!(
            store.get_secret("REVIEWHOOK_TEST_SECRET_UNSET").await.unwrap(),
            None
        );
    }
}
