//! Remote storage configuration and its reactive store.

use crate::error::{SyncResult, UploadError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::debug;

/// Connection parameters for the S3-compatible remote store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Endpoint URL, e.g. "https://minio.example.net:9000".
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

impl RemoteConfig {
    /// True when every field needed to build a client is present.
    pub fn is_complete(&self) -> bool {
        !self.endpoint.trim().is_empty()
            && !self.access_key.is_empty()
            && !self.secret_key.is_empty()
            && !self.bucket.trim().is_empty()
    }

    /// Composes the public URL of an uploaded object:
    /// `endpoint/bucket/key`.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), self.bucket, key)
    }
}

/// Holder of the persisted remote configuration.
///
/// "No config" is a legitimate state, not an error — it means the user
/// has not set up remote storage yet. Subscribers immediately observe the
/// latest value on subscription (watch-channel replay semantics).
pub struct ConfigStore {
    tx: watch::Sender<Option<RemoteConfig>>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// A store with no backing file. Used by tests and ephemeral setups.
    pub fn in_memory() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx, path: None }
    }

    /// Opens a store backed by a JSON file, loading the current value if
    /// the file exists.
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let initial = match std::fs::read(&path) {
            Ok(bytes) => Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| UploadError::Config(format!("{}: {e}", path.display())))?,
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(UploadError::Config(format!("{}: {e}", path.display()))),
        };
        let (tx, _) = watch::channel(initial);
        Ok(Self { tx, path: Some(path) })
    }

    /// Latest configuration, if any.
    pub fn current(&self) -> Option<RemoteConfig> {
        self.tx.borrow().clone()
    }

    /// Reactive view. New receivers see the latest value right away.
    pub fn subscribe(&self) -> watch::Receiver<Option<RemoteConfig>> {
        self.tx.subscribe()
    }

    /// Persists and publishes a new configuration.
    pub fn save(&self, config: RemoteConfig) -> SyncResult<()> {
        if let Some(path) = &self.path {
            let bytes = serde_json::to_vec_pretty(&config)
                .map_err(|e| UploadError::Config(e.to_string()))?;
            std::fs::write(path, bytes)
                .map_err(|e| UploadError::Config(format!("{}: {e}", path.display())))?;
        }
        debug!("remote configuration saved for endpoint {}", config.endpoint);
        self.tx.send_replace(Some(config));
        Ok(())
    }

    /// Removes the stored configuration.
    pub fn clear(&self) -> SyncResult<()> {
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(UploadError::Config(format!("{}: {e}", path.display()))),
            }
        }
        self.tx.send_replace(None);
        Ok(())
    }
}
