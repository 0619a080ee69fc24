//! Upload execution — one task, end to end.
//!
//! The executor resolves the encrypted bytes, picks a client, computes
//! the object key, and streams the file out. It performs a short burst of
//! in-process retries with linear backoff before surfacing the last
//! error; it never touches the queue — the drain driver persists
//! outcomes.

use crate::config::ConfigStore;
use crate::error::{SyncResult, UploadError};
use crate::object_key::{object_key, FolderLookup};
use crate::s3_transport::{ClientFactory, ObjectStore};
use crate::session::SessionController;
use crate::sources::EncryptedSource;
use obscura_queue::RetryPolicy;
use obscura_types::UploadTask;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct UploadExecutor {
    session: Arc<SessionController>,
    factory: Arc<dyn ClientFactory>,
    config_store: Arc<ConfigStore>,
    source: Arc<dyn EncryptedSource>,
    folders: Arc<dyn FolderLookup>,
    retry: RetryPolicy,
}

impl UploadExecutor {
    pub fn new(
        session: Arc<SessionController>,
        factory: Arc<dyn ClientFactory>,
        config_store: Arc<ConfigStore>,
        source: Arc<dyn EncryptedSource>,
        folders: Arc<dyn FolderLookup>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            session,
            factory,
            config_store,
            source,
            folders,
            retry,
        }
    }

    /// Performs one upload attempt burst for a task. Returns the composed
    /// remote URL (`endpoint/bucket/key`) on success.
    pub async fn upload(&self, task: &UploadTask) -> SyncResult<String> {
        let blob = self.source.resolve(&task.file_id).await?;
        let key = object_key(
            task.media_type,
            task.folder_id.as_ref(),
            self.folders.as_ref(),
            &blob.blob_name,
        );

        let mut last_err: Option<UploadError> = None;

        for attempt in 1..=self.retry.burst_attempts.max(1) {
            let (store, config) = match self.resolve_client(attempt).await {
                Ok(pair) => pair,
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    last_err = Some(e);
                    self.burst_sleep(attempt).await;
                    continue;
                }
            };

            match store.put_file(&key, &blob.path, blob.len).await {
                Ok(()) => {
                    let url = config.object_url(&key);
                    debug!("task {} uploaded as {key}", task.id);
                    return Ok(url);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        "upload attempt {attempt}/{} for task {} failed: {e}",
                        self.retry.burst_attempts, task.id
                    );
                    last_err = Some(e);
                    self.burst_sleep(attempt).await;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| UploadError::Unknown("upload failed".to_string())))
    }

    /// First in-burst attempt may use the controller's cached client.
    /// Every later attempt forces a fresh client from freshly read
    /// config — a stale cached connection (half-open socket, broken
    /// pipe) is the likeliest cause of the previous failure.
    async fn resolve_client(
        &self,
        attempt: u32,
    ) -> SyncResult<(Arc<dyn ObjectStore>, crate::config::RemoteConfig)> {
        if attempt == 1 {
            if let (Some(client), Some(config)) = (self.session.client(), self.session.config()) {
                return Ok((client, config));
            }
        }

        let config = self.config_store.current().ok_or(UploadError::ConfigMissing)?;
        let client = self.factory.build(&config).await?;
        Ok((client, config))
    }

    async fn burst_sleep(&self, failed_attempt: u32) {
        if failed_attempt < self.retry.burst_attempts {
            tokio::time::sleep(self.retry.burst_delay(failed_attempt)).await;
        }
    }
}
