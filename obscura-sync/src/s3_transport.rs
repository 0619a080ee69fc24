//! S3-compatible object store transport.
//!
//! The rest of the engine talks to [`ObjectStore`] and [`ClientFactory`]
//! traits; the production implementations here wrap the AWS SDK with
//! static credentials, a forced-path-style endpoint override, and
//! connect/read timeouts fixed at client-build time.

use crate::config::RemoteConfig;
use crate::error::{classify_transport_error, SyncResult, UploadError};
use async_trait::async_trait;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Content type for every uploaded payload. Bodies are already encrypted,
/// so there is nothing meaningful to sniff or declare.
pub const ENCRYPTED_CONTENT_TYPE: &str = "application/octet-stream";

/// Minimal surface the upload path needs from a remote object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lightweight reachability probe against the configured bucket.
    async fn bucket_exists(&self) -> SyncResult<bool>;

    /// Streams a local file to the store under `key` with a declared
    /// content length.
    async fn put_file(&self, key: &str, path: &Path, len: u64) -> SyncResult<()>;
}

/// Builds an [`ObjectStore`] from connection parameters. The seam exists
/// so the session controller and executor can be exercised without a
/// network.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn build(&self, config: &RemoteConfig) -> SyncResult<Arc<dyn ObjectStore>>;
}

/// AWS-SDK-backed object store bound to one bucket.
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self) -> SyncResult<bool> {
        match self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if let SdkError::ServiceError(ref ctx) = err {
                    if ctx.err().is_not_found() {
                        return Ok(false);
                    }
                }
                Err(classify_sdk_error("head bucket", &err))
            }
        }
    }

    async fn put_file(&self, key: &str, path: &Path, len: u64) -> SyncResult<()> {
        let body = ByteStream::from_path(path).await.map_err(|e| {
            UploadError::LocalFileMissing(format!("{}: {e}", path.display()))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(len as i64)
            .content_type(ENCRYPTED_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| classify_sdk_error("put object", &e))?;

        debug!("uploaded {len} bytes to s3://{}/{key}", self.bucket);
        Ok(())
    }
}

/// Builds S3 clients from [`RemoteConfig`] with fixed timeouts.
#[derive(Debug, Clone, Copy)]
pub struct S3ClientFactory {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for S3ClientFactory {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl ClientFactory for S3ClientFactory {
    async fn build(&self, config: &RemoteConfig) -> SyncResult<Arc<dyn ObjectStore>> {
        if !config.is_complete() {
            return Err(UploadError::ConfigMissing);
        }

        let credentials = aws_credential_types::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "obscura-remote",
        );

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .build();

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version_latest()
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .timeout_config(timeouts)
            .endpoint_url(config.endpoint.clone())
            .force_path_style(true)
            .build();

        Ok(Arc::new(S3ObjectStore::new(
            S3Client::from_conf(s3_config),
            config.bucket.clone(),
        )))
    }
}

fn classify_sdk_error<E, R>(op: &str, err: &SdkError<E, R>) -> UploadError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    let detail = format!("{op}: {}", error_chain(err));
    classify_transport_error(&detail)
}

/// Renders an error with its full source chain; the SDK buries the
/// interesting part (timeouts, DNS, TLS) several levels deep.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}
