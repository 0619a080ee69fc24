//! Upload error taxonomy and transport-failure classification.

use obscura_queue::QueueError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, UploadError>;

/// Errors surfaced by the upload path, classified so the UI can show an
/// actionable message instead of a raw SDK dump.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// No remote configuration saved yet. Needs user setup, not retries.
    #[error("remote storage is not configured")]
    ConfigMissing,

    /// Configuration store I/O or parse failure.
    #[error("configuration store error: {0}")]
    Config(String),

    /// The source encrypted file vanished. Terminal for the task.
    #[error("local encrypted file missing: {0}")]
    LocalFileMissing(String),

    /// Host unreachable, timeout, connection reset — retryable.
    #[error("network error: {0}")]
    Network(String),

    /// Access denied, bad signature, invalid key.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The configured bucket does not exist.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// Certificate or protocol mismatch.
    #[error("TLS failure: {0}")]
    Tls(String),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Raw message passed through, never silently swallowed.
    #[error("{0}")]
    Unknown(String),
}

impl UploadError {
    /// Whether another attempt could plausibly succeed without user
    /// intervention. Auth/bucket/TLS failures are unlikely to self-resolve
    /// but are still retried up to the task's attempt budget; only
    /// missing config, a vanished source file, and store-level errors are
    /// terminal outright.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Network(_)
            | UploadError::Auth(_)
            | UploadError::BucketNotFound(_)
            | UploadError::Tls(_)
            | UploadError::Unknown(_) => true,
            UploadError::ConfigMissing
            | UploadError::Config(_)
            | UploadError::LocalFileMissing(_)
            | UploadError::Queue(_) => false,
        }
    }

    /// User-facing message for this failure.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::ConfigMissing => {
                "Remote storage is not configured yet. Add your server details in settings.".into()
            }
            UploadError::Config(detail) => {
                format!("Could not read the storage configuration: {detail}")
            }
            UploadError::LocalFileMissing(_) => {
                "The local encrypted file is missing. It may have been deleted.".into()
            }
            UploadError::Network(_) => {
                "Network error. Check your connection and try again.".into()
            }
            UploadError::Auth(_) => {
                "The storage server rejected the credentials. Check your access keys.".into()
            }
            UploadError::BucketNotFound(_) => {
                "Bucket not found. Check the bucket name in your storage settings.".into()
            }
            UploadError::Tls(_) => {
                "Secure connection failed. Check the server certificate and endpoint protocol."
                    .into()
            }
            UploadError::Queue(e) => e.to_string(),
            UploadError::Unknown(detail) => detail.clone(),
        }
    }
}

/// Classifies a rendered transport error into the taxonomy.
///
/// S3-compatible servers and the SDK mostly agree on the phrases below;
/// anything unrecognized passes through as [`UploadError::Unknown`] with
/// the raw detail intact.
pub fn classify_transport_error(detail: &str) -> UploadError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("certificate")
        || lower.contains("handshake")
        || lower.contains(" tls")
        || lower.starts_with("tls")
        || lower.contains("ssl")
    {
        return UploadError::Tls(detail.to_string());
    }
    if lower.contains("accessdenied")
        || lower.contains("access denied")
        || lower.contains("signaturedoesnotmatch")
        || lower.contains("invalidaccesskeyid")
        || lower.contains("forbidden")
        || lower.contains("status: 401")
        || lower.contains("status: 403")
    {
        return UploadError::Auth(detail.to_string());
    }
    if lower.contains("nosuchbucket") || lower.contains("no such bucket") {
        return UploadError::BucketNotFound(detail.to_string());
    }
    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("dns")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("broken pipe")
        || lower.contains("unreachable")
        || lower.contains("dispatch failure")
        || lower.contains("connection closed")
    {
        return UploadError::Network(detail.to_string());
    }

    UploadError::Unknown(detail.to_string())
}
