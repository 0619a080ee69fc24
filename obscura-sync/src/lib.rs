//! S3 replication engine for Obscura.
//!
//! Media captured on the device is stored encrypted locally and
//! replicated asynchronously to an S3-compatible store. This crate holds
//! the moving parts of that replication:
//! - a cached remote-session state machine gated by the vault lock state
//! - deterministic object-key construction (opaque names, no filename
//!   leakage)
//! - the upload executor with in-burst retries and error classification
//! - the drain engine that works the durable queue in `obscura-queue`

pub mod config;
pub mod drain;
pub mod error;
pub mod object_key;
pub mod s3_transport;
pub mod session;
pub mod signals;
pub mod sources;
pub mod uploader;

pub use config::{ConfigStore, RemoteConfig};
pub use drain::{create_drain_engine, DrainCommand, DrainEngine, DrainHandle, DrainReport};
pub use error::{classify_transport_error, SyncResult, UploadError};
pub use object_key::{object_key, FolderLookup, REMOTE_NAMESPACE};
pub use s3_transport::{
    ClientFactory, ObjectStore, S3ClientFactory, S3ObjectStore, ENCRYPTED_CONTENT_TYPE,
};
pub use session::{SessionController, SessionState};
pub use signals::{AppPhase, PhaseSignal, VaultSignal, VaultState};
pub use sources::{EncryptedBlob, EncryptedSource, VaultBlobSource};
pub use uploader::UploadExecutor;
