#![allow(dead_code)]

//! In-process fakes for the object-store and blob-source seams.

use async_trait::async_trait;
use obscura_sync::{
    ClientFactory, EncryptedBlob, EncryptedSource, ObjectStore, RemoteConfig, SyncResult,
    UploadError,
};
use obscura_types::FileId;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn test_config() -> RemoteConfig {
    RemoteConfig {
        endpoint: "https://s3.example.net".to_string(),
        access_key: "AKIATEST".to_string(),
        secret_key: "secret".to_string(),
        bucket: "vault".to_string(),
        region: "us-east-1".to_string(),
    }
}

/// Scriptable object store. Errors queued with `fail_next` are returned
/// in order; once drained, puts succeed and their keys are recorded.
pub struct FakeObjectStore {
    put_keys: Mutex<Vec<String>>,
    put_script: Mutex<VecDeque<UploadError>>,
    bucket_exists: Mutex<SyncResult<bool>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            put_keys: Mutex::new(Vec::new()),
            put_script: Mutex::new(VecDeque::new()),
            bucket_exists: Mutex::new(Ok(true)),
            gate: Mutex::new(None),
        })
    }

    pub fn fail_next(&self, err: UploadError) {
        self.put_script.lock().unwrap().push_back(err);
    }

    pub fn fail_next_n(&self, err: UploadError, n: usize) {
        let mut script = self.put_script.lock().unwrap();
        for _ in 0..n {
            script.push_back(err.clone());
        }
    }

    pub fn set_bucket_exists(&self, result: SyncResult<bool>) {
        *self.bucket_exists.lock().unwrap() = result;
    }

    /// Makes every put wait for one `notify_one` before proceeding.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn put_keys(&self) -> Vec<String> {
        self.put_keys.lock().unwrap().clone()
    }

    pub fn put_count(&self) -> usize {
        self.put_keys.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn bucket_exists(&self) -> SyncResult<bool> {
        self.bucket_exists.lock().unwrap().clone()
    }

    async fn put_file(&self, key: &str, _path: &Path, _len: u64) -> SyncResult<()> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.put_script.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.put_keys.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// Factory handing out one shared fake store, counting builds.
pub struct FakeFactory {
    store: Mutex<Arc<FakeObjectStore>>,
    builds: AtomicUsize,
    fail_with: Mutex<Option<UploadError>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeFactory {
    pub fn new(store: Arc<FakeObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            builds: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
            gate: Mutex::new(None),
        })
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn fail_builds_with(&self, err: UploadError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    /// Makes every build wait for one `notify_one` before returning.
    pub fn gate_builds(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn swap_store(&self, store: Arc<FakeObjectStore>) {
        *self.store.lock().unwrap() = store;
    }
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn build(&self, _config: &RemoteConfig) -> SyncResult<Arc<dyn ObjectStore>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        let store = self.store.lock().unwrap().clone();
        Ok(store as Arc<dyn ObjectStore>)
    }
}

/// Blob source backed by a map; paths are synthetic since the fake store
/// never reads them.
pub struct FakeSource {
    blobs: Mutex<HashMap<FileId, EncryptedBlob>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            blobs: Mutex::new(HashMap::new()),
        })
    }

    pub fn insert(&self, file_id: FileId, blob_name: &str, len: u64) {
        self.blobs.lock().unwrap().insert(
            file_id,
            EncryptedBlob {
                path: PathBuf::from(format!("/vault/blobs/{blob_name}")),
                len,
                blob_name: blob_name.to_string(),
            },
        );
    }

    pub fn remove(&self, file_id: &FileId) {
        self.blobs.lock().unwrap().remove(file_id);
    }
}

#[async_trait]
impl EncryptedSource for FakeSource {
    async fn resolve(&self, file_id: &FileId) -> SyncResult<EncryptedBlob> {
        self.blobs
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| UploadError::LocalFileMissing(file_id.to_string()))
    }
}
