//! Cached remote-session state machine.
//!
//! The controller holds the one cached client plus the config it was
//! built from, and drives transitions from vault lock/unlock events and
//! process foreground signals. A vault lock is a security boundary:
//! the cached client and config are discarded immediately, not evicted
//! lazily. Backgrounding alone never touches the session — an in-flight
//! upload is allowed to finish while the app is hidden.

use crate::config::ConfigStore;
use crate::error::UploadError;
use crate::s3_transport::{ClientFactory, ObjectStore};
use crate::signals::{AppPhase, VaultState};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Process-local session state. Never persisted; rebuilt on demand from
/// the stored remote configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected {
        endpoint: String,
        bucket: String,
        connected_since: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }
}

/// Owns the cached remote client and serializes its rebuilds.
///
/// Reads (`client`/`config`/`state`) are cheap and may come from any
/// worker; mutations all pass through one async mutex so concurrent
/// probes can never interleave.
pub struct SessionController {
    factory: Arc<dyn ClientFactory>,
    config_store: Arc<ConfigStore>,
    state: RwLock<SessionState>,
    cached: RwLock<Option<(Arc<dyn ObjectStore>, crate::config::RemoteConfig)>>,
    transition: Mutex<()>,
}

impl SessionController {
    pub fn new(factory: Arc<dyn ClientFactory>, config_store: Arc<ConfigStore>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            config_store,
            state: RwLock::new(SessionState::Disconnected),
            cached: RwLock::new(None),
            transition: Mutex::new(()),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state.read().unwrap().clone()
    }

    /// The cached client — `Some` only while `Connected`.
    pub fn client(&self) -> Option<Arc<dyn ObjectStore>> {
        self.cached.read().unwrap().as_ref().map(|(c, _)| c.clone())
    }

    /// The config the cached client was built from — `Some` only while
    /// `Connected`.
    pub fn config(&self) -> Option<crate::config::RemoteConfig> {
        self.cached.read().unwrap().as_ref().map(|(_, cfg)| cfg.clone())
    }

    /// Probes the remote store and transitions accordingly.
    ///
    /// No config means `Disconnected` (a legitimate needs-setup state,
    /// not an error). A client build or reachability failure lands in
    /// `Error`; only a positive bucket check reaches `Connected`.
    pub async fn connect(&self) -> SessionState {
        let _guard = self.transition.lock().await;

        let Some(config) = self.config_store.current() else {
            self.clear_cached();
            self.set_state(SessionState::Disconnected);
            debug!("no remote configuration, session disconnected");
            return SessionState::Disconnected;
        };

        // The cached client may point at superseded settings; nothing is
        // handed out while the probe runs.
        self.clear_cached();
        self.set_state(SessionState::Connecting);

        let client = match self.factory.build(&config).await {
            Ok(client) => client,
            Err(UploadError::ConfigMissing) => {
                self.clear_cached();
                self.set_state(SessionState::Disconnected);
                return SessionState::Disconnected;
            }
            Err(e) => {
                self.clear_cached();
                warn!("remote client build failed: {e}");
                return self.enter_error(e.to_string());
            }
        };

        match client.bucket_exists().await {
            Ok(true) => {
                let state = SessionState::Connected {
                    endpoint: config.endpoint.clone(),
                    bucket: config.bucket.clone(),
                    connected_since: Utc::now(),
                };
                *self.cached.write().unwrap() = Some((client, config));
                self.set_state(state.clone());
                info!("remote session connected");
                state
            }
            Ok(false) => {
                self.clear_cached();
                warn!("bucket {} not reachable: not found", config.bucket);
                self.enter_error(format!("bucket {} not found", config.bucket))
            }
            Err(e) => {
                self.clear_cached();
                warn!("bucket reachability check failed: {e}");
                self.enter_error(e.to_string())
            }
        }
    }

    /// Drops the cached client and config immediately. Called on vault
    /// lock; synchronous so the teardown is observable within the same
    /// reactive tick as the lock event.
    pub fn handle_vault_lock(&self) {
        self.clear_cached();
        self.set_state(SessionState::Disconnected);
        info!("vault locked, remote session discarded");
    }

    /// Event loop: reacts to vault lock/unlock and process phase changes.
    /// Exits when either publisher goes away.
    pub async fn run(
        self: Arc<Self>,
        mut vault: watch::Receiver<VaultState>,
        mut phase: watch::Receiver<AppPhase>,
    ) {
        info!("session controller started");
        loop {
            tokio::select! {
                changed = vault.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *vault.borrow_and_update();
                    match state {
                        VaultState::Locked => self.handle_vault_lock(),
                        VaultState::Unlocked => {
                            self.connect().await;
                        }
                    }
                }
                changed = phase.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *phase.borrow_and_update();
                    match current {
                        AppPhase::Foreground => {
                            // Re-probe on foreground, but only with the
                            // vault open.
                            if *vault.borrow() == VaultState::Unlocked {
                                self.connect().await;
                            }
                        }
                        // Backgrounding never tears the session down;
                        // queued uploads may still complete.
                        AppPhase::Background => {}
                    }
                }
            }
        }
        info!("session controller stopped");
    }

    fn enter_error(&self, message: String) -> SessionState {
        let state = SessionState::Error { message };
        self.set_state(state.clone());
        state
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write().unwrap() = state;
    }

    fn clear_cached(&self) {
        *self.cached.write().unwrap() = None;
    }
}
