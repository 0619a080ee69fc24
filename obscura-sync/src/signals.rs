//! Reactive signals published by the host application.
//!
//! The vault and process-lifecycle collaborators push state through
//! watch channels: new subscribers immediately receive the latest value,
//! and the session controller reacts to changes in its run loop.

use tokio::sync::watch;

/// Lock state of the encryption vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    Locked,
    Unlocked,
}

/// Process visibility. Backgrounding alone never tears down the remote
/// session — only a vault lock does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Foreground,
    Background,
}

/// Publisher side of the vault lock state.
pub struct VaultSignal {
    tx: watch::Sender<VaultState>,
}

impl VaultSignal {
    pub fn new(initial: VaultState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn lock(&self) {
        self.tx.send_replace(VaultState::Locked);
    }

    pub fn unlock(&self) {
        self.tx.send_replace(VaultState::Unlocked);
    }

    pub fn subscribe(&self) -> watch::Receiver<VaultState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> VaultState {
        *self.tx.borrow()
    }

    pub fn is_unlocked(&self) -> bool {
        self.current() == VaultState::Unlocked
    }
}

impl Default for VaultSignal {
    fn default() -> Self {
        Self::new(VaultState::Locked)
    }
}

/// Publisher side of the process foreground/background phase.
pub struct PhaseSignal {
    tx: watch::Sender<AppPhase>,
}

impl PhaseSignal {
    pub fn new(initial: AppPhase) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn foreground(&self) {
        self.tx.send_replace(AppPhase::Foreground);
    }

    pub fn background(&self) {
        self.tx.send_replace(AppPhase::Background);
    }

    pub fn subscribe(&self) -> watch::Receiver<AppPhase> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> AppPhase {
        *self.tx.borrow()
    }
}

impl Default for PhaseSignal {
    fn default() -> Self {
        Self::new(AppPhase::Foreground)
    }
}
