//! Process-wide on/off switch for every composite.
//!
//! Composites read the switch through [`KillSwitch::is_enabled`] on every
//! play. They share [`KillSwitch::global`] unless a private switch is handed
//! in, which is how tests keep from toggling each other's state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<KillSwitch> = OnceLock::new();

/// Shared enabled flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    enabled: Arc<AtomicBool>,
}

impl KillSwitch {
    /// A fresh, enabled switch not shared with the global one.
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The switch every composite uses by default.
    pub fn global() -> KillSwitch {
        GLOBAL.get_or_init(KillSwitch::new).clone()
    }

    /// Let composites on this switch play again.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
        log::info!("feedbacks enabled");
    }

    /// Refuse every play on this switch until re-enabled.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        log::info!("feedbacks disabled");
    }

    /// Whether plays are allowed.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}
