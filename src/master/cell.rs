//! Shared holder for the address of the authoritative master

use std::sync::{Arc, RwLock};

/// Latest known master address.
///
/// Cloning shares the same underlying value. The supervisor is the only
/// writer; request handlers read a copy whenever they need to proxy.
#[derive(Debug, Clone)]
pub struct MasterCell {
    inner: Arc<RwLock<String>>,
}

impl MasterCell {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(seed.into())),
        }
    }

    /// Copy of the current address
    pub fn get(&self) -> String {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Install a new address; empty values are ignored.
    ///
    /// Returns true if the stored value changed.
    pub(crate) fn set(&self, addr: &str) -> bool {
        if addr.is_empty() {
            return false;
        }
        let mut current = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *current == addr {
            return false;
        }
        *current = addr.to_string();
        true
    }
}
