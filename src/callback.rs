//! Callback registry — name-keyed post-delivery handlers.
//!
//! Grounded on `original_source/callback/callback.go`: a `RwLock`-guarded
//! map, `register` rejecting duplicates, `lookup("")` meaning "no callback
//! configured" rather than an error. The `RwLock` discipline itself follows
//! `auth/src/token_source/reuse_token_source.rs`'s `ReuseTokenSource`,
//! which guards a single cached value the same way.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Result, SmsError};
use crate::model::{DeliveryStatus, SmsHistory};

/// `(status, history) -> Result<()>`. Side-effecting dependencies (a
/// database handle, an HTTP client) should be closed over at registration
/// time rather than reached for through a global, per spec §9.
pub type Callback = Arc<dyn Fn(&DeliveryStatus, &SmsHistory) -> Result<()> + Send + Sync>;

#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<HashMap<String, Callback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `name`. Fails with `DuplicatedCallback`
    /// if the name is already taken — registration is expected to happen
    /// once at startup, not to be overwritten at runtime.
    pub fn register(&self, name: impl Into<String>, callback: Callback) -> Result<()> {
        let name = name.into();
        let mut callbacks = self.callbacks.write().unwrap();
        if callbacks.contains_key(&name) {
            return Err(SmsError::DuplicatedCallback(name));
        }
        callbacks.insert(name, callback);
        Ok(())
    }

    /// `Ok(None)` for an empty name (no callback configured), `Ok(Some(cb))`
    /// on a hit, `Err(CallbackNotFound)` when a non-empty name has no
    /// registered handler.
    pub fn lookup(&self, name: &str) -> Result<Option<Callback>> {
        if name.is_empty() {
            return Ok(None);
        }
        let callbacks = self.callbacks.read().unwrap();
        match callbacks.get(name) {
            Some(cb) => Ok(Some(cb.clone())),
            None => Err(SmsError::CallbackNotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_means_no_callback_configured() {
        let registry = CallbackRegistry::new();
        assert!(registry.lookup("").unwrap().is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = CallbackRegistry::new();
        let cb: Callback = Arc::new(|_status, _history| Ok(()));
        registry.register("growth_statistics", cb.clone()).unwrap();
        let err = registry.register("growth_statistics", cb).unwrap_err();
        assert!(matches!(err, SmsError::DuplicatedCallback(_)));
    }

    #[test]
    fn missing_callback_is_not_found() {
        let registry = CallbackRegistry::new();
        let err = registry.lookup("nope").unwrap_err();
        assert!(matches!(err, SmsError::CallbackNotFound(_)));
    }
}
