use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared holder for the proxy access key.
///
/// Cloned into every component that talks to the admin API. The client clears
/// it when the proxy answers 401 so a stale key is never retried.
#[derive(Clone, Default)]
pub struct Credentials {
    key: Arc<RwLock<Option<SecretString>>>,
}

impl Credentials {
    pub fn new(key: Option<SecretString>) -> Self {
        Self {
            key: Arc::new(RwLock::new(key)),
        }
    }

    pub fn set(&self, key: SecretString) {
        *self.key.write().unwrap_or_else(PoisonError::into_inner) = Some(key);
    }

    pub fn clear(&self) {
        *self.key.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run `f` with the exposed key, if one is held.
    pub(crate) fn with_key<R>(&self, f: impl FnOnce(&str) -> R) -> Option<R> {
        let guard = self.key.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|key| f(key.expose_secret()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_authenticated() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("Credentials").field("key", &state).finish()
    }
}
