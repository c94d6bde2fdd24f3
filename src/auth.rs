//! Sign-in gating for sends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::store::KeyValueStore;

/// Store key under which [`StoredIdentity`] records the signed-in user.
pub const DEFAULT_IDENTITY_KEY: &str = "signed_in_user";

/// Decides whether the current user may send messages.
pub trait AuthGate: Send + Sync {
    /// True if sends are allowed.
    fn is_authenticated(&self) -> bool;

    /// Asks the surface to show its sign-in flow.
    fn prompt_sign_in(&self);
}

/// A gate that never blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysSignedIn;

impl AuthGate for AlwaysSignedIn {
    fn is_authenticated(&self) -> bool {
        true
    }

    fn prompt_sign_in(&self) {}
}

/// A gate backed by a user name recorded in a [`KeyValueStore`].
///
/// Prompts are latched: [`StoredIdentity::take_sign_in_prompt`] reports
/// whether a prompt was requested since the last call.
pub struct StoredIdentity {
    store: Arc<dyn KeyValueStore>,
    key: String,
    prompt_pending: AtomicBool,
}

impl StoredIdentity {
    /// Creates a gate that reads [`DEFAULT_IDENTITY_KEY`].
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, DEFAULT_IDENTITY_KEY)
    }

    /// Creates a gate that reads `key`.
    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            prompt_pending: AtomicBool::new(false),
        }
    }

    /// The signed-in user, if any.
    pub fn user(&self) -> Option<String> {
        self.store.get(&self.key).filter(|name| !name.trim().is_empty())
    }

    /// Records `name` as the signed-in user.
    pub fn sign_in(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation(
                "user name must not be empty",
                Some("name".to_string()),
            ));
        }
        self.store.set(&self.key, name)?;
        self.prompt_pending.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Forgets the signed-in user.
    pub fn sign_out(&self) -> Result<()> {
        self.store.remove(&self.key)
    }

    /// Returns true once per requested prompt.
    pub fn take_sign_in_prompt(&self) -> bool {
        self.prompt_pending.swap(false, Ordering::Relaxed)
    }
}

impl AuthGate for StoredIdentity {
    fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    fn prompt_sign_in(&self) {
        self.prompt_pending.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn stored_identity_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let gate = StoredIdentity::new(store.clone());
        assert!(!gate.is_authenticated());

        gate.sign_in("  ada  ").unwrap();
        assert!(gate.is_authenticated());
        assert_eq!(gate.user().as_deref(), Some("ada"));
        assert_eq!(store.get(DEFAULT_IDENTITY_KEY).as_deref(), Some("ada"));

        gate.sign_out().unwrap();
        assert!(!gate.is_authenticated());
    }

    #[test]
    fn blank_names_rejected() {
        let gate = StoredIdentity::new(Arc::new(MemoryStore::new()));
        assert!(gate.sign_in("   ").unwrap_err().is_validation());
        assert!(!gate.is_authenticated());
    }

    #[test]
    fn prompt_is_latched() {
        let gate = StoredIdentity::with_key(Arc::new(MemoryStore::new()), "who");
        assert!(!gate.take_sign_in_prompt());
        gate.prompt_sign_in();
        gate.prompt_sign_in();
        assert!(gate.take_sign_in_prompt());
        assert!(!gate.take_sign_in_prompt());
    }

    #[test]
    fn always_signed_in() {
        assert!(AlwaysSignedIn.is_authenticated());
    }
}
