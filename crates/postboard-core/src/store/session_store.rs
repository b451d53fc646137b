use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::{SessionRecord, SessionSnapshot};

use super::{KeyValueStore, MemoryStore};

/// Key under which the session snapshot is stored, identical in both scopes
pub const SESSION_KEY: &str = "authSessionData";

/// Storage lifetime for a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Survives restarts
    Durable,
    /// Lives only as long as the current process
    Ephemeral,
}

/// Session persistence over two storage scopes.
///
/// Every failure is logged and then treated as absent data: a broken or full
/// store must never take the caller down, the worst case is being logged out.
///
/// There is no locking across scopes. The session key is only written by the
/// [`SessionController`](crate::auth::SessionController) and the refresh
/// scheduler it owns.
pub struct SessionStore {
    durable: Box<dyn KeyValueStore>,
    ephemeral: Box<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(durable: Box<dyn KeyValueStore>, ephemeral: Box<dyn KeyValueStore>) -> Self {
        Self { durable, ephemeral }
    }

    /// Store with both scopes in memory
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()))
    }

    fn backend(&self, scope: Scope) -> &dyn KeyValueStore {
        match scope {
            Scope::Durable => self.durable.as_ref(),
            Scope::Ephemeral => self.ephemeral.as_ref(),
        }
    }

    /// Read and decode a value, or `None` if it is absent or unreadable
    pub fn get<T: DeserializeOwned>(&self, key: &str, scope: Scope) -> Option<T> {
        self.get_with(key, scope, |value: T| value)
    }

    /// Read a value, decode it as `R` and convert it with `transform`
    pub fn get_with<R, T, F>(&self, key: &str, scope: Scope, transform: F) -> Option<T>
    where
        R: DeserializeOwned,
        F: FnOnce(R) -> T,
    {
        let raw = match self.backend(scope).get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, ?scope, error = %e, "Failed to read stored value");
                return None;
            }
        };

        match serde_json::from_str::<R>(&raw) {
            Ok(value) => Some(transform(value)),
            Err(e) => {
                warn!(key, ?scope, error = %e, "Failed to decode stored value");
                None
            }
        }
    }

    /// Encode and write a value. Failures are logged and dropped.
    pub fn set<T: Serialize>(&self, key: &str, scope: Scope, value: &T) {
        let contents = match serde_json::to_string(value) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(key, ?scope, error = %e, "Failed to encode value for storage");
                return;
            }
        };

        if let Err(e) = self.backend(scope).set(key, &contents) {
            warn!(key, ?scope, error = %e, "Failed to write stored value");
        }
    }

    pub fn delete(&self, key: &str, scope: Scope) {
        if let Err(e) = self.backend(scope).remove(key) {
            warn!(key, ?scope, error = %e, "Failed to delete stored value");
        }
    }

    pub fn clear(&self, scope: Scope) {
        if let Err(e) = self.backend(scope).clear() {
            warn!(?scope, error = %e, "Failed to clear storage");
        }
    }

    /// Check whether a decodable value exists under `key`
    pub fn has(&self, key: &str, scope: Scope) -> bool {
        self.get::<serde_json::Value>(key, scope).is_some()
    }

    /// Load the stored session, durable scope first
    pub fn get_session(&self) -> Option<SessionRecord> {
        self.load_session(Scope::Durable)
            .or_else(|| self.load_session(Scope::Ephemeral))
    }

    fn load_session(&self, scope: Scope) -> Option<SessionRecord> {
        let restore = |snapshot: SessionSnapshot| SessionRecord::try_from(snapshot);
        self.get_with(SESSION_KEY, scope, restore)?
            .inspect_err(|e| warn!(?scope, error = %e, "Ignoring invalid stored session"))
            .ok()
    }

    /// Save the session in the scope its remember-me choice selects
    pub fn set_session(&self, session: &SessionRecord) {
        let scope = if session.remember_me() {
            Scope::Durable
        } else {
            Scope::Ephemeral
        };
        debug!(?scope, user_id = session.user_id(), "Saving session");
        self.set(SESSION_KEY, scope, &session.snapshot());
    }

    /// Remove the session from both scopes.
    ///
    /// A copy can be left behind in the other scope when remember-me changed
    /// between logins, so both are always cleared.
    pub fn delete_session(&self) {
        self.delete(SESSION_KEY, Scope::Ephemeral);
        self.delete(SESSION_KEY, Scope::Durable);
    }
}
