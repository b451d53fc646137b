//! Session persistence.
//!
//! Values are stored as JSON under string keys in one of two scopes:
//! - `Scope::Durable`: survives restarts (`FileStore`)
//! - `Scope::Ephemeral`: lives as long as the process (`MemoryStore`)
//!
//! `SessionStore` sits on top and never surfaces storage failures to callers.

pub mod backend;
pub mod session_store;

pub use backend::{FileStore, KeyValueStore, MemoryStore, StoreError, StoreResult};
pub use session_store::{Scope, SessionStore, SESSION_KEY};
