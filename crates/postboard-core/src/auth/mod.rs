//! Session lifecycle management.
//!
//! This module provides:
//! - `SessionRecord`: credential state with expiry and refresh timing
//! - `RefreshScheduler`: single-timer proactive token renewal
//! - `SessionController`: owner of the current session and the auth flows
//!
//! Tokens are renewed 5 minutes before they expire.

pub mod controller;
pub mod record;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{SessionController, SessionState};
pub use record::{
    validate_lifetime, InvalidLifetime, SessionRecord, SessionSnapshot, MAX_TOKEN_LIFETIME_SECS,
};
pub use scheduler::{RefreshConfig, RefreshScheduler, TimerState};
