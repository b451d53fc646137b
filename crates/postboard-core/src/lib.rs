//! Core library for postboard.
//!
//! Keeps one user session alive for the postboard task tracker: sign-up,
//! sign-in and password change against the identity provider, persistence
//! of the session in durable or process-scoped storage, and proactive token
//! refresh ahead of expiry.

pub mod api;
pub mod auth;
pub mod config;
pub mod store;

pub use api::{ApiError, IdentityClient, IdentityProvider};
pub use auth::{SessionController, SessionRecord, SessionState};
pub use config::Config;
pub use store::{FileStore, MemoryStore, Scope, SessionStore};
