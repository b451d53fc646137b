//! Identity provider access.
//!
//! `IdentityProvider` is the seam the session controller and the refresh
//! scheduler talk to; `IdentityClient` implements it over HTTP.

pub mod client;
pub mod error;
pub mod provider;

pub use client::{Endpoints, IdentityClient};
pub use error::ApiError;
pub use provider::{AuthGrant, IdentityProvider, RefreshGrant};
