//! Veilgate data plane
//!
//! HTTP service terminating client chat requests: authentication, rate
//! limiting, the security pipeline from `veilgate-core`, provider dispatch,
//! and the standard response envelope.

pub mod api;
pub mod auth;
pub mod envelope;
pub mod ratelimit;

pub use api::{build_app, AppState};
pub use ratelimit::RateLimiter;
