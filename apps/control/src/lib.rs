//! Veilgate control plane
//!
//! Owns authoritative per-user state: security rules, gateway configs, and
//! usage records. Exposes the small repository API the data plane consults.

pub mod api;

pub use api::{build_app, AppState};
