//! HTTP middleware and extractors.
//!
//! # Layer Order (outermost first, applied in `main`)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span with status and latency)
//!
//! Authentication is an extractor ([`auth::Authenticated`]) rather than a
//! layer, so public routes simply don't ask for it.

pub mod auth;

pub use auth::Authenticated;
