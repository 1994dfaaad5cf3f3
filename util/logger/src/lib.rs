//! Thin logging facade re-exporting the `log` crate's macros.
//!
//! Call sites depend on this crate rather than on `log` directly, so the
//! workspace can swap the backend (formatting, output targets, error
//! reporting) in one place without touching every crate that logs.
//! Wiring up an actual backend is left to the embedding application.

pub use log::{debug, error, info, log_enabled, trace, warn, Level, LevelFilter};
