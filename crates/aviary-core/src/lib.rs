//! Foundational low-level utilities shared across Aviary crates.
//!
//! Provides atomic file-write helpers and time utilities used by record
//! persistence and roster expiry calculations.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{is_expired, lease_expiry, now_utc};
