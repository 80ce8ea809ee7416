//! Foundational low-level utilities shared across dcx crates.
//!
//! Provides the atomic file-write helper used for session persistence and the
//! time helpers used by response envelopes and file metadata.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{
    current_rfc3339_timestamp, current_unix_timestamp_ms, system_time_to_rfc3339,
};
