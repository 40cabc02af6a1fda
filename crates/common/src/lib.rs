//! Shared helpers used across portico crates.

pub mod error;
pub mod time;

pub use error::{ExternalError, format_error, format_error_value, format_panic};
