//! Constants and shared error types.

pub mod constants;
mod error;

pub use error::{ConfigError, Error};
