//! Shared error definitions and context plumbing used across lantern crates.

pub mod error;

pub use error::{Error, FromMessage, Result};
