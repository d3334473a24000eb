//! lode-core: shared types, configuration schema, and error taxonomy for
//! the lodestore transfer layer.

pub mod config;
pub mod error;
pub mod types;

pub use error::{LodeError, LodeResult};
