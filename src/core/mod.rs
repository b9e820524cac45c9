//! Core utilities and common types for graft.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::ParamId;
