//! Common types shared across the dispatch workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
