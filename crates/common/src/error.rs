//! Shared error types

use thiserror::Error;

/// Errors surfaced while loading or validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result alias using the shared Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = Error::Config("API_KEYS is unset".into());
        assert_eq!(err.to_string(), "Configuration error: API_KEYS is unset");
    }

    #[test]
    fn error_debug_includes_variant() {
        let err = Error::Config("empty pool".into());
        let debug = format!("{:?}", err);
        assert!(
            debug.contains("Config"),
            "Debug should include variant name, got: {debug}"
        );
    }
}
