//! Error types for dispatch operations

/// Errors that abort a dispatch before any upstream call is placed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Dispatch was attempted over an empty credential pool. This is a
    /// configuration problem, not a runtime retry condition.
    #[error("credential pool is empty")]
    EmptyPool,
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_display() {
        assert_eq!(Error::EmptyPool.to_string(), "credential pool is empty");
    }
}
