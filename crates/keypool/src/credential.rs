//! A single upstream API credential

use common::Secret;

/// One opaque API token plus its load-time position in the pool.
///
/// Credentials are interchangeable; the index exists only for logging and
/// notification text and carries no priority. The token itself is held
/// behind [`Secret`] so Debug output stays clean.
#[derive(Debug, Clone)]
pub struct Credential {
    index: usize,
    token: Secret<String>,
}

impl Credential {
    pub(crate) fn new(index: usize, token: String) -> Self {
        Self {
            index,
            token: Secret::new(token),
        }
    }

    /// Position of this credential in the pool at load time.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The raw token, for building the upstream request.
    pub fn token(&self) -> &str {
        self.token.expose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let cred = Credential::new(3, "sk-secret-token".into());
        let debug = format!("{cred:?}");
        assert!(debug.contains('3'), "index should appear: {debug}");
        assert!(
            !debug.contains("sk-secret-token"),
            "token must be redacted: {debug}"
        );
    }

    #[test]
    fn accessors_round_trip() {
        let cred = Credential::new(0, "k1".into());
        assert_eq!(cred.index(), 0);
        assert_eq!(cred.token(), "k1");
    }
}
