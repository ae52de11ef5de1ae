//! Credential pool loading and shuffling
//!
//! The pool is an ordered, immutable list of credentials read once from a
//! single environment variable (comma-separated tokens, trimmed, empties
//! dropped). Nothing here tracks quota state: every dispatch call starts
//! from the full pool and takes its own shuffled copy, so the order seen by
//! one call never leaks into the next.

use rand::seq::SliceRandom;
use tracing::info;

use crate::credential::Credential;

/// Ordered, read-only set of interchangeable upstream credentials.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    /// Build a pool from explicit tokens.
    ///
    /// An empty token list is allowed here; the dispatcher rejects an empty
    /// pool at dispatch time as a configuration error.
    pub fn new(tokens: Vec<String>) -> Self {
        let credentials = tokens
            .into_iter()
            .enumerate()
            .map(|(index, token)| Credential::new(index, token))
            .collect::<Vec<_>>();
        info!(credentials = credentials.len(), "credential pool built");
        Self { credentials }
    }

    /// Load the pool from an environment variable holding a comma-separated
    /// token list.
    ///
    /// Tokens are trimmed and empty entries dropped, so `"k1, k2,,k3,"`
    /// yields three credentials. An unset variable or one that filters down
    /// to nothing is a configuration error; there is no point constructing
    /// a dispatcher that can never place a call.
    pub fn from_env(var: &str) -> common::Result<Self> {
        let raw = std::env::var(var)
            .map_err(|_| common::Error::Config(format!("{var} is unset")))?;
        let pool = Self::parse(&raw);
        if pool.is_empty() {
            return Err(common::Error::Config(format!(
                "{var} contains no credentials"
            )));
        }
        Ok(pool)
    }

    /// Split a raw comma-separated token list into a pool.
    pub fn parse(raw: &str) -> Self {
        let tokens = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect();
        Self::new(tokens)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.credentials.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }

    /// Randomly permuted copy of the credential list.
    ///
    /// Used once per dispatch so repeated calls don't always burn credential
    /// 0 first. Credentials keep their load-time index through the shuffle.
    pub fn shuffled(&self) -> Vec<Credential> {
        let mut copy = self.credentials.clone();
        copy.shuffle(&mut rand::rng());
        copy
    }
}
