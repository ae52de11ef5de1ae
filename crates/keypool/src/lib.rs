//! Credential pool and failure classification for quota-limited upstreams
//!
//! Holds the leaf pieces the dispatcher is built on: an ordered, read-only
//! pool of interchangeable API credentials loaded from the environment, a
//! classifier that decides whether an upstream failure is the credential's
//! fault (quota) or the request's fault (permanent), and an optional
//! cooldown tracker remembering recently exhausted credentials.
//!
//! Credential lifecycle:
//! 1. Pool loaded once at startup from a comma-separated env var
//! 2. Dispatcher takes a shuffled copy per call; the pool itself never mutates
//! 3. Upstream returns 429/403 or a quota-vocabulary message → credential
//!    abandoned for this dispatch, optionally marked cooling
//! 4. Cooldown expires → credential ordered normally again

pub mod classify;
pub mod cooldown;
pub mod credential;
pub mod pool;

pub use classify::{FailureKind, UpstreamError, classify};
pub use cooldown::CooldownTracker;
pub use credential::Credential;
pub use pool::CredentialPool;
