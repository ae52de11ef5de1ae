//! Multi-credential request distribution and failover
//!
//! Executes a batch of independent work items against a quota-limited
//! upstream using a pool of interchangeable credentials, retrying
//! quota-exhausted work on different credentials and surfacing permanent
//! failures immediately. The caller owns the business logic: it supplies
//! the items and an "execute one item with this credential" function, and
//! gets back one result per item in input order.
//!
//! Dispatch lifecycle:
//! 1. Caller builds a [`Dispatcher`] over a loaded [`keypool::CredentialPool`]
//! 2. Fewer items than credentials → one credential at a time, all items
//!    fanned out concurrently on it, failover on quota exhaustion
//! 3. At least as many items as credentials → items partitioned into
//!    contiguous chunks, one parallel task per (credential, chunk)
//! 4. Chunks that hit quota exhaustion retry on credentials that were never
//!    assigned a chunk; when none remain, their items fail as pool-exhausted
//! 5. Quota exhaustion and permanent failures fire best-effort notifications
//!    via [`Notifier`]; success is silent

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod notify;

pub use dispatcher::{Dispatcher, FailureReason, ItemResult, TerminalFailure};
pub use error::{Error, Result};
pub use notify::{NoopNotifier, Notifier, WebhookNotifier};
