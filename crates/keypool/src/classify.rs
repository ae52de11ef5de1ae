//! Failure classification for upstream errors
//!
//! Decides whether an upstream failure is the credential's fault (quota or
//! credit exhaustion, so retry the work on a different credential) or the
//! request's fault (permanent, so surface it immediately; retrying
//! elsewhere would just replay it). Misclassifying in either direction is a
//! correctness bug: a retried permanent failure burns the whole pool, and a
//! quota failure treated as permanent abandons work another credential could
//! have finished.

use std::fmt;

/// HTTP statuses that indicate the credential, not the request, is the
/// limiting factor.
const QUOTA_STATUSES: &[u16] = &[429, 403];

/// Message fragments that signal quota/credit exhaustion regardless of
/// status, matched case-insensitively against the stringified error.
const QUOTA_MARKERS: &[&str] = &["credit", "quota", "limit", "insufficient"];

/// Error reported by the caller's execute function.
///
/// Carries whatever the upstream gave us: an HTTP status when one exists,
/// and the error text. That is all the classifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(status: impl Into<Option<u16>>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "upstream error (status {status}): {}", self.message),
            None => write!(f, "upstream error: {}", self.message),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// How the dispatcher should react to an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The credential hit its quota; retry the work on a different one.
    QuotaExhausted,
    /// Intrinsic to the request; never retried on another credential.
    Permanent,
}

/// Classify an upstream error as quota exhaustion or a permanent failure.
///
/// Quota exhaustion is signalled by status 429 or 403, or by any of the
/// fixed quota vocabulary appearing in the message. Everything else is
/// permanent.
pub fn classify(error: &UpstreamError) -> FailureKind {
    if let Some(status) = error.status
        && QUOTA_STATUSES.contains(&status)
    {
        return FailureKind::QuotaExhausted;
    }
    let lower = error.message.to_lowercase();
    for marker in QUOTA_MARKERS {
        if lower.contains(marker) {
            return FailureKind::QuotaExhausted;
        }
    }
    FailureKind::Permanent
}
