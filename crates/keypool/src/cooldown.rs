//! Short-lived memory of quota-exhausted credentials
//!
//! The pool itself is stateless across dispatch calls, so a credential that
//! exhausted its quota a moment ago would otherwise be retried immediately
//! by the next call. The tracker records exhaustion with a conservative TTL;
//! the dispatcher orders cooling credentials after available ones rather
//! than excluding them, so a fully-cooling pool still behaves like a fresh
//! one. One tracker per pool instance; there is no process-global state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::credential::Credential;

/// TTL-based cooldown map keyed by credential index.
#[derive(Debug)]
pub struct CooldownTracker {
    ttl: Duration,
    until: Mutex<HashMap<usize, Instant>>,
}

impl CooldownTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            until: Mutex::new(HashMap::new()),
        }
    }

    /// Record a quota exhaustion for `credential`, starting its cooldown.
    pub fn mark(&self, credential: &Credential) {
        let until = Instant::now() + self.ttl;
        debug!(
            credential = credential.index(),
            cooldown_secs = self.ttl.as_secs(),
            "credential entering cooldown"
        );
        self.until
            .lock()
            .expect("cooldown lock poisoned")
            .insert(credential.index(), until);
    }

    /// Whether `credential` is still inside its cooldown window.
    ///
    /// Expired entries are pruned on read; there is no background sweeper.
    pub fn is_cooling(&self, credential: &Credential) -> bool {
        let mut until = self.until.lock().expect("cooldown lock poisoned");
        match until.get(&credential.index()) {
            Some(deadline) if Instant::now() < *deadline => true,
            Some(_) => {
                until.remove(&credential.index());
                false
            }
            None => false,
        }
    }

    /// Number of credentials currently cooling.
    pub fn cooling_count(&self) -> usize {
        let now = Instant::now();
        let mut until = self.until.lock().expect("cooldown lock poisoned");
        until.retain(|_, deadline| now < *deadline);
        until.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(index: usize) -> Credential {
        Credential::new(index, format!("k{index}"))
    }

    #[test]
    fn unmarked_credential_is_not_cooling() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        assert!(!tracker.is_cooling(&credential(0)));
        assert_eq!(tracker.cooling_count(), 0);
    }

    #[test]
    fn marked_credential_cools_for_ttl() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        let cred = credential(1);
        tracker.mark(&cred);
        assert!(tracker.is_cooling(&cred));
        assert!(!tracker.is_cooling(&credential(2)));
        assert_eq!(tracker.cooling_count(), 1);
    }

    #[test]
    fn expired_cooldown_clears_on_read() {
        let tracker = CooldownTracker::new(Duration::from_millis(0));
        let cred = credential(0);
        tracker.mark(&cred);
        std::thread::sleep(Duration::from_millis(1));
        assert!(!tracker.is_cooling(&cred));
        assert_eq!(tracker.cooling_count(), 0);
    }

    #[test]
    fn re_mark_extends_cooldown() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        let cred = credential(4);
        tracker.mark(&cred);
        tracker.mark(&cred);
        assert!(tracker.is_cooling(&cred));
        assert_eq!(tracker.cooling_count(), 1);
    }
}
