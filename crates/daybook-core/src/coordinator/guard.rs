//! Saving guard
//!
//! Suppresses the change notifications that a locally initiated write echoes
//! back, so a write does not trigger a redundant reload of state we already
//! hold. Each write registers an in-flight token keyed by (scope, key); the
//! matching echo consumes the token and is dropped, any other event passes
//! through.
//!
//! Tokens expire after a fixed window in case the echo never arrives.
//! During that window an independent remote change to the same key is
//! indistinguishable from our own echo and is ignored; that is the accepted
//! trade-off of echo suppression.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::Scope;

#[derive(Debug)]
struct InflightWrite {
    scope: Scope,
    key: String,
    expires_at: Instant,
}

/// In-flight write token set
#[derive(Debug)]
pub struct SavingGuard {
    window: Duration,
    inflight: Mutex<Vec<InflightWrite>>,
}

impl SavingGuard {
    /// Create a guard whose tokens expire after `window`
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inflight: Mutex::new(Vec::new()),
        }
    }

    /// Register an in-flight write before issuing it
    pub fn begin(&self, scope: &Scope, key: &str) {
        let mut inflight = self.lock();
        inflight.push(InflightWrite {
            scope: scope.clone(),
            key: key.to_string(),
            expires_at: Instant::now() + self.window,
        });
    }

    /// Decide whether a change event is the echo of a local write
    ///
    /// A match consumes its token, so a second identical event passes
    /// through. Expired tokens never match.
    pub fn absorb(&self, scope: &Scope, key: &str) -> bool {
        let mut inflight = self.lock();
        let now = Instant::now();
        inflight.retain(|w| w.expires_at > now);

        match inflight
            .iter()
            .position(|w| w.scope == *scope && w.key == key)
        {
            Some(index) => {
                inflight.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of unexpired tokens currently registered
    pub fn pending(&self) -> usize {
        let mut inflight = self.lock();
        let now = Instant::now();
        inflight.retain(|w| w.expires_at > now);
        inflight.len()
    }

    /// Drop every token
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<InflightWrite>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::from("todos")
    }

    #[tokio::test]
    async fn test_echo_is_absorbed_once() {
        let guard = SavingGuard::new(Duration::from_millis(1500));
        guard.begin(&scope(), "1");

        assert!(guard.absorb(&scope(), "1"));
        // Token consumed: the identical event now passes through
        assert!(!guard.absorb(&scope(), "1"));
    }

    #[tokio::test]
    async fn test_unrelated_events_pass_through() {
        let guard = SavingGuard::new(Duration::from_millis(1500));
        guard.begin(&scope(), "1");

        assert!(!guard.absorb(&scope(), "2"));
        assert!(!guard.absorb(&Scope::from("stock"), "1"));
        assert_eq!(guard.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_expire_after_window() {
        let guard = SavingGuard::new(Duration::from_millis(1500));
        guard.begin(&scope(), "1");
        assert_eq!(guard.pending(), 1);

        tokio::time::advance(Duration::from_millis(1600)).await;

        assert_eq!(guard.pending(), 0);
        assert!(!guard.absorb(&scope(), "1"));
    }

    #[tokio::test]
    async fn test_one_token_per_write() {
        let guard = SavingGuard::new(Duration::from_millis(1500));
        guard.begin(&scope(), "1");
        guard.begin(&scope(), "1");

        assert!(guard.absorb(&scope(), "1"));
        assert!(guard.absorb(&scope(), "1"));
        assert!(!guard.absorb(&scope(), "1"));
    }

    #[tokio::test]
    async fn test_clear() {
        let guard = SavingGuard::new(Duration::from_millis(1500));
        guard.begin(&scope(), "1");
        guard.clear();
        assert_eq!(guard.pending(), 0);
    }
}
