//! Retry policy with exponential backoff.
//!
//! A `RetryPolicy` counts consecutive failed attempts. Each call to
//! `should_retry` either grants another attempt together with the delay to
//! wait first (`2^attempts * base_delay`), or refuses once the budget is
//! spent. `reset` is called after a successful fetch.
//!
//! Policies are injected into the fetcher through a `RetryRegistry`, which
//! either hands every texture the same policy or one policy per texture.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crate::config::{RetryScope, RETRY_BASE_DELAY, RETRY_MAX_ATTEMPTS};
use crate::texture::TextureKind;

/// Snapshot of a policy's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Retries granted since the last reset.
    pub attempt_count: u32,
    /// When the last retry was granted.
    pub last_attempt_time: Option<SystemTime>,
}

/// Consecutive-failure counter with capped exponential backoff.
///
/// All access goes through an internal mutex, so a policy can be shared by
/// concurrent fetches without losing increments.
#[derive(Debug)]
pub struct RetryPolicy {
    state: Mutex<RetryState>,
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy {
    /// Policy with the default budget (5 retries, 1 s base delay).
    pub fn new() -> Self {
        Self::with_limits(RETRY_MAX_ATTEMPTS, RETRY_BASE_DELAY)
    }

    pub fn with_limits(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            state: Mutex::new(RetryState::default()),
            max_attempts,
            base_delay,
        }
    }

    /// Grants another attempt, returning how long to wait before it.
    ///
    /// Returns `None` once `max_attempts` retries have been granted since the
    /// last `reset`.
    pub fn should_retry(&self) -> Option<Duration> {
        let mut state = self.lock();
        if state.attempt_count >= self.max_attempts {
            return None;
        }

        let multiplier = 2u32.saturating_pow(state.attempt_count);
        let delay = self.base_delay.saturating_mul(multiplier);
        state.attempt_count += 1;
        state.last_attempt_time = Some(SystemTime::now());
        Some(delay)
    }

    /// Clears the failure count after a successful fetch.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.attempt_count = 0;
        state.last_attempt_time = None;
    }

    pub fn state(&self) -> RetryState {
        self.lock().clone()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.lock().attempt_count >= self.max_attempts
    }

    // A panic while holding the lock cannot leave the counters half-updated,
    // so a poisoned mutex is still safe to use.
    fn lock(&self) -> MutexGuard<'_, RetryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Hands out retry policies according to the configured scope.
#[derive(Debug)]
pub struct RetryRegistry {
    scope: RetryScope,
    shared: Arc<RetryPolicy>,
    per_texture: Mutex<HashMap<TextureKind, Arc<RetryPolicy>>>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryRegistry {
    pub fn new(scope: RetryScope) -> Self {
        Self::with_limits(scope, RETRY_MAX_ATTEMPTS, RETRY_BASE_DELAY)
    }

    pub fn with_limits(scope: RetryScope, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            scope,
            shared: Arc::new(RetryPolicy::with_limits(max_attempts, base_delay)),
            per_texture: Mutex::new(HashMap::new()),
            max_attempts,
            base_delay,
        }
    }

    /// Wraps an existing policy as the shared one.
    pub fn from_shared(policy: Arc<RetryPolicy>) -> Self {
        let max_attempts = policy.max_attempts;
        let base_delay = policy.base_delay;
        Self {
            scope: RetryScope::Shared,
            shared: policy,
            per_texture: Mutex::new(HashMap::new()),
            max_attempts,
            base_delay,
        }
    }

    pub fn scope(&self) -> RetryScope {
        self.scope
    }

    /// The policy governing retries for `kind`.
    pub fn policy_for(&self, kind: TextureKind) -> Arc<RetryPolicy> {
        match self.scope {
            RetryScope::Shared => Arc::clone(&self.shared),
            RetryScope::PerTexture => {
                let mut policies = self
                    .per_texture
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                Arc::clone(policies.entry(kind).or_insert_with(|| {
                    Arc::new(RetryPolicy::with_limits(self.max_attempts, self.base_delay))
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_doubles_then_stops() {
        let policy = RetryPolicy::new();
        let delays: Vec<Option<Duration>> = (0..6).map(|_| policy.should_retry()).collect();

        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
                Some(Duration::from_secs(8)),
                Some(Duration::from_secs(16)),
                None,
            ]
        );
    }

    #[test]
    fn test_should_retry_stays_refused_until_reset() {
        let policy = RetryPolicy::new();
        while policy.should_retry().is_some() {}

        assert!(policy.is_exhausted());
        assert_eq!(policy.should_retry(), None);
        assert_eq!(policy.should_retry(), None);
        assert_eq!(policy.state().attempt_count, 5);
    }

    #[test]
    fn test_reset_restarts_at_one_second() {
        let policy = RetryPolicy::new();
        policy.should_retry();
        policy.should_retry();
        policy.reset();
        assert_eq!(policy.should_retry(), Some(Duration::from_secs(1)));

        while policy.should_retry().is_some() {}
        policy.reset();
        assert_eq!(policy.state(), RetryState::default());
        assert_eq!(policy.should_retry(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_should_retry_records_last_attempt_time() {
        let policy = RetryPolicy::new();
        assert!(policy.state().last_attempt_time.is_none());

        let before = SystemTime::now();
        policy.should_retry();
        let recorded = policy
            .state()
            .last_attempt_time
            .expect("retry should record a timestamp");
        assert!(recorded >= before);
    }

    #[test]
    fn test_custom_base_delay() {
        let policy = RetryPolicy::with_limits(3, Duration::from_millis(10));
        assert_eq!(policy.should_retry(), Some(Duration::from_millis(10)));
        assert_eq!(policy.should_retry(), Some(Duration::from_millis(20)));
        assert_eq!(policy.should_retry(), Some(Duration::from_millis(40)));
        assert_eq!(policy.should_retry(), None);
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let policy = RetryPolicy::with_limits(0, Duration::from_secs(1));
        assert_eq!(policy.should_retry(), None);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let policy = Arc::new(RetryPolicy::with_limits(1000, Duration::from_millis(1)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let policy = Arc::clone(&policy);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        policy.should_retry();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }
        assert_eq!(policy.state().attempt_count, 400);
    }

    #[test]
    fn test_registry_shared_scope_hands_out_one_policy() {
        let registry = RetryRegistry::new(RetryScope::Shared);
        let east = registry.policy_for(TextureKind::GoesEast);
        let west = registry.policy_for(TextureKind::GoesWest);

        assert!(Arc::ptr_eq(&east, &west));
        east.should_retry();
        assert_eq!(west.state().attempt_count, 1);
    }

    #[test]
    fn test_registry_per_texture_scope_isolates_policies() {
        let registry = RetryRegistry::new(RetryScope::PerTexture);
        let east = registry.policy_for(TextureKind::GoesEast);
        let west = registry.policy_for(TextureKind::GoesWest);

        assert!(!Arc::ptr_eq(&east, &west));
        assert!(Arc::ptr_eq(&east, &registry.policy_for(TextureKind::GoesEast)));
        while east.should_retry().is_some() {}
        assert_eq!(west.should_retry(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_registry_from_shared_uses_given_policy() {
        let policy = Arc::new(RetryPolicy::with_limits(2, Duration::from_millis(5)));
        let registry = RetryRegistry::from_shared(Arc::clone(&policy));
        assert_eq!(registry.scope(), RetryScope::Shared);
        assert!(Arc::ptr_eq(&policy, &registry.policy_for(TextureKind::GoesWest)));
    }
}
