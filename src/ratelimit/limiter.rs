//! Core rate limiter implementation.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::backend::{Admission, WindowBackend};
use super::decision::Decision;
use super::key::LimitKey;
use super::policy::{Category, Policy, PolicyTable};
use super::store::WindowStore;
use crate::error::Result;

/// Maps action categories to policies and decides whether an attempt may proceed.
///
/// The limiter holds no counters of its own; it shares a backend with
/// every other limiter and the sweeper. Cloning is cheap.
pub struct Limiter<B: WindowBackend = WindowStore> {
    /// Per-key counters
    store: Arc<B>,
    /// Category policies, fixed at construction
    policies: PolicyTable,
}

impl<B: WindowBackend> Clone for Limiter<B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            policies: self.policies.clone(),
        }
    }
}

impl<B: WindowBackend> Limiter<B> {
    /// Create a limiter over `store` using the given policies.
    pub fn new(store: Arc<B>, policies: PolicyTable) -> Self {
        Self { store, policies }
    }

    /// Create a limiter over `store` using the built-in policies.
    pub fn with_defaults(store: Arc<B>) -> Self {
        Self::new(store, PolicyTable::default())
    }

    /// Count an attempt for `key` under `category` and report the outcome.
    ///
    /// Being over the limit is a normal `Ok` outcome. An error means the
    /// category has no policy, which is a configuration mistake.
    pub fn check(&self, key: &str, category: Category) -> Result<Decision> {
        let policy = self.policies.get(category)?;

        let Admission {
            is_limited,
            remaining,
            reset_in,
        } = self.store.admit(key, policy.limit, policy.window);

        trace!(
            key = %key,
            category = %category,
            remaining = remaining,
            "Checked rate limit"
        );

        if is_limited {
            debug!(
                key = %key,
                category = %category,
                limit = policy.limit,
                reset_in_secs = reset_in.as_secs(),
                "Rate limit exceeded"
            );
        }

        Ok(Decision {
            is_limited,
            remaining,
            limit: policy.limit,
            reset_in,
        })
    }

    /// [`Limiter::check`] for a structured key.
    pub fn check_key(&self, key: &LimitKey) -> Result<Decision> {
        self.check(&key.to_string_key(), key.category)
    }

    /// [`Limiter::check`] with the category given by name.
    pub fn check_named(&self, key: &str, category: &str) -> Result<Decision> {
        self.check(key, Category::from_str(category)?)
    }

    /// Forget all attempts for `key`, e.g. after a successful login.
    pub fn clear(&self, key: &str) {
        debug!(key = %key, "Clearing rate limit window");
        self.store.clear(key);
    }

    /// Attempts left for `key` without counting one.
    pub fn remaining(&self, key: &str, category: Category) -> Result<u32> {
        let policy = self.policies.get(category)?;
        Ok(self.store.remaining_attempts(key, policy.limit))
    }

    /// Time until the window of `key` ends.
    pub fn reset_in(&self, key: &str) -> Duration {
        self.store.time_until_reset(key)
    }

    /// The policy for a category.
    pub fn policy(&self, category: Category) -> Result<Policy> {
        self.policies.get(category)
    }

    /// The shared backend.
    pub fn store(&self) -> &Arc<B> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TurnstileError;
    use crate::ratelimit::clock::ManualClock;

    fn limiter_with_clock() -> (Limiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(WindowStore::with_clock(clock.clone()));
        (Limiter::with_defaults(store), clock)
    }

    #[test]
    fn test_fresh_key_is_admitted() {
        let (limiter, _clock) = limiter_with_clock();

        let decision = limiter.check("login:10.0.0.1", Category::Login).unwrap();

        assert!(!decision.is_limited);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.reset_in, Duration::from_secs(900));
    }

    #[test]
    fn test_login_scenario() {
        let (limiter, clock) = limiter_with_clock();
        let key = "login:1.2.3.4";

        for expected in [4, 3, 2, 1, 0] {
            let decision = limiter.check(key, Category::Login).unwrap();
            assert!(!decision.is_limited);
            assert_eq!(decision.remaining, expected);
        }

        let decision = limiter.check(key, Category::Login).unwrap();
        assert!(decision.is_limited);
        assert_eq!(decision.remaining, 0);

        clock.advance(Duration::from_secs(15 * 60 + 1));
        let decision = limiter.check(key, Category::Login).unwrap();
        assert!(!decision.is_limited);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_categories_share_store_but_not_keys() {
        let (limiter, _clock) = limiter_with_clock();

        limiter.check("login:a", Category::Login).unwrap();
        limiter.check("admin-action:a", Category::AdminAction).unwrap();

        assert_eq!(limiter.remaining("login:a", Category::Login).unwrap(), 4);
        assert_eq!(
            limiter.remaining("admin-action:a", Category::AdminAction).unwrap(),
            99
        );
        assert_eq!(limiter.store().len(), 2);
    }

    #[test]
    fn test_clear_resets_attempts() {
        let (limiter, _clock) = limiter_with_clock();

        for _ in 0..6 {
            limiter.check("login:x", Category::Login).unwrap();
        }
        limiter.clear("login:x");

        let decision = limiter.check("login:x", Category::Login).unwrap();
        assert!(!decision.is_limited);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_introspection_does_not_count() {
        let (limiter, clock) = limiter_with_clock();

        limiter.check("api:c", Category::ApiCall).unwrap();
        clock.advance(Duration::from_secs(20));

        assert_eq!(limiter.remaining("api:c", Category::ApiCall).unwrap(), 999);
        assert_eq!(limiter.remaining("api:c", Category::ApiCall).unwrap(), 999);
        assert_eq!(limiter.reset_in("api:c"), Duration::from_secs(40));
    }

    #[test]
    fn test_decisions_stay_consistent_while_clearing() {
        let limiter = Limiter::with_defaults(Arc::new(WindowStore::new()));
        let key = "login:race";

        std::thread::scope(|s| {
            let clearer = limiter.clone();
            s.spawn(move || {
                for _ in 0..2_000 {
                    clearer.clear(key);
                }
            });

            for _ in 0..4 {
                let checker = limiter.clone();
                s.spawn(move || {
                    for _ in 0..2_000 {
                        let decision = checker.check(key, Category::Login).unwrap();
                        assert!(decision.reset_in > Duration::ZERO);
                        if decision.is_limited {
                            assert_eq!(decision.remaining, 0);
                            assert_eq!(decision.used(), decision.limit);
                        } else {
                            assert!(decision.remaining < decision.limit);
                        }
                    }
                });
            }
        });
    }

    #[test]
    fn test_check_key_uses_category_prefix() {
        let (limiter, _clock) = limiter_with_clock();
        let key = LimitKey::new(Category::AdminAction, "ops");

        limiter.check_key(&key).unwrap();
        assert_eq!(
            limiter.remaining("admin-action:ops", Category::AdminAction).unwrap(),
            99
        );
    }

    #[test]
    fn test_unknown_category_is_reported() {
        let (limiter, _clock) = limiter_with_clock();

        let err = limiter.check_named("k", "bulk_import").unwrap_err();
        assert!(matches!(err, TurnstileError::UnknownCategory(_)));
        assert!(limiter.store().is_empty());
    }

    #[test]
    fn test_category_without_policy_is_reported() {
        let store = Arc::new(WindowStore::new());
        let policies = PolicyTable::empty()
            .with_policy(Category::Login, Category::Login.default_policy())
            .unwrap();
        let limiter = Limiter::new(store, policies);

        assert!(limiter.check("login:a", Category::Login).is_ok());
        assert!(matches!(
            limiter.check("api:a", Category::ApiCall),
            Err(TurnstileError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_limited_decision_builds_payload() {
        let (limiter, _clock) = limiter_with_clock();

        let decision = (0..6)
            .map(|_| limiter.check("login:p", Category::Login).unwrap())
            .last()
            .unwrap();
        let payload = decision.rejection_payload("Too many login attempts");

        assert_eq!(payload.used_attempts, Some(5));
        assert_eq!(payload.max_attempts, Some(5));
        assert_eq!(payload.retry_after, Some(900));
    }
}
