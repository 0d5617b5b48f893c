//! Window backend trait for abstracting the counting strategy.

use std::time::Duration;

/// Outcome of one counted attempt, read under the same lock that counted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the attempt was refused
    pub is_limited: bool,
    /// Attempts left in the window after this one
    pub remaining: u32,
    /// Time until the window ends
    pub reset_in: Duration,
}

/// Trait for per-key counting backends.
///
/// The [`Limiter`](super::Limiter) only talks to this trait, so the
/// fixed-window [`WindowStore`](super::WindowStore) can be swapped for a
/// smoother strategy (e.g. a token bucket) without changing callers.
///
/// None of these operations fail: an unknown key is a fresh window.
pub trait WindowBackend: Send + Sync {
    /// Admit and count one attempt for `key`, or report it as limited,
    /// together with the window state right after the attempt.
    fn admit(&self, key: &str, limit: u32, window: Duration) -> Admission;

    /// Admit and count one attempt for `key`, or report it as limited.
    ///
    /// Returns `true` if the attempt is rate limited, `false` if it was admitted.
    fn test_and_increment(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.admit(key, limit, window).is_limited
    }

    /// Attempts left in the current window for `key`.
    fn remaining_attempts(&self, key: &str, limit: u32) -> u32;

    /// Time until the current window of `key` ends; zero if there is none.
    fn time_until_reset(&self, key: &str) -> Duration;

    /// Forget `key` entirely.
    fn clear(&self, key: &str);

    /// Drop expired entries, returning how many were removed.
    fn sweep(&self) -> usize;
}
