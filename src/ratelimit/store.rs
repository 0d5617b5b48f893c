//! Fixed-window counter store.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use super::backend::{Admission, WindowBackend};
use super::clock::{Clock, SystemClock};
use super::policy::MAX_WINDOW;

/// Usage of a single key within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// Attempts admitted in this window
    pub count: u32,
    /// When this window ends
    pub reset_at: Instant,
}

impl WindowEntry {
    /// A new window holding the attempt that opened it.
    ///
    /// Windows longer than [`MAX_WINDOW`] are cut down to it.
    fn open(now: Instant, window: Duration) -> Self {
        let window = window.min(MAX_WINDOW);
        Self {
            count: 1,
            reset_at: now.checked_add(window).unwrap_or(now),
        }
    }

    /// An expired entry counts as absent.
    fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_at
    }
}

/// Process-local store of per-key fixed windows.
///
/// Each key lives in one `DashMap` shard, and a test-and-increment holds
/// that shard's write lock for the whole read-modify-write. Updates to one
/// key are therefore serialized while unrelated keys proceed in parallel.
///
/// Counting is fixed-window: up to `2 * limit` attempts can pass in a short
/// span straddling a window boundary.
pub struct WindowStore {
    entries: DashMap<String, WindowEntry>,
    clock: Arc<dyn Clock>,
}

impl WindowStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Snapshot of the entry for `key`, expired or not.
    pub fn entry(&self, key: &str) -> Option<WindowEntry> {
        self.entries.get(key).map(|e| *e)
    }

    /// Number of tracked keys, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store tracks no keys at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowBackend for WindowStore {
    fn admit(&self, key: &str, limit: u32, window: Duration) -> Admission {
        let now = self.clock.now();

        let (is_limited, entry) = match self.entries.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                trace!(key = %key, "Opening window for new key");
                (false, *vacant.insert(WindowEntry::open(now, window)))
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let is_limited = if entry.is_expired(now) {
                    trace!(key = %key, "Window expired, opening a new one");
                    *entry = WindowEntry::open(now, window);
                    false
                } else if entry.count >= limit {
                    true
                } else {
                    entry.count += 1;
                    false
                };
                (is_limited, *entry)
            }
        };

        Admission {
            is_limited,
            remaining: limit.saturating_sub(entry.count),
            reset_in: entry.reset_at.saturating_duration_since(now),
        }
    }

    fn remaining_attempts(&self, key: &str, limit: u32) -> u32 {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => limit.saturating_sub(entry.count),
            _ => limit,
        }
    }

    fn time_until_reset(&self, key: &str) -> Duration {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|entry| entry.reset_at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    fn clear(&self, key: &str) {
        self.entries.remove(key);
    }

    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.reset_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}
