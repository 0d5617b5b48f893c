//! Turning rate limit rejections into something a UI can show.

use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::ratelimit::RateLimitPayload;

/// Shown when a rejection carries no usable message.
pub const DEFAULT_MESSAGE: &str = "Too many requests. Please try again later.";

/// Warn once this few attempts are left.
const WARN_THRESHOLD: u32 = 2;

/// Longest retry-after we will try to render, about 68 years.
const MAX_RETRY_AFTER_SECS: u64 = i32::MAX as u64;

/// A failed remote call as seen by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// HTTP status code
    pub status: u16,
    /// Decoded response body, if any
    pub data: Option<serde_json::Value>,
}

impl Rejection {
    /// A rejection with a JSON body.
    pub fn new(status: u16, data: serde_json::Value) -> Self {
        Self {
            status,
            data: Some(data),
        }
    }

    /// A rejection with no body.
    pub fn status_only(status: u16) -> Self {
        Self { status, data: None }
    }
}

/// What a rejection means, decided once when it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionKind {
    /// 429; the payload is `None` when the body was missing or malformed
    RateLimited(Option<RateLimitPayload>),
    /// 404
    NotFound,
    /// Anything else
    Other,
}

impl RejectionKind {
    /// Classify a rejection by status and body.
    pub fn classify(rejection: &Rejection) -> Self {
        match rejection.status {
            429 => RejectionKind::RateLimited(
                rejection
                    .data
                    .as_ref()
                    .and_then(|data| serde_json::from_value(data.clone()).ok()),
            ),
            404 => RejectionKind::NotFound,
            _ => RejectionKind::Other,
        }
    }
}

/// UI-facing state for a rate limit rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSignal {
    pub is_limited: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Human readable reset time; `None` when unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_in: Option<String>,
}

impl RateLimitSignal {
    /// The signal when nothing is limited.
    pub fn not_limited() -> Self {
        Self::default()
    }
}

/// Holds the current rate limit signal for one view.
///
/// Reporting never fails: a rejection that can't be understood degrades to
/// the fallback message.
pub struct SignalState {
    fallback_message: String,
    signal: Mutex<RateLimitSignal>,
}

impl SignalState {
    /// Create a state that uses `fallback_message` when a rejection has none.
    pub fn new(fallback_message: impl Into<String>) -> Self {
        Self {
            fallback_message: fallback_message.into(),
            signal: Mutex::new(RateLimitSignal::not_limited()),
        }
    }

    /// Record a rejection, formatting the reset time against the local clock.
    pub fn handle(&self, rejection: &Rejection) -> RateLimitSignal {
        self.handle_at(rejection, Local::now())
    }

    /// Record a rejection, formatting the reset time relative to `now`.
    ///
    /// Rejections that are not rate limits leave the state untouched and
    /// return a not-limited signal.
    pub fn handle_at<Tz>(&self, rejection: &Rejection, now: DateTime<Tz>) -> RateLimitSignal
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let payload = match RejectionKind::classify(rejection) {
            RejectionKind::RateLimited(payload) => payload.unwrap_or_default(),
            _ => return RateLimitSignal::not_limited(),
        };

        let signal = RateLimitSignal {
            is_limited: true,
            message: payload
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.fallback_message.clone()),
            used_attempts: payload.used_attempts,
            max_attempts: payload.max_attempts,
            reset_in: payload.retry_after.and_then(|secs| format_reset(secs, now)),
        };

        debug!(
            used = ?signal.used_attempts,
            max = ?signal.max_attempts,
            reset_in = ?signal.reset_in,
            "Recorded rate limit rejection"
        );

        *self.signal.lock() = signal.clone();
        signal
    }

    /// Back to not limited.
    pub fn clear(&self) {
        *self.signal.lock() = RateLimitSignal::not_limited();
    }

    /// The current signal.
    pub fn current(&self) -> RateLimitSignal {
        self.signal.lock().clone()
    }

    /// Whether a rate limit is currently being reported.
    pub fn is_limited(&self) -> bool {
        self.signal.lock().is_limited
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE)
    }
}

/// Whether to warn the user before they run out of attempts.
///
/// Advisory only; it never blocks anything.
pub fn should_warn(remaining: u32, max: u32) -> bool {
    remaining <= WARN_THRESHOLD.min(max)
}

/// "in 15 minutes (at 14:05)" for a reset `retry_after` seconds past `now`.
fn format_reset<Tz>(retry_after: u64, now: DateTime<Tz>) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let secs = retry_after.min(MAX_RETRY_AFTER_SECS);
    let reset_at = now.checked_add_signed(chrono::Duration::seconds(secs as i64))?;

    let relative = if secs < 60 {
        plural(secs, "second")
    } else {
        plural(secs.div_ceil(60), "minute")
    };

    Some(format!("in {} (at {})", relative, reset_at.format("%H:%M")))
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}
