//! The outcome of a rate limit check and the rejection body derived from it.

use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

/// Result of [`Limiter::check`](super::Limiter::check).
///
/// `remaining` and `reset_in` reflect the state after the checked attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the attempt must be refused
    pub is_limited: bool,
    /// Attempts left in the current window
    pub remaining: u32,
    /// The policy limit the attempt was checked against
    pub limit: u32,
    /// Time until the current window ends
    #[serde(rename = "reset_in_ms", serialize_with = "serialize_millis")]
    pub reset_in: Duration,
}

impl Decision {
    /// Attempts used so far in the current window.
    pub fn used(&self) -> u32 {
        self.limit.saturating_sub(self.remaining)
    }

    /// Whole seconds a client should wait, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_in.as_secs() + u64::from(self.reset_in.subsec_nanos() > 0)
    }

    /// The body to send back with a "too many requests" response.
    pub fn rejection_payload(&self, message: impl Into<String>) -> RateLimitPayload {
        RateLimitPayload {
            message: Some(message.into()),
            used_attempts: Some(self.used()),
            max_attempts: Some(self.limit),
            retry_after: Some(self.retry_after_secs()),
        }
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Structured body of a rate limit rejection.
///
/// This is the wire contract between the service that enforces limits and
/// the client that reports them. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPayload {
    /// Human readable explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Attempts used in the current window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_attempts: Option<u32>,
    /// Attempts allowed per window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Seconds until the window resets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited(reset_in: Duration) -> Decision {
        Decision {
            is_limited: true,
            remaining: 0,
            limit: 5,
            reset_in,
        }
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(limited(Duration::from_secs(900)).retry_after_secs(), 900);
        assert_eq!(limited(Duration::from_millis(899_001)).retry_after_secs(), 900);
        assert_eq!(limited(Duration::ZERO).retry_after_secs(), 0);
    }

    #[test]
    fn test_rejection_payload_json() {
        let payload = limited(Duration::from_secs(900)).rejection_payload("Too many login attempts");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "message": "Too many login attempts",
                "usedAttempts": 5,
                "maxAttempts": 5,
                "retryAfter": 900
            })
        );
    }

    #[test]
    fn test_payload_tolerates_missing_fields() {
        let payload: RateLimitPayload = serde_json::from_str(r#"{"message":"slow down"}"#).unwrap();
        assert_eq!(payload.message.as_deref(), Some("slow down"));
        assert_eq!(payload.retry_after, None);
    }

    #[test]
    fn test_decision_serializes_millis() {
        let decision = Decision {
            is_limited: false,
            remaining: 4,
            limit: 5,
            reset_in: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(decision).unwrap();
        assert_eq!(json["reset_in_ms"], 1500);
        assert_eq!(json["remaining"], 4);
    }
}
