//! Client-side handling of rate limit rejections.
//!
//! Nothing here enforces limits. It turns a remote "too many requests"
//! answer into display state and paces background refreshes.

mod retry;
mod signal;

pub use retry::{refresh_with_retry, Refresh, RetryPolicy};
pub use signal::{
    should_warn, RateLimitSignal, Rejection, RejectionKind, SignalState, DEFAULT_MESSAGE,
};
