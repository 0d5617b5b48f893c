//! Rate limiting logic and state management.

mod backend;
mod clock;
mod decision;
mod key;
mod limiter;
mod policy;
mod store;
mod sweeper;

pub use backend::{Admission, WindowBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{Decision, RateLimitPayload};
pub use key::LimitKey;
pub use limiter::Limiter;
pub use policy::{Category, Policy, PolicyOverride, PolicyTable, MAX_WINDOW};
pub use store::{WindowEntry, WindowStore};
pub use sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL};
