//! Turnstile - Process-local Rate Limiting
//!
//! This crate caps how often an action identified by a key (a login from an
//! address, an admin mutation by a user, an API call by a client) may happen
//! within a fixed time window. Counters live in memory and are shared by
//! reference; there is no cross-process coordination and nothing survives a
//! restart.
//!
//! The [`client`] module covers the other side of the wire: turning a
//! "too many requests" rejection into state a UI can render.

pub mod client;
pub mod config;
pub mod error;
pub mod ratelimit;
