//! The delivery back end of the relay.
//!
//! Couples the durable queue to the upstream through rate-limited worker
//! loops: the [`Dispatcher`] leases due records, invokes a [`Transport`],
//! and applies the [`RetryPolicy`] to classified failures.

pub mod dispatcher;
pub mod error;
pub mod policy;
pub mod rate_limiter;
pub mod transport;

pub use dispatcher::{DeliveryConfig, Dispatcher};
pub use error::{DeliveryError, PermanentError, TemporaryError};
pub use policy::{Backoff, RetryDecision, RetryPolicy};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use transport::Transport;
