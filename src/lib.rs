//! # Connection Throttler
//! Some applications fan many logical requests out across independent external connections - say, one per platform/account pair - where each connection carries its own request-rate budget. This crate throttles calls to arbitrary functions on a per-connection basis: each distinct connection key gets its own token-bucket rate limiter, and calls queued behind the limit are admitted in priority ("niceness") order, 0 being the most urgent, with FIFO ordering between equal priorities.
//!
//! # Example
//! Here, we build a registry, describe a connection allowed 10 requests per minute, and wrap a plain function so that every call goes through that connection's limiter. The first call finds a full token bucket and completes almost immediately.
//! ```
//! # use connection_throttler::{throttle, Connection, RateLimit, Registry};
//! # #[tokio::main]
//! # async fn main() {
//!     let registry = Registry::new();
//!     let conn = Connection {
//!         platform: "example".to_string(),
//!         connection_id: "conn1".to_string(),
//!         niceness: 1,
//!         rate_limit: RateLimit {
//!             request_count: 10,
//!             window_seconds: 60,
//!         },
//!     };
//!     let throttled = throttle(&registry, &conn, |name: &str| -> Result<String, String> {
//!         Ok(format!("Processed: {name}"))
//!     });
//!
//!     let outcome = throttled.call("test").await.unwrap();
//!     assert_eq!(outcome, Ok("Processed: test".to_string()));
//! # }
//! ```
//!
//! # Limitations
//! Rate limiting is per-process: nothing is shared across processes and no state survives a restart.
//!
//! A connection key's rate limit is fixed by the first connection seen for that key; see [`Registry::find_or_create`].

mod connection;
mod limiter;
mod queue;
mod registry;
mod throttle;
mod token_bucket;

pub use connection::{Connection, RateLimit};
pub use limiter::{ConnectionRateLimiter, ThrottleError};
pub use registry::Registry;
pub use throttle::{throttle, Throttled};
