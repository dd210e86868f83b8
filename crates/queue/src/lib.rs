//! Delivery queue over Redis Streams.
//!
//! Submission and delivery are decoupled through a stream per payload kind.
//! `enqueue` blocks until Redis acknowledges the append; consumption runs in
//! a consumer group, so entries that were delivered but never acknowledged
//! are re-read after a restart. The contract is at least once, ordered
//! within a single stream.

pub mod consumer;
pub mod producer;
pub mod retry;

pub use consumer::QueueConsumer;
pub use producer::{DeliveryQueue, RedisQueue};
pub use retry::RetryPolicy;
