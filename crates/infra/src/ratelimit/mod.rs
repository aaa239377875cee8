//! Token-bucket rate limiting per (subject, endpoint class).
//!
//! The limiter is a synchronous admission check made before a request reaches
//! business logic. Bucket state lives in a shared store (process memory, or
//! Redis behind the `redis` feature) and is only touched through an atomic
//! take.

pub mod bucket;
pub mod limiter;
#[cfg(feature = "redis")]
pub mod redis;
pub mod store;

pub use bucket::{BucketParams, BucketState, EndpointClass, TakeOutcome};
pub use limiter::{bucket_key, Decision, FailMode, RateLimits, TokenBucketLimiter};
#[cfg(feature = "redis")]
pub use self::redis::RedisBucketStore;
pub use store::{BucketStore, InMemoryBucketStore, LimiterStoreError, BUCKET_TTL};
