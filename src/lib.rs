//! ttlmemo library
//!
//! Wraps functions with a result cache whose entries expire after a fixed timeout.
//!
//! ```no_run
//! use std::time::Duration;
//! use ttlmemo::memoize_fn;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let square = memoize_fn(|(n,): &(u64,)| n * n, Duration::from_secs(5));
//! assert_eq!(square.call((4,)), 16);
//! assert_eq!(square.call((4,)), 16); // served from the cache
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod demo;
pub mod memo;
pub mod scheduler;

pub use config::{ConfigError, MemoizeConfig};
pub use memo::{
    memoize, memoize_async, memoize_fn, memoize_on, memoize_with_resolver, Arg, CacheKey,
    CacheStats, KeyStrategy, MemoizeError, Memoized, MemoizedBuilder, SharedFuture,
};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
