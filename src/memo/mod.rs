//! Function memoization with per-entry expiry
//!
//! This module wraps a function so that its results are cached by call arguments (or by
//! a key derived from them) and every cached result is dropped again after a fixed
//! timeout. Each wrapper owns its cache; two wrappers never see each other's entries.

mod args;
mod error;
mod key;
mod memoizer;

pub use args::{memoize, memoize_on, timeout_from_value, Arg};
pub use error::MemoizeError;
pub use key::{CacheKey, KeyStrategy, ResolverFn};
pub use memoizer::{
    memoize_async, memoize_fn, memoize_with_resolver, shared_computation, CacheStats, MemoFn,
    Memoized, MemoizedBuilder, SharedFuture,
};
