//! Construction errors for memoized wrappers

use thiserror::Error;

/// Errors raised while constructing a memoized wrapper
///
/// All variants are contract violations by the caller. They are reported when the
/// wrapper is built, never deferred to the first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoizeError {
    /// Neither a timeout nor a resolver was supplied after the function
    #[error("memoize function should have at least two given arguments")]
    MissingArguments,

    /// The value in the timeout position is not a number
    #[error("timeout must be a number")]
    InvalidTimeout,

    /// The value in the function position is not a function
    #[error("func must be a function")]
    FuncNotCallable,

    /// A resolver was supplied but it is not a function
    #[error("resolver must be a function")]
    ResolverNotCallable,
}
