//! Positional construction
//!
//! [`memoize`] accepts its arguments the way a dynamic host would pass them: up to three
//! untyped positional values `(func, resolver, timeout)`. With exactly two values the
//! second one is the timeout and no resolver is used.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::error::MemoizeError;
use super::key::{CacheKey, KeyStrategy, ResolverFn};
use super::memoizer::{MemoFn, Memoized};
use crate::scheduler::{Scheduler, TokioScheduler};

/// One positional argument to [`memoize`]
pub enum Arg<A, R> {
    /// A function producing results
    Func(MemoFn<A, R>),
    /// A function producing cache keys
    Resolver(ResolverFn<A>),
    /// Any other value; `Value::Null` stands for an omitted argument
    Value(Value),
}

impl<A, R> Arg<A, R> {
    /// Wraps a function whose results should be memoized
    pub fn func<F>(func: F) -> Self
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        Self::Func(Arc::new(func))
    }

    /// Wraps a resolver that derives the cache key
    pub fn resolver<F, K>(resolver: F) -> Self
    where
        F: Fn(&A) -> K + Send + Sync + 'static,
        K: Into<CacheKey>,
    {
        Self::Resolver(Arc::new(move |args: &A| resolver(args).into()))
    }

    /// An explicitly omitted argument
    pub fn null() -> Self {
        Self::Value(Value::Null)
    }

    fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Func(_) => "func",
            Self::Resolver(_) => "resolver",
            Self::Value(_) => "value",
        }
    }
}

impl<A, R> From<Value> for Arg<A, R> {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

macro_rules! impl_from_value {
    ($($ty:ty),*) => {
        $(
            impl<A, R> From<$ty> for Arg<A, R> {
                fn from(value: $ty) -> Self {
                    Self::Value(Value::from(value))
                }
            }
        )*
    };
}

impl_from_value!(i32, i64, u32, u64, f64, bool, &str, String);

/// Converts a raw timeout in milliseconds into a duration
///
/// Any JSON number is accepted; negative values mean "expire immediately". Everything
/// else is rejected with [`MemoizeError::InvalidTimeout`].
pub fn timeout_from_value(value: &Value) -> Result<Duration, MemoizeError> {
    let Value::Number(number) = value else {
        return Err(MemoizeError::InvalidTimeout);
    };

    if let Some(millis) = number.as_u64() {
        return Ok(Duration::from_millis(millis));
    }

    match number.as_f64() {
        Some(millis) if millis.is_finite() => {
            Ok(Duration::from_nanos((millis.max(0.0) * 1_000_000.0).round() as u64))
        }
        _ => Err(MemoizeError::InvalidTimeout),
    }
}

/// Builds a memoized wrapper from positional arguments `(func, resolver?, timeout)`
///
/// Missing trailing arguments count as omitted. Checks run in this order:
///
/// * no timeout and no resolver: [`MemoizeError::MissingArguments`]
/// * no timeout: the resolver position is taken as the timeout
/// * timeout is not a number: [`MemoizeError::InvalidTimeout`]
/// * func is not a function: [`MemoizeError::FuncNotCallable`]
/// * resolver is neither omitted nor a resolver: [`MemoizeError::ResolverNotCallable`]
///
/// Arguments past the third are ignored.
pub fn memoize<A, R>(args: Vec<Arg<A, R>>) -> Result<Memoized<A, R>, MemoizeError>
where
    A: Serialize,
    R: Clone + Send + 'static,
{
    memoize_on(args, TokioScheduler)
}

/// Same as [`memoize`], running expiry actions on `scheduler`
pub fn memoize_on<A, R, S>(
    args: Vec<Arg<A, R>>,
    scheduler: S,
) -> Result<Memoized<A, R>, MemoizeError>
where
    A: Serialize,
    R: Clone + Send + 'static,
    S: Scheduler + 'static,
{
    let mut args = args.into_iter();
    let func = args.next().unwrap_or_else(Arg::null);
    let mut resolver = args.next().unwrap_or_else(Arg::null);
    let mut timeout = args.next().unwrap_or_else(Arg::null);

    let extra = args.count();
    if extra > 0 {
        debug!(extra, "ignoring extra memoize arguments");
    }

    if timeout.is_null() {
        if resolver.is_null() {
            return Err(MemoizeError::MissingArguments);
        }
        timeout = std::mem::replace(&mut resolver, Arg::null());
    }

    let timeout = match &timeout {
        Arg::Value(value) => timeout_from_value(value)?,
        _ => return Err(MemoizeError::InvalidTimeout),
    };

    let func = match func {
        Arg::Func(func) => func,
        _ => return Err(MemoizeError::FuncNotCallable),
    };

    let keys = match resolver {
        Arg::Resolver(resolver) => KeyStrategy::Resolver(resolver),
        Arg::Value(Value::Null) => KeyStrategy::canonical(),
        other => {
            debug!(kind = other.kind(), "resolver position holds a non-resolver");
            return Err(MemoizeError::ResolverNotCallable);
        }
    };

    Ok(Memoized::from_parts(func, keys, timeout, Arc::new(scheduler)))
}
