//! Cache key derivation
//!
//! A wrapper derives one [`CacheKey`] per call, either by serializing the whole argument
//! tuple to JSON or by delegating to a caller-supplied resolver.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Identifier under which a call's result is stored
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key from any string-like value
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Serializes an argument list into its canonical key
    ///
    /// Argument lists that are structurally equal always produce the same key, and the
    /// key is sensitive to both argument order and argument values:
    /// `("a", 1)` becomes `["a",1]`.
    pub fn canonical<A: Serialize + ?Sized>(args: &A) -> Result<Self, serde_json::Error> {
        serde_json::to_string(args).map(Self)
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<&String> for CacheKey {
    fn from(key: &String) -> Self {
        Self(key.clone())
    }
}

macro_rules! impl_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for CacheKey {
                fn from(key: $ty) -> Self {
                    Self(key.to_string())
                }
            }
        )*
    };
}

impl_from_display!(char, bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

/// Resolver function that maps call arguments to a cache key
pub type ResolverFn<A> = Arc<dyn Fn(&A) -> CacheKey + Send + Sync>;

/// How a wrapper derives the cache key for a call
pub enum KeyStrategy<A> {
    /// Serialize the full argument list
    Canonical(fn(&A) -> Result<CacheKey, serde_json::Error>),
    /// Delegate to a caller-supplied resolver
    Resolver(ResolverFn<A>),
}

impl<A> KeyStrategy<A> {
    /// Keys calls by the JSON serialization of their arguments
    pub fn canonical() -> Self
    where
        A: Serialize,
    {
        Self::Canonical(CacheKey::canonical::<A>)
    }

    /// Keys calls by whatever `resolver` returns for their arguments
    pub fn resolver<F, K>(resolver: F) -> Self
    where
        F: Fn(&A) -> K + Send + Sync + 'static,
        K: Into<CacheKey>,
    {
        Self::Resolver(Arc::new(move |args: &A| resolver(args).into()))
    }

    /// Returns true if keys come from serializing the arguments
    pub fn is_canonical(&self) -> bool {
        matches!(self, Self::Canonical(_))
    }

    /// Derives the cache key for one call
    pub fn derive(&self, args: &A) -> Result<CacheKey, serde_json::Error> {
        match self {
            Self::Canonical(serialize) => serialize(args),
            Self::Resolver(resolver) => Ok(resolver(args)),
        }
    }
}

impl<A> Clone for KeyStrategy<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Canonical(serialize) => Self::Canonical(*serialize),
            Self::Resolver(resolver) => Self::Resolver(Arc::clone(resolver)),
        }
    }
}

impl<A> fmt::Debug for KeyStrategy<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canonical(_) => f.write_str("Canonical"),
            Self::Resolver(_) => f.write_str("Resolver"),
        }
    }
}
