//! Error types for the cachewright library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Returned by [`CacheBuilder`](crate::builder::CacheBuilder)
//!   configuration and terminal methods, and by [`CacheSpec`](crate::config::CacheSpec)
//!   parsing. Never produced by a cache after construction.
//! - [`LoadError`]: Returned by [`LoadingCache`](crate::loading::LoadingCache)
//!   reads when the loader fails. Every caller waiting on the same in-flight
//!   load receives a clone of the same error.
//!
//! ## Example Usage
//!
//! ```
//! use cachewright::builder::CacheBuilder;
//! use cachewright::error::CacheError;
//!
//! let mut builder = CacheBuilder::<u64, String>::new();
//! builder.maximum_size(100).unwrap();
//!
//! // Size and weight bounds are mutually exclusive
//! let err = builder.maximum_weight(10, |_: &u64, v: &String| v.len() as u64).unwrap_err();
//! assert!(matches!(err, CacheError::InvalidConfiguration(_)));
//! ```

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Error returned when a cache cannot be configured or built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A configuration value is out of range or conflicts with an earlier call.
    #[error("invalid cache configuration: {0}")]
    InvalidConfiguration(String),

    /// The builder was used after its terminal call.
    #[error("illegal builder state: {0}")]
    IllegalBuilderState(String),
}

impl CacheError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalBuilderState(msg.into())
    }

    /// Returns the error description without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidConfiguration(msg) | Self::IllegalBuilderState(msg) => msg,
        }
    }
}

// ---------------------------------------------------------------------------
// LoadError
// ---------------------------------------------------------------------------

/// Failure of a computing load.
///
/// The loader's own error is kept behind an `Arc` so that one failure can be
/// handed to every waiter of the same flight without requiring `E: Clone`.
pub enum LoadError<E> {
    /// The loader returned an error.
    Failed(Arc<E>),
    /// The thread running the loader panicked before producing a value.
    Panicked,
}

impl<E> LoadError<E> {
    /// Returns the loader's error, if the loader returned one.
    pub fn loader_error(&self) -> Option<&E> {
        match self {
            Self::Failed(err) => Some(err.as_ref()),
            Self::Panicked => None,
        }
    }

    /// Returns `true` if `self` and `other` carry the very same loader error.
    pub fn is_same_failure(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Failed(a), Self::Failed(b)) => Arc::ptr_eq(a, b),
            (Self::Panicked, Self::Panicked) => true,
            _ => false,
        }
    }
}

impl<E> Clone for LoadError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Failed(err) => Self::Failed(Arc::clone(err)),
            Self::Panicked => Self::Panicked,
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for LoadError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
            Self::Panicked => f.write_str("Panicked"),
        }
    }
}

impl<E: fmt::Display> fmt::Display for LoadError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "cache load failed: {err}"),
            Self::Panicked => f.write_str("cache load failed: loader panicked"),
        }
    }
}

impl<E> std::error::Error for LoadError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(err) => Some(err.as_ref()),
            Self::Panicked => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
