//! cachewright: bounded, concurrent in-process caches with single-flight loading.
//!
//! A [`CacheBuilder`](builder::CacheBuilder) produces one of two variants:
//!
//! - [`ManualCache`](manual::ManualCache): callers `put` values; a miss is `None`.
//! - [`LoadingCache`](loading::LoadingCache): a miss runs the loader, at most
//!   once per key at a time, and every concurrent caller gets its outcome.
//!
//! Both share the same engine: a hash index over a recency list, bounded by
//! entry count or by summed weight, with optional expiry, reference-based
//! reclamation and atomic statistics.
//!
//! ```
//! use cachewright::prelude::*;
//!
//! let users = CacheBuilder::<u64, String>::new()
//!     .maximum_size(1_000)?
//!     .record_stats()?
//!     .build_computing(|id| format!("user-{id}"))?;
//!
//! assert_eq!(users.get(&42).unwrap().as_str(), "user-42");
//! assert_eq!(users.stats().miss_count, 1);
//! # Ok::<(), CacheError>(())
//! ```

pub mod builder;
pub mod config;
pub(crate) mod core;
pub mod ds;
pub mod error;
pub(crate) mod flight;
pub mod loading;
pub mod manual;
pub mod prelude;
pub mod stats;
pub mod traits;
pub mod weigher;
