pub use crate::builder::CacheBuilder;
pub use crate::config::{
    CacheConfiguration, CacheSpec, EvictionPolicy, Expiration, MemoryPressure, RetentionMode,
};
pub use crate::error::{CacheError, LoadError};
pub use crate::loading::LoadingCache;
pub use crate::manual::ManualCache;
pub use crate::stats::CacheStats;
pub use crate::traits::{Cache, ConcurrentCache};
pub use crate::weigher::{FnWeigher, UnitWeigher, Weigher};
