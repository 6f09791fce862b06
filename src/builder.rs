//! Cache builder.
//!
//! Collects a [`CacheConfiguration`] and produces one cache: a
//! [`ManualCache`] from [`build`](CacheBuilder::build), or a [`LoadingCache`]
//! from [`build_with_loader`](CacheBuilder::build_with_loader).
//!
//! Every option is checked when it is set, not when the cache is built:
//!
//! - `maximum_size` and `maximum_weight` exclude each other and are single use;
//!   the second call fails with [`CacheError::InvalidConfiguration`] whatever
//!   the order.
//! - `record_stats`, `weak_keys` and `soft_values` are flags; repeating them is
//!   harmless.
//! - after a successful terminal call every further call, configuration or
//!   terminal, fails with [`CacheError::IllegalBuilderState`].
//!
//! ## Example
//!
//! ```rust
//! use cachewright::prelude::*;
//!
//! let mut builder = CacheBuilder::<u64, Vec<u8>>::new();
//! builder
//!     .maximum_weight(1024, |_key: &u64, value: &Vec<u8>| value.len() as u64)?
//!     .record_stats()?;
//!
//! let cache = builder.build()?;
//! cache.put(1, vec![0; 600]);
//! cache.put(2, vec![0; 600]);
//! assert!(!cache.contains_key(&1));
//!
//! assert!(builder.build().is_err());
//! # Ok::<(), CacheError>(())
//! ```

use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{CacheConfiguration, CacheSpec, EvictionPolicy, Expiration, RetentionMode};
use crate::error::CacheError;
use crate::loading::LoadingCache;
use crate::manual::ManualCache;
use crate::weigher::{FnWeigher, Weigher};

/// Builder for [`ManualCache`] and [`LoadingCache`] instances.
pub struct CacheBuilder<K, V> {
    maximum_size: Option<u64>,
    maximum_weight: Option<u64>,
    weigher: Option<Arc<dyn Weigher<K, V>>>,
    retention: RetentionMode,
    expiration: Expiration,
    stats_enabled: bool,
    initial_capacity: Option<usize>,
    built: bool,
}

impl<K, V> CacheBuilder<K, V> {
    /// Unbounded, strongly retained, no stats.
    pub fn new() -> Self {
        Self {
            maximum_size: None,
            maximum_weight: None,
            weigher: None,
            retention: RetentionMode::default(),
            expiration: Expiration::default(),
            stats_enabled: false,
            initial_capacity: None,
            built: false,
        }
    }

    /// Starts a builder with the options of a parsed [`CacheSpec`].
    ///
    /// A spec with `maximumWeight` still needs a [`weigher`](Self::weigher)
    /// before the terminal call.
    ///
    /// ```
    /// use cachewright::prelude::*;
    ///
    /// let spec: CacheSpec = "maximumSize=2,recordStats".parse()?;
    /// let cache = CacheBuilder::<u32, u32>::from_spec(&spec)?.build()?;
    /// assert_eq!(cache.configuration().eviction().limit(), Some(2));
    /// assert!(cache.configuration().stats_enabled());
    /// # Ok::<(), CacheError>(())
    /// ```
    pub fn from_spec(spec: &CacheSpec) -> Result<Self, CacheError> {
        spec.validate()?;
        let mut builder = Self::new();
        builder.maximum_size = spec.maximum_size;
        builder.maximum_weight = spec.maximum_weight;
        builder.retention = RetentionMode {
            weak_keys: spec.weak_keys,
            soft_values: spec.soft_values,
        };
        builder.expiration = Expiration {
            after_write: spec.expire_after_write,
            after_access: spec.expire_after_access,
        };
        builder.stats_enabled = spec.record_stats;
        if let Some(capacity) = spec.initial_capacity {
            builder.initial_capacity = Some(usize::try_from(capacity).map_err(|_| {
                CacheError::invalid(format!("initialCapacity {capacity} does not fit in memory"))
            })?);
        }
        Ok(builder)
    }

    /// Parses `spec` and calls [`from_spec`](Self::from_spec).
    pub fn parse(spec: &str) -> Result<Self, CacheError> {
        Self::from_spec(&spec.parse()?)
    }

    /// Enables hit, miss, load and eviction counters.
    pub fn record_stats(&mut self) -> Result<&mut Self, CacheError> {
        self.ensure_configurable("record_stats")?;
        self.stats_enabled = true;
        Ok(self)
    }

    /// Bounds the cache to `n` entries, evicting least recently used first.
    pub fn maximum_size(&mut self, n: u64) -> Result<&mut Self, CacheError> {
        self.ensure_configurable("maximum_size")?;
        if let Some(limit) = self.maximum_weight {
            return Err(CacheError::invalid(format!(
                "maximum_size cannot be combined with maximum_weight (already set to {limit})"
            )));
        }
        if let Some(previous) = self.maximum_size {
            return Err(CacheError::invalid(format!(
                "maximum_size was already set to {previous}"
            )));
        }
        self.maximum_size = Some(n);
        Ok(self)
    }

    /// Bounds the summed weight of all entries to `n`.
    ///
    /// `weigher` is called once per write; its result is stored with the entry.
    pub fn maximum_weight<F>(&mut self, n: u64, weigher: F) -> Result<&mut Self, CacheError>
    where
        F: Fn(&K, &V) -> u64 + Send + Sync + 'static,
    {
        self.check_maximum_weight()?;
        self.check_weigher()?;
        self.maximum_weight = Some(n);
        self.weigher = Some(Arc::new(FnWeigher::new(weigher)));
        Ok(self)
    }

    /// Supplies the weigher for a weight bound that came from a [`CacheSpec`].
    pub fn weigher<W>(&mut self, weigher: W) -> Result<&mut Self, CacheError>
    where
        W: Weigher<K, V> + 'static,
    {
        self.ensure_configurable("weigher")?;
        self.check_weigher()?;
        self.weigher = Some(Arc::new(weigher));
        Ok(self)
    }

    /// Lets reclamation passes drop entries no caller holds a handle to.
    pub fn weak_keys(&mut self) -> Result<&mut Self, CacheError> {
        self.ensure_configurable("weak_keys")?;
        self.retention.weak_keys = true;
        Ok(self)
    }

    /// Lets reclamation passes drop least recently used entries under memory
    /// pressure.
    pub fn soft_values(&mut self) -> Result<&mut Self, CacheError> {
        self.ensure_configurable("soft_values")?;
        self.retention.soft_values = true;
        Ok(self)
    }

    /// Pre-sizes the backing map.
    pub fn initial_capacity(&mut self, n: usize) -> Result<&mut Self, CacheError> {
        self.ensure_configurable("initial_capacity")?;
        if let Some(previous) = self.initial_capacity {
            return Err(CacheError::invalid(format!(
                "initial_capacity was already set to {previous}"
            )));
        }
        self.initial_capacity = Some(n);
        Ok(self)
    }

    /// Expires an entry once `ttl` has passed since it was written.
    pub fn expire_after_write(&mut self, ttl: Duration) -> Result<&mut Self, CacheError> {
        self.ensure_configurable("expire_after_write")?;
        if let Some(previous) = self.expiration.after_write {
            return Err(CacheError::invalid(format!(
                "expire_after_write was already set to {previous:?}"
            )));
        }
        self.expiration.after_write = Some(ttl);
        Ok(self)
    }

    /// Expires an entry once `tti` has passed since it was last read or written.
    pub fn expire_after_access(&mut self, tti: Duration) -> Result<&mut Self, CacheError> {
        self.ensure_configurable("expire_after_access")?;
        if let Some(previous) = self.expiration.after_access {
            return Err(CacheError::invalid(format!(
                "expire_after_access was already set to {previous:?}"
            )));
        }
        self.expiration.after_access = Some(tti);
        Ok(self)
    }

    fn ensure_configurable(&self, option: &str) -> Result<(), CacheError> {
        if self.built {
            return Err(CacheError::illegal_state(format!(
                "{option} called after the cache was built"
            )));
        }
        Ok(())
    }

    fn check_maximum_weight(&self) -> Result<(), CacheError> {
        self.ensure_configurable("maximum_weight")?;
        if let Some(limit) = self.maximum_size {
            return Err(CacheError::invalid(format!(
                "maximum_weight cannot be combined with maximum_size (already set to {limit})"
            )));
        }
        if let Some(previous) = self.maximum_weight {
            return Err(CacheError::invalid(format!(
                "maximum_weight was already set to {previous}"
            )));
        }
        Ok(())
    }

    fn check_weigher(&self) -> Result<(), CacheError> {
        if self.weigher.is_some() {
            return Err(CacheError::invalid("a weigher was already set"));
        }
        Ok(())
    }

    /// Validates the accumulated options and marks the builder as used.
    fn finish(&mut self) -> Result<CacheConfiguration<K, V>, CacheError> {
        if self.built {
            return Err(CacheError::illegal_state("the cache was already built"));
        }

        let eviction = match (self.maximum_size, self.maximum_weight, &self.weigher) {
            (Some(_), Some(_), _) => {
                return Err(CacheError::invalid(
                    "maximum_size cannot be combined with maximum_weight",
                ));
            },
            (Some(_), None, Some(_)) | (None, None, Some(_)) => {
                return Err(CacheError::invalid("a weigher requires maximum_weight"));
            },
            (None, Some(_), None) => {
                return Err(CacheError::invalid("maximum_weight requires a weigher"));
            },
            (Some(n), None, None) => EvictionPolicy::MaxEntries(n),
            (None, Some(limit), Some(weigher)) => EvictionPolicy::MaxWeight {
                limit,
                weigher: Arc::clone(weigher),
            },
            (None, None, None) => EvictionPolicy::Unbounded,
        };

        self.built = true;
        let config = CacheConfiguration {
            eviction,
            retention: self.retention,
            expiration: self.expiration,
            stats_enabled: self.stats_enabled,
            initial_capacity: self.initial_capacity.unwrap_or(0),
        };
        debug!(
            eviction = config.eviction.as_str(),
            limit = ?config.eviction.limit(),
            weak_keys = config.retention.weak_keys,
            soft_values = config.retention.soft_values,
            expiring = config.expiration.is_enabled(),
            stats = config.stats_enabled,
            "building cache"
        );
        Ok(config)
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Builds a cache that the caller fills with `put`.
    pub fn build(&mut self) -> Result<ManualCache<K, V>, CacheError> {
        let config = self.finish()?;
        Ok(ManualCache::new(config))
    }

    /// Builds a cache that computes missing values with `loader`.
    ///
    /// At most one `loader` call per key runs at a time; its error is handed
    /// to every caller waiting on that key and is not cached.
    pub fn build_with_loader<E, F>(
        &mut self,
        loader: F,
    ) -> Result<LoadingCache<K, V, E>, CacheError>
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    {
        let config = self.finish()?;
        Ok(LoadingCache::new(config, Box::new(loader)))
    }

    /// Builds a loading cache around a loader that cannot fail.
    pub fn build_computing<F>(
        &mut self,
        loader: F,
    ) -> Result<LoadingCache<K, V, Infallible>, CacheError>
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        self.build_with_loader(move |key: &K| Ok(loader(key)))
    }
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for CacheBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("maximum_size", &self.maximum_size)
            .field("maximum_weight", &self.maximum_weight)
            .field("has_weigher", &self.weigher.is_some())
            .field("retention", &self.retention)
            .field("expiration", &self.expiration)
            .field("stats_enabled", &self.stats_enabled)
            .field("initial_capacity", &self.initial_capacity)
            .field("built", &self.built)
            .finish()
    }
}
