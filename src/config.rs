//! Cache configuration model.
//!
//! A [`CacheConfiguration`] is the immutable snapshot a
//! [`CacheBuilder`](crate::builder::CacheBuilder) produces at its terminal
//! call. It combines four orthogonal axes:
//!
//! ```text
//!   ┌────────────────────────────────────────────────────────────────────┐
//!   │                     CacheConfiguration<K, V>                       │
//!   │                                                                    │
//!   │   eviction    Unbounded | MaxEntries(n) | MaxWeight(n, weigher)    │
//!   │   retention   { weak_keys, soft_values }                           │
//!   │   expiration  { after_write, after_access }                        │
//!   │   stats       on | off                                             │
//!   └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`CacheSpec`] is the declarative form of the same options, parsed from a
//! comma separated string such as `"maximumSize=100,softValues,recordStats"`.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//! use cachewright::config::CacheSpec;
//!
//! let spec: CacheSpec = "maximumSize=100, expireAfterWrite=10m, recordStats".parse().unwrap();
//! assert_eq!(spec.maximum_size, Some(100));
//! assert_eq!(spec.expire_after_write, Some(Duration::from_secs(600)));
//! assert!(spec.record_stats);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::weigher::Weigher;

// ---------------------------------------------------------------------------
// EvictionPolicy
// ---------------------------------------------------------------------------

/// Bound enforced after every write. The variants are mutually exclusive.
pub enum EvictionPolicy<K, V> {
    /// No bound; entries leave only through invalidation, expiry or reclamation.
    Unbounded,
    /// At most this many entries. `0` evicts every entry right after insert.
    MaxEntries(u64),
    /// Sum of entry weights at most `limit`.
    MaxWeight {
        limit: u64,
        weigher: Arc<dyn Weigher<K, V>>,
    },
}

impl<K, V> EvictionPolicy<K, V> {
    /// Returns the configured bound, in entries or weight units.
    pub fn limit(&self) -> Option<u64> {
        match self {
            Self::Unbounded => None,
            Self::MaxEntries(n) => Some(*n),
            Self::MaxWeight { limit, .. } => Some(*limit),
        }
    }

    pub fn is_weighted(&self) -> bool {
        matches!(self, Self::MaxWeight { .. })
    }

    /// Weight of an entry under this policy; `1` unless weight-bounded.
    pub(crate) fn weigh(&self, key: &K, value: &V) -> u64 {
        match self {
            Self::MaxWeight { weigher, .. } => weigher.weigh(key, value),
            _ => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unbounded => "unbounded",
            Self::MaxEntries(_) => "max-entries",
            Self::MaxWeight { .. } => "max-weight",
        }
    }
}

impl<K, V> Clone for EvictionPolicy<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Unbounded => Self::Unbounded,
            Self::MaxEntries(n) => Self::MaxEntries(*n),
            Self::MaxWeight { limit, weigher } => Self::MaxWeight {
                limit: *limit,
                weigher: Arc::clone(weigher),
            },
        }
    }
}

impl<K, V> fmt::Debug for EvictionPolicy<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("Unbounded"),
            Self::MaxEntries(n) => f.debug_tuple("MaxEntries").field(n).finish(),
            Self::MaxWeight { limit, .. } => f
                .debug_struct("MaxWeight")
                .field("limit", limit)
                .finish_non_exhaustive(),
        }
    }
}

// ---------------------------------------------------------------------------
// RetentionMode / Expiration
// ---------------------------------------------------------------------------

/// Reachability flags. Both combine freely with any eviction policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionMode {
    pub weak_keys: bool,
    pub soft_values: bool,
}

impl RetentionMode {
    /// `true` when neither flag is set; reclamation passes are then no-ops.
    pub fn is_strong(&self) -> bool {
        !self.weak_keys && !self.soft_values
    }
}

/// Memory-pressure signal driving a reclamation pass.
///
/// Rust has no collector to clear weak or soft references, so reclamation is
/// an explicit pass: [`Cache::reclaim`](crate::traits::Cache::reclaim).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemoryPressure {
    /// No pressure. Only weak-key reclamation runs.
    Low,
    /// Shrink soft-valued entries, least recently used first, until the
    /// weighted size is at most `retain_fraction` (clamped to `0.0..=1.0`)
    /// of what it was when the pass started.
    Shrink { retain_fraction: f64 },
    /// Drop every soft-valued entry.
    Critical,
}

impl MemoryPressure {
    /// Weighted size a soft pass must get down to, or `None` for no soft pass.
    pub(crate) fn soft_target(&self, weighted_size: u64) -> Option<u64> {
        match *self {
            Self::Low => None,
            Self::Shrink { retain_fraction } => {
                let fraction = if retain_fraction.is_nan() {
                    1.0
                } else {
                    retain_fraction.clamp(0.0, 1.0)
                };
                Some((weighted_size as f64 * fraction).floor() as u64)
            },
            Self::Critical => Some(0),
        }
    }
}

/// Time-based expiry. Either, both or neither duration may be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expiration {
    pub after_write: Option<Duration>,
    pub after_access: Option<Duration>,
}

impl Expiration {
    pub fn is_enabled(&self) -> bool {
        self.after_write.is_some() || self.after_access.is_some()
    }

    pub(crate) fn is_expired(
        &self,
        written_at: Instant,
        accessed_at: Instant,
        now: Instant,
    ) -> bool {
        let elapsed = |since: Instant| now.saturating_duration_since(since);
        self.after_write.is_some_and(|ttl| elapsed(written_at) >= ttl)
            || self.after_access.is_some_and(|tti| elapsed(accessed_at) >= tti)
    }
}

// ---------------------------------------------------------------------------
// CacheConfiguration
// ---------------------------------------------------------------------------

/// Immutable configuration owned by a built cache.
pub struct CacheConfiguration<K, V> {
    pub(crate) eviction: EvictionPolicy<K, V>,
    pub(crate) retention: RetentionMode,
    pub(crate) expiration: Expiration,
    pub(crate) stats_enabled: bool,
    pub(crate) initial_capacity: usize,
}

impl<K, V> CacheConfiguration<K, V> {
    pub fn eviction(&self) -> &EvictionPolicy<K, V> {
        &self.eviction
    }

    pub fn retention(&self) -> RetentionMode {
        self.retention
    }

    pub fn expiration(&self) -> Expiration {
        self.expiration
    }

    pub fn stats_enabled(&self) -> bool {
        self.stats_enabled
    }

    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }
}

impl<K, V> Clone for CacheConfiguration<K, V> {
    fn clone(&self) -> Self {
        Self {
            eviction: self.eviction.clone(),
            retention: self.retention,
            expiration: self.expiration,
            stats_enabled: self.stats_enabled,
            initial_capacity: self.initial_capacity,
        }
    }
}

impl<K, V> fmt::Debug for CacheConfiguration<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfiguration")
            .field("eviction", &self.eviction)
            .field("retention", &self.retention)
            .field("expiration", &self.expiration)
            .field("stats_enabled", &self.stats_enabled)
            .field("initial_capacity", &self.initial_capacity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CacheSpec
// ---------------------------------------------------------------------------

/// Declarative cache options, parsed from a comma separated string.
///
/// Recognized keys: `initialCapacity=<n>`, `maximumSize=<n>`,
/// `maximumWeight=<n>`, `expireAfterWrite=<duration>`,
/// `expireAfterAccess=<duration>`, and the flags `weakKeys`, `softValues`,
/// `recordStats`. Durations are an integer followed by `ms`, `s`, `m`, `h`
/// or `d`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct CacheSpec {
    pub initial_capacity: Option<u64>,
    pub maximum_size: Option<u64>,
    pub maximum_weight: Option<u64>,
    pub weak_keys: bool,
    pub soft_values: bool,
    pub record_stats: bool,
    pub expire_after_write: Option<Duration>,
    pub expire_after_access: Option<Duration>,
}

impl CacheSpec {
    /// Checks cross-field constraints that per-key parsing cannot see.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.maximum_size.is_some() && self.maximum_weight.is_some() {
            return Err(CacheError::invalid(
                "maximumSize and maximumWeight cannot be combined",
            ));
        }
        Ok(())
    }
}

fn parse_count(key: &str, raw: &str) -> Result<u64, CacheError> {
    let value: i64 = raw
        .parse()
        .map_err(|_| CacheError::invalid(format!("{key} requires an integer, got {raw:?}")))?;
    u64::try_from(value)
        .map_err(|_| CacheError::invalid(format!("{key} must not be negative, got {value}")))
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration, CacheError> {
    let split = raw
        .find(|c: char| !c.is_ascii_digit() && c != '-')
        .ok_or_else(|| CacheError::invalid(format!("{key} requires a time unit, got {raw:?}")))?;
    let (amount, unit) = raw.split_at(split);
    let amount = parse_count(key, amount)?;
    let secs = |mult: u64| Duration::from_secs(amount.saturating_mul(mult));
    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(secs(1)),
        "m" => Ok(secs(60)),
        "h" => Ok(secs(60 * 60)),
        "d" => Ok(secs(24 * 60 * 60)),
        other => Err(CacheError::invalid(format!(
            "{key} has unknown time unit {other:?}"
        ))),
    }
}

fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        return format!("{ms}ms");
    }
    let s = d.as_secs();
    match s {
        s if s != 0 && s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s != 0 && s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s != 0 && s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

impl FromStr for CacheSpec {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spec = CacheSpec::default();
        let mut seen = HashSet::new();

        for option in s.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = match option.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (option, None),
            };
            if !seen.insert(key.to_string()) {
                return Err(CacheError::invalid(format!("{key} was already set")));
            }

            let required = || {
                value.ok_or_else(|| CacheError::invalid(format!("{key} requires a value")))
            };
            let flag = || match value {
                None => Ok(true),
                Some(_) => Err(CacheError::invalid(format!("{key} does not take a value"))),
            };

            match key {
                "initialCapacity" => spec.initial_capacity = Some(parse_count(key, required()?)?),
                "maximumSize" => spec.maximum_size = Some(parse_count(key, required()?)?),
                "maximumWeight" => spec.maximum_weight = Some(parse_count(key, required()?)?),
                "expireAfterWrite" => {
                    spec.expire_after_write = Some(parse_duration(key, required()?)?)
                },
                "expireAfterAccess" => {
                    spec.expire_after_access = Some(parse_duration(key, required()?)?)
                },
                "weakKeys" => spec.weak_keys = flag()?,
                "softValues" => spec.soft_values = flag()?,
                "recordStats" => spec.record_stats = flag()?,
                unknown => {
                    return Err(CacheError::invalid(format!("unknown option {unknown:?}")));
                },
            }
        }

        spec.validate()?;
        Ok(spec)
    }
}

impl fmt::Display for CacheSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(n) = self.initial_capacity {
            parts.push(format!("initialCapacity={n}"));
        }
        if let Some(n) = self.maximum_size {
            parts.push(format!("maximumSize={n}"));
        }
        if let Some(n) = self.maximum_weight {
            parts.push(format!("maximumWeight={n}"));
        }
        if let Some(d) = self.expire_after_write {
            parts.push(format!("expireAfterWrite={}", format_duration(d)));
        }
        if let Some(d) = self.expire_after_access {
            parts.push(format!("expireAfterAccess={}", format_duration(d)));
        }
        if self.weak_keys {
            parts.push("weakKeys".to_string());
        }
        if self.soft_values {
            parts.push("softValues".to_string());
        }
        if self.record_stats {
            parts.push("recordStats".to_string());
        }
        f.write_str(&parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weigher::FnWeigher;

    #[test]
    fn eviction_policy_limits() {
        let unbounded: EvictionPolicy<u32, u32> = EvictionPolicy::Unbounded;
        assert_eq!(unbounded.limit(), None);
        assert_eq!(EvictionPolicy::<u32, u32>::MaxEntries(5).limit(), Some(5));

        let weighted: EvictionPolicy<u32, u32> = EvictionPolicy::MaxWeight {
            limit: 10,
            weigher: Arc::new(FnWeigher::new(|_: &u32, v: &u32| u64::from(*v))),
        };
        assert_eq!(weighted.limit(), Some(10));
        assert!(weighted.is_weighted());
        assert_eq!(weighted.weigh(&1, &7), 7);
        assert_eq!(unbounded.weigh(&1, &7), 1);
    }

    #[test]
    fn expiration_checks_both_clocks() {
        let start = Instant::now();
        let exp = Expiration {
            after_write: Some(Duration::from_secs(10)),
            after_access: Some(Duration::from_secs(2)),
        };
        assert!(!exp.is_expired(start, start, start + Duration::from_secs(1)));
        assert!(exp.is_expired(start, start, start + Duration::from_secs(2)));
        assert!(!exp.is_expired(
            start,
            start + Duration::from_secs(5),
            start + Duration::from_secs(6)
        ));
        assert!(exp.is_expired(
            start,
            start + Duration::from_secs(9),
            start + Duration::from_secs(10)
        ));
        assert!(!Expiration::default().is_expired(start, start, start + Duration::from_secs(99)));
    }

    #[test]
    fn memory_pressure_targets() {
        assert_eq!(MemoryPressure::Low.soft_target(100), None);
        assert_eq!(MemoryPressure::Critical.soft_target(100), Some(0));
        assert_eq!(
            MemoryPressure::Shrink { retain_fraction: 0.25 }.soft_target(10),
            Some(2)
        );
        assert_eq!(
            MemoryPressure::Shrink { retain_fraction: 4.0 }.soft_target(10),
            Some(10)
        );
        assert_eq!(
            MemoryPressure::Shrink { retain_fraction: f64::NAN }.soft_target(10),
            Some(10)
        );
    }

    #[test]
    fn spec_parses_all_keys() {
        let spec: CacheSpec = "initialCapacity=16, maximumWeight=1000, expireAfterAccess=250ms, \
                               expireAfterWrite=2h, weakKeys, softValues, recordStats"
            .parse()
            .unwrap();
        assert_eq!(spec.initial_capacity, Some(16));
        assert_eq!(spec.maximum_weight, Some(1000));
        assert_eq!(spec.maximum_size, None);
        assert_eq!(spec.expire_after_access, Some(Duration::from_millis(250)));
        assert_eq!(spec.expire_after_write, Some(Duration::from_secs(7200)));
        assert!(spec.weak_keys && spec.soft_values && spec.record_stats);
    }

    #[test]
    fn spec_rejects_negative_bound() {
        let err = "maximumSize=-1".parse::<CacheSpec>().unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfiguration(_)));
        assert!(err.message().contains("negative"));
    }

    #[test]
    fn spec_rejects_conflicts_and_duplicates() {
        for bad in [
            "maximumSize=1,maximumWeight=1",
            "maximumWeight=1,maximumSize=1",
            "maximumSize=1,maximumSize=2",
            "recordStats,recordStats",
            "weakKeys=true",
            "maximumSize",
            "expireAfterWrite=10",
            "expireAfterWrite=10w",
            "bogus",
        ] {
            assert!(
                matches!(
                    bad.parse::<CacheSpec>(),
                    Err(CacheError::InvalidConfiguration(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn spec_empty_string_is_default() {
        assert_eq!("".parse::<CacheSpec>().unwrap(), CacheSpec::default());
        assert_eq!(" , ".parse::<CacheSpec>().unwrap(), CacheSpec::default());
    }

    #[test]
    fn spec_display_reparses() {
        let text = "maximumSize=10,expireAfterWrite=90s,expireAfterAccess=3d,softValues";
        let spec: CacheSpec = text.parse().unwrap();
        let again: CacheSpec = spec.to_string().parse().unwrap();
        assert_eq!(spec, again);
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
    }
}
