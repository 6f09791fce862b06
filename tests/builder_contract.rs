// ==============================================
// BUILDER CONTRACT TESTS (integration)
// ==============================================
//
// Error behaviour of CacheBuilder across option orderings and terminal calls.

use cachewright::prelude::*;

// ==============================================
// Mutually exclusive bounds
// ==============================================

mod exclusive_bounds {
    use super::*;

    #[test]
    fn size_then_weight_fails() {
        let mut builder = CacheBuilder::<String, String>::new();
        builder.maximum_size(5).unwrap();
        let err = builder
            .maximum_weight(5, |k: &String, v: &String| (k.len() + v.len()) as u64)
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfiguration(_)), "{err}");
    }

    #[test]
    fn weight_then_size_fails() {
        let mut builder = CacheBuilder::<String, String>::new();
        builder.maximum_weight(5, |_, _| 1).unwrap();
        let err = builder.maximum_size(5).unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfiguration(_)), "{err}");
    }

    #[test]
    fn rejected_call_leaves_first_bound_in_place() {
        let mut builder = CacheBuilder::<u32, u32>::new();
        builder.maximum_size(3).unwrap();
        assert!(builder.maximum_weight(100, |_, _| 1).is_err());

        let cache = builder.build().unwrap();
        assert!(matches!(
            cache.configuration().eviction(),
            EvictionPolicy::MaxEntries(3)
        ));
    }

    #[test]
    fn rejected_weight_bound_is_not_recorded() {
        let mut builder = CacheBuilder::<u32, u32>::new();
        builder.weigher(UnitWeigher).unwrap();
        assert!(builder.maximum_weight(5, |_, _| 1).is_err());

        let err = builder.build().unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfiguration(_)), "{err}");
    }

    #[test]
    fn spec_with_both_bounds_fails() {
        let err = "maximumSize=1,maximumWeight=1"
            .parse::<CacheSpec>()
            .and_then(|spec| CacheBuilder::<u32, u32>::from_spec(&spec))
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfiguration(_)));
    }

    #[test]
    fn negative_bound_from_spec_fails() {
        let err = CacheBuilder::<u32, u32>::parse("maximumSize=-1").unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfiguration(_)));
        assert!(err.message().contains("negative"), "{}", err.message());
    }
}

// ==============================================
// Single build
// ==============================================

mod single_build {
    use super::*;

    #[test]
    fn build_twice_fails() {
        let mut builder = CacheBuilder::<u32, u32>::new();
        builder.build().unwrap();
        let err = builder.build().unwrap_err();
        assert!(matches!(err, CacheError::IllegalBuilderState(_)), "{err}");
    }

    #[test]
    fn build_then_build_with_loader_fails() {
        let mut builder = CacheBuilder::<u32, u32>::new();
        builder.build().unwrap();
        let err = builder
            .build_with_loader(|k: &u32| Ok::<_, String>(*k))
            .unwrap_err();
        assert!(matches!(err, CacheError::IllegalBuilderState(_)));
    }

    #[test]
    fn build_with_loader_then_build_fails() {
        let mut builder = CacheBuilder::<u32, u32>::new();
        builder.build_computing(|k| *k).unwrap();
        assert!(matches!(
            builder.build(),
            Err(CacheError::IllegalBuilderState(_))
        ));
    }

    #[test]
    fn configuration_after_build_fails() {
        let mut builder = CacheBuilder::<u32, u32>::new();
        builder.build().unwrap();

        let results = [
            builder.record_stats().map(|_| ()),
            builder.maximum_size(1).map(|_| ()),
            builder.maximum_weight(1, |_, _| 1).map(|_| ()),
            builder.weak_keys().map(|_| ()),
            builder.soft_values().map(|_| ()),
        ];
        for result in results {
            assert!(matches!(result, Err(CacheError::IllegalBuilderState(_))));
        }
    }
}

// ==============================================
// Produced configuration
// ==============================================

mod produced_configuration {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_are_unbounded_and_strong() {
        let cache = CacheBuilder::<u32, u32>::default().build().unwrap();
        let config = cache.configuration();
        assert!(matches!(config.eviction(), EvictionPolicy::Unbounded));
        assert!(config.retention().is_strong());
        assert!(!config.stats_enabled());
        assert!(!config.expiration().is_enabled());
    }

    #[test]
    fn spec_round_trips_into_configuration() {
        let mut builder = CacheBuilder::<u32, u32>::parse(
            "maximumWeight=64,weakKeys,recordStats,expireAfterWrite=2m",
        )
        .unwrap();
        builder.weigher(FnWeigher::new(|_: &u32, v: &u32| u64::from(*v))).unwrap();

        let cache = builder.build().unwrap();
        let config = cache.configuration();
        assert_eq!(config.eviction().limit(), Some(64));
        assert_eq!(config.eviction().as_str(), "max-weight");
        assert!(config.retention().weak_keys);
        assert!(config.stats_enabled());
        assert_eq!(config.expiration().after_write, Some(Duration::from_secs(120)));
    }
}
