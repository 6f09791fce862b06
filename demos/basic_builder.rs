//! Example demonstrating the CacheBuilder options.
//!
//! Run with: cargo run --example basic_builder

use cachewright::prelude::*;

fn main() -> Result<(), CacheError> {
    println!("=== CacheBuilder Examples ===\n");

    // Example 1: size bound
    println!("1. maximum_size(3)");
    let lru = CacheBuilder::<u64, String>::new()
        .maximum_size(3)?
        .record_stats()?
        .build()?;

    lru.put(1, "one".to_string());
    lru.put(2, "two".to_string());
    lru.put(3, "three".to_string());

    // Access key 1 to make it MRU
    lru.get(&1);

    // Insert key 4, evicts LRU (key 2)
    lru.put(4, "four".to_string());

    println!("   contains 1? {} (was accessed)", lru.contains_key(&1));
    println!("   contains 2? {} (evicted as LRU)", lru.contains_key(&2));
    println!("   contains 4? {} (just inserted)", lru.contains_key(&4));
    println!("   stats: {:?}", lru.stats());
    println!();

    // Example 2: weight bound
    println!("2. maximum_weight(10) weighing by value length");
    let weighted = CacheBuilder::<&str, String>::new()
        .maximum_weight(10, |_, value: &String| value.len() as u64)?
        .build()?;

    weighted.put("short", "abc".to_string());
    weighted.put("long", "abcdefgh".to_string());

    println!("   contains short? {}", weighted.contains_key(&"short"));
    println!("   weighted size: {}", weighted.weighted_size());
    println!();

    // Example 3: conflicting bounds
    println!("3. maximum_size then maximum_weight");
    let mut builder = CacheBuilder::<u64, u64>::new();
    builder.maximum_size(10)?;
    match builder.maximum_weight(10, |_, _| 1) {
        Ok(_) => println!("   unexpectedly accepted"),
        Err(err) => println!("   rejected: {err}"),
    }
    println!();

    // Example 4: declarative spec and soft values
    println!("4. from a spec string");
    let soft = CacheBuilder::<u64, u64>::parse("maximumSize=100,softValues,recordStats")?.build()?;
    soft.put_all((0..100).map(|i| (i, i * i)));
    let reclaimed = soft.reclaim(MemoryPressure::Shrink {
        retain_fraction: 0.25,
    });
    println!("   reclaimed {reclaimed} of 100 under pressure, {} left", soft.len());

    // A second terminal call is rejected
    if let Err(err) = builder.build().and_then(|_| builder.build()) {
        println!("   second build rejected: {err}");
    }

    Ok(())
}
