//! Example demonstrating single-flight loading.
//!
//! Run with: cargo run --example loading

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use cachewright::prelude::*;

#[derive(Debug)]
struct NotFound(u64);

impl std::fmt::Display for NotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user {} not found", self.0)
    }
}

impl std::error::Error for NotFound {}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== LoadingCache Example ===\n");

    let lookups = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&lookups);
    let users = CacheBuilder::<u64, String>::new()
        .maximum_size(1_000)?
        .record_stats()?
        .build_with_loader(move |id: &u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            if *id == 0 {
                Err(NotFound(*id))
            } else {
                Ok(format!("user-{id}"))
            }
        })?;

    // 1. Eight threads ask for the same missing key at once
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let users = users.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                users.get(&42)
            })
        })
        .collect();
    for handle in handles {
        let value = handle.join().map_err(|_| "worker panicked")??;
        println!("   got {value}");
    }
    println!("   loader calls: {}", lookups.load(Ordering::SeqCst));
    println!();

    // 2. Failures are returned, not cached
    match users.get(&0) {
        Ok(value) => println!("   unexpected {value}"),
        Err(err) => println!("   {err}"),
    }
    println!("   cached after failure? {}", users.contains_key(&0));
    println!();

    // 3. Refresh swaps in a new value
    let refreshed = users.refresh(&42)?;
    println!("   refreshed to {refreshed}");
    println!("   stats: {:?}", users.stats());

    Ok(())
}
