//! Pool counters under arbitrary acquire/release sequences.

use gantry_core::ResourceConfig;
use gantry_resource::{ResourcePool, ResourceRequest, Ticket};
use indexmap::IndexMap;
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Acquire { memory_mb: u64, database: u32, http: u32 },
    Release(usize),
    ReleaseTwice(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..600, 0u32..4, 0u32..6).prop_map(|(memory_mb, database, http)| Op::Acquire {
            memory_mb,
            database,
            http
        }),
        any::<usize>().prop_map(Op::Release),
        any::<usize>().prop_map(Op::ReleaseTwice),
    ]
}

fn config() -> ResourceConfig {
    let mut connections = IndexMap::new();
    connections.insert("database".to_string(), 3);
    connections.insert("http".to_string(), 8);
    ResourceConfig {
        memory_max_mb: 1_500,
        workers_max: 4,
        connections,
        ..ResourceConfig::default()
    }
}

fn assert_consistent(pool: &ResourcePool, held: &[Ticket]) -> Result<(), TestCaseError> {
    let usage = pool.usage();
    let budget = &usage.budget;
    prop_assert!(budget.memory.used <= budget.memory.max);
    prop_assert!(budget.workers.used <= budget.workers.max);
    for gauge in budget.connections.values() {
        prop_assert!(gauge.used <= gauge.max);
    }

    let memory: u64 = held.iter().map(|t| t.reservation.memory_mb).sum();
    prop_assert_eq!(budget.memory.used, memory);
    prop_assert_eq!(budget.workers.used, held.len());
    for (name, gauge) in &budget.connections {
        let reserved: u32 = held
            .iter()
            .map(|t| t.reservation.connections.get(name).copied().unwrap_or(0))
            .sum();
        prop_assert_eq!(gauge.used, reserved);
    }
    prop_assert_eq!(usage.outstanding, held.len());
    Ok(())
}

proptest! {
    #[test]
    fn prop_counters_stay_within_budget(ops in prop::collection::vec(arb_op(), 1..80)) {
        let pool = ResourcePool::new(config());
        let mut held: Vec<Ticket> = Vec::new();

        for op in ops {
            match op {
                Op::Acquire { memory_mb, database, http } => {
                    let request = ResourceRequest::new(memory_mb)
                        .with_connection("database", database)
                        .with_connection("http", http);
                    if let Ok(ticket) = pool.acquire(request) {
                        held.push(ticket);
                    }
                }
                Op::Release(i) if !held.is_empty() => {
                    let ticket = held.remove(i % held.len());
                    prop_assert!(pool.release(&ticket));
                }
                Op::ReleaseTwice(i) if !held.is_empty() => {
                    let ticket = held.remove(i % held.len());
                    prop_assert!(pool.release(&ticket));
                    prop_assert!(!pool.release(&ticket));
                }
                _ => {}
            }
            assert_consistent(&pool, &held)?;
        }
    }
}

#[test]
fn test_concurrent_acquire_never_oversubscribes() {
    let pool = ResourcePool::new(ResourceConfig {
        memory_max_mb: 10_000,
        workers_max: 3,
        ..ResourceConfig::default()
    });
    let peak = Arc::new(parking_lot::Mutex::new(0usize));

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let pool = pool.clone();
            let peak = Arc::clone(&peak);
            scope.spawn(move || {
                for _ in 0..200 {
                    if let Ok(ticket) = pool.acquire(ResourceRequest::new(10)) {
                        let used = pool.usage().budget.workers.used;
                        let mut peak = peak.lock();
                        *peak = (*peak).max(used);
                        drop(peak);
                        pool.release(&ticket);
                    }
                }
            });
        }
    });

    assert!(*peak.lock() <= 3);
    assert_eq!(pool.usage().budget.workers.used, 0);
}
