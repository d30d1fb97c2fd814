#![no_main]

//! Fuzz target for snapshot construction and lookup
//!
//! Builds a snapshot from an arbitrary key subset and bucket count, then
//! checks every lookup against a plain map.

use arbitrary::Arbitrary;
use dependency_realizer::{Accessor, AccessorSnapshot, Instance, ServiceKey};
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;
use std::sync::Arc;

const NAMES: [&str; 16] = [
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa", "lambda", "mu",
    "nu", "xi", "omicron", "pi",
];

#[derive(Debug, Arbitrary)]
struct Input {
    bucket_count: u16,
    entries: Vec<(u8, u32)>,
    lookups: Vec<u8>,
}

fn key(index: u8) -> ServiceKey {
    ServiceKey::definition(NAMES[index as usize % NAMES.len()])
}

fuzz_target!(|input: Input| {
    // Later entries shadow earlier ones, same as the snapshot
    let mut model: HashMap<ServiceKey, u32> = HashMap::new();
    let mut entries = Vec::with_capacity(input.entries.len());
    for (index, value) in input.entries {
        model.insert(key(index), value);
        let accessor: Accessor<()> = Arc::new(move |_: &()| Ok(Arc::new(value) as Instance));
        entries.push((key(index), accessor));
    }

    let snapshot = AccessorSnapshot::with_bucket_count(entries, input.bucket_count as usize);
    assert!(snapshot.bucket_count() >= 1);

    for index in input.lookups {
        let key = key(index);
        match (snapshot.get(&key), model.get(&key)) {
            (Some(accessor), Some(expected)) => {
                let instance = accessor(&()).unwrap();
                assert_eq!(*instance.downcast::<u32>().unwrap(), *expected);
            }
            (None, None) => {}
            (found, expected) => panic!("lookup mismatch for {}: {} vs {:?}", key, found.is_some(), expected),
        }
    }
});
