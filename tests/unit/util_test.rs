//! Tests for utility functions

use rand::rngs::StdRng;
use rand::SeedableRng;
use reconcile_engine::core::{ObjectRecord, Observed, ResourceKey};
use reconcile_engine::util::{jitter, spread};
use std::time::Duration;

#[test]
fn test_resync_spread_bounds_every_jitter() {
    let max = spread(Duration::from_millis(1000), 10);
    assert_eq!(max, Duration::from_secs(10));

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..500 {
        assert!(jitter(max, &mut rng) < max);
    }
}

#[test]
fn test_spread_of_empty_store_is_zero() {
    let mut rng = StdRng::seed_from_u64(1);
    let max = spread(Duration::from_secs(1), 0);
    assert_eq!(jitter(max, &mut rng), Duration::ZERO);
}

#[test]
fn test_resource_key_from_tombstone_matches_live() {
    let live = ObjectRecord::new("storage", "vol-1");
    let tombstone = Observed::tombstone("storage/vol-1", live.clone());
    assert_eq!(
        ResourceKey::from_object(&tombstone),
        ResourceKey::from_object(&live)
    );
    assert_eq!(ResourceKey::from_object(&tombstone).to_string(), "storage/vol-1");
}

#[test]
fn test_resource_key_cluster_scoped_object() {
    let node = ObjectRecord::cluster_scoped("node-1");
    let key = ResourceKey::from_object(&node);
    assert_eq!(key.namespace(), None);
    assert_eq!(key.to_string(), "node-1");
    assert_eq!(ResourceKey::parse("node-1"), key);
}
