//! Common test utilities for integration tests.

#![allow(dead_code)]

use rtshm_core::arena::{Arena, ArenaConfig};
use tempfile::TempDir;

/// Capacity used by most integration tests.
pub const TEST_CAPACITY: u64 = 64 * 1024;

/// Create a file-backed arena config in a fresh temporary directory.
///
/// Keep the returned `TempDir` alive for as long as the region is used.
pub fn test_arena_config() -> (TempDir, ArenaConfig) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = ArenaConfig::default()
        .with_capacity(TEST_CAPACITY)
        .with_directory(dir.path());
    (dir, config)
}

/// Create a file-backed arena and a second handle attached to the same file.
pub fn creator_and_attacher() -> (TempDir, Arena, Arena) {
    let (dir, config) = test_arena_config();
    let creator = Arena::create(&config).expect("create arena");
    let attacher = Arena::attach(&config).expect("attach arena");
    (dir, creator, attacher)
}

/// Create a process-private arena for tests that need no backing file.
pub fn anonymous_arena() -> Arena {
    Arena::anonymous(TEST_CAPACITY).expect("create anonymous arena")
}

/// Assert the allocator accounting invariant.
pub fn assert_accounting(arena: &Arena) {
    let stats = arena.stats().expect("arena stats");
    assert_eq!(
        stats.free_bytes + stats.allocated_bytes,
        stats.extent,
        "free + allocated must cover the managed extent: {stats:?}"
    );
}
