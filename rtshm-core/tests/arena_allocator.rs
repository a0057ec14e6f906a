//! Integration tests for the arena allocator.

use rtshm_core::RtshmError;
use rtshm_core::arena::{Arena, BLOCK_ALIGN, BLOCK_HEADER_SIZE, DATA_OFFSET};

mod common;

use common::{anonymous_arena, assert_accounting};

#[test]
fn fresh_arena_has_root_section_only() {
    let arena = anonymous_arena();
    let stats = arena.stats().unwrap();
    assert_eq!(stats.extent, arena.capacity() - DATA_OFFSET);
    assert_eq!(stats.free_blocks, 1);
    assert!(stats.allocated_bytes > 0);
    assert_accounting(&arena);
}

#[test]
fn accounting_holds_through_alloc_free_sequence() {
    let arena = anonymous_arena();
    let baseline = arena.stats().unwrap();

    let mut live = Vec::new();
    for round in 0..5usize {
        for i in 0..40usize {
            live.push(arena.allocate(1 + (i * 53 + round * 7) % 500).unwrap());
            assert_accounting(&arena);
        }
        // Free every other allocation to fragment the free list.
        let mut keep = Vec::new();
        for (i, off) in live.drain(..).enumerate() {
            if i % 2 == 0 {
                arena.free(off).unwrap();
                assert_accounting(&arena);
            } else {
                keep.push(off);
            }
        }
        live = keep;
    }

    for off in live.into_iter().rev() {
        arena.free(off).unwrap();
        assert_accounting(&arena);
    }

    assert_eq!(arena.stats().unwrap(), baseline);
}

#[test]
fn offsets_are_block_aligned_and_inside_extent() {
    let arena = anonymous_arena();
    for size in [0usize, 1, 15, 16, 17, 100, 1000] {
        let off = arena.allocate(size).unwrap();
        assert_eq!(off.as_u64() % BLOCK_ALIGN, 0);
        assert!(off.as_u64() >= DATA_OFFSET + BLOCK_HEADER_SIZE);
        assert!(off.as_u64() + size as u64 <= arena.capacity());
    }
}

#[test]
fn free_list_stays_address_ordered_and_coalesced() {
    let arena = anonymous_arena();
    let offs: Vec<_> = (0..8).map(|_| arena.allocate(48).unwrap()).collect();
    for off in offs.iter().step_by(2) {
        arena.free(*off).unwrap();
    }

    let blocks = arena.free_blocks().unwrap();
    for pair in blocks.windows(2) {
        // Ordered, and never touching (touching blocks would have merged).
        assert!(pair[0].offset.as_u64() + pair[0].size < pair[1].offset.as_u64());
    }

    for off in offs.iter().skip(1).step_by(2) {
        arena.free(*off).unwrap();
    }
    assert_eq!(arena.free_blocks().unwrap().len(), 1);
}

#[test]
fn exhaustion_is_recoverable() {
    let arena = Arena::anonymous(4096).unwrap();
    let mut live = Vec::new();
    let err = loop {
        match arena.allocate(256) {
            Ok(off) => live.push(off),
            Err(e) => break e,
        }
    };
    assert!(matches!(err, RtshmError::OutOfSpace { requested: 256, .. }));
    assert!(!err.is_fatal());

    arena.free(live.pop().unwrap()).unwrap();
    assert!(arena.allocate(256).is_ok());
    assert_accounting(&arena);
}

#[test]
fn double_free_is_reported() {
    let arena = anonymous_arena();
    let off = arena.allocate(24).unwrap();
    arena.free(off).unwrap();
    let err = arena.free(off).unwrap_err();
    assert_eq!(err.code(), "E005");
    assert_accounting(&arena);
}

#[test]
fn stats_serialize_to_json() {
    let arena = anonymous_arena();
    let json = serde_json::to_string(&arena.stats().unwrap()).unwrap();
    assert!(json.contains("\"free_bytes\""));
    assert!(json.contains("\"largest_free\""));
}
