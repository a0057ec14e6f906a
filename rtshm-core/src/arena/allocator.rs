//! Free-list allocator over the managed extent.
//!
//! Every block starts with a 16-byte header:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┬──────────────────────┐
//! │ link (u64)           │ size (u64)           │ usable bytes ...     │
//! └──────────────────────┴──────────────────────┴──────────────────────┘
//! ```
//!
//! `size` covers the whole block including its header. A free block's link is
//! the offset of the next free block (null terminates the list); an allocated
//! block's link holds [`IN_USE`]. The free list is kept in address order so
//! that freeing can merge a block with both neighbours.
//!
//! All functions here take an [`ArenaGuard`]: callers must hold the arena
//! mutex for the whole operation.

use super::header::{ALLOCATED_FIELD, CAPACITY_FIELD, DATA_OFFSET, FREE_HEAD_FIELD};
use super::lock::ArenaGuard;
use super::mapping::Mapping;
use crate::error::{Result, RtshmError};
use crate::types::ArenaOffset;
use serde::Serialize;

/// Block size granularity and alignment of every returned offset.
pub const BLOCK_ALIGN: u64 = 16;

/// Size of the per-block header.
pub const BLOCK_HEADER_SIZE: u64 = 16;

/// Smallest block worth keeping on the free list.
const MIN_BLOCK: u64 = BLOCK_HEADER_SIZE + BLOCK_ALIGN;

/// Link value of an allocated block. Never a valid offset.
const IN_USE: u64 = 0xA110_CA7E_D000_B10C;

const LINK: u64 = 0;
const SIZE: u64 = 8;

/// A block on the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreeBlock {
    /// Offset of the block header.
    pub offset: ArenaOffset,
    /// Size of the block including its header.
    pub size: u64,
}

/// Allocator accounting snapshot.
///
/// `free_bytes + allocated_bytes == extent` holds whenever the arena mutex
/// is not held by a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    /// Size of the managed extent.
    pub extent: u64,
    /// Bytes in free blocks, headers included.
    pub free_bytes: u64,
    /// Bytes in allocated blocks, headers included.
    pub allocated_bytes: u64,
    /// Number of blocks on the free list.
    pub free_blocks: usize,
    /// Usable size of the largest free block.
    pub largest_free: u64,
}

fn corruption(offset: u64, cause: impl Into<String>) -> RtshmError {
    let cause = cause.into();
    tracing::error!(offset = %ArenaOffset::new(offset), %cause, "Arena corruption detected");
    RtshmError::ArenaCorruption {
        offset: ArenaOffset::new(offset),
        cause,
    }
}

/// End of the managed extent (exclusive).
fn extent_end(mapping: &Mapping) -> Result<u64> {
    let capacity = mapping.load_u64(CAPACITY_FIELD)?;
    if capacity <= DATA_OFFSET || capacity > mapping.len() as u64 {
        return Err(corruption(CAPACITY_FIELD.as_u64(), "capacity field out of range"));
    }
    Ok(DATA_OFFSET + (capacity - DATA_OFFSET) / BLOCK_ALIGN * BLOCK_ALIGN)
}

fn word(mapping: &Mapping, block: u64, field: u64) -> Result<u64> {
    mapping.load_u64(ArenaOffset::new(block + field))
}

fn set_word(mapping: &Mapping, block: u64, field: u64, value: u64) -> Result<()> {
    mapping.store_u64(ArenaOffset::new(block + field), value)
}

/// Read and validate the size of the block at `block`.
fn block_size(mapping: &Mapping, block: u64, end: u64) -> Result<u64> {
    if block < DATA_OFFSET || block >= end || block % BLOCK_ALIGN != 0 {
        return Err(corruption(block, "block outside managed extent"));
    }
    let size = word(mapping, block, SIZE)?;
    if size < MIN_BLOCK || size % BLOCK_ALIGN != 0 || size > end - block {
        return Err(corruption(
            block,
            format!("block size {} overruns extent ending at {:#x}", size, end),
        ));
    }
    Ok(size)
}

/// Read the successor of free block `block` and check list ordering.
fn next_free(mapping: &Mapping, block: u64, size: u64) -> Result<u64> {
    let next = word(mapping, block, LINK)?;
    if next != 0 && next < block + size {
        return Err(corruption(block, format!("free list out of order (next {:#x})", next)));
    }
    Ok(next)
}

/// Point `prev`'s link (or the list head when `prev` is 0) at `target`.
fn relink(mapping: &Mapping, prev: u64, target: u64) -> Result<()> {
    if prev == 0 {
        mapping.store_u64(FREE_HEAD_FIELD, target)
    } else {
        set_word(mapping, prev, LINK, target)
    }
}

fn add_allocated(mapping: &Mapping, delta: i64) -> Result<()> {
    let current = mapping.load_u64(ALLOCATED_FIELD)?;
    mapping.store_u64(ALLOCATED_FIELD, current.wrapping_add_signed(delta))
}

/// Lay a single free block over the whole managed extent.
pub(crate) fn format(guard: &ArenaGuard<'_>) -> Result<u64> {
    let mapping = guard.mapping();
    let end = extent_end(mapping)?;
    let extent = end - DATA_OFFSET;
    if extent < MIN_BLOCK {
        return Err(RtshmError::OutOfSpace {
            requested: MIN_BLOCK,
            largest_free: 0,
        });
    }
    set_word(mapping, DATA_OFFSET, LINK, 0)?;
    set_word(mapping, DATA_OFFSET, SIZE, extent)?;
    mapping.store_u64(FREE_HEAD_FIELD, DATA_OFFSET)?;
    mapping.store_u64(ALLOCATED_FIELD, 0)?;
    Ok(extent)
}

/// Allocate `size` zeroed bytes and return the offset of the usable region.
///
/// First fit; a block is split when the remainder can still form a block.
pub(crate) fn allocate(guard: &ArenaGuard<'_>, size: usize) -> Result<ArenaOffset> {
    let mapping = guard.mapping();
    let end = extent_end(mapping)?;

    let need = (size as u64)
        .checked_add(BLOCK_HEADER_SIZE + BLOCK_ALIGN - 1)
        .map(|n| (n / BLOCK_ALIGN * BLOCK_ALIGN).max(MIN_BLOCK))
        .filter(|&n| n <= end - DATA_OFFSET);

    let mut largest = 0u64;
    let mut prev = 0u64;
    let mut cur = mapping.load_u64(FREE_HEAD_FIELD)?;

    while cur != 0 {
        let block = block_size(mapping, cur, end)?;
        let next = next_free(mapping, cur, block)?;

        if let Some(need) = need.filter(|&n| n <= block) {
            let taken = if block - need >= MIN_BLOCK {
                let rest = cur + need;
                set_word(mapping, rest, SIZE, block - need)?;
                set_word(mapping, rest, LINK, next)?;
                relink(mapping, prev, rest)?;
                set_word(mapping, cur, SIZE, need)?;
                need
            } else {
                relink(mapping, prev, next)?;
                block
            };
            set_word(mapping, cur, LINK, IN_USE)?;
            add_allocated(mapping, taken as i64)?;

            let offset = ArenaOffset::new(cur + BLOCK_HEADER_SIZE);
            mapping.zero(offset, (taken - BLOCK_HEADER_SIZE) as usize)?;
            tracing::debug!(%offset, size, block = taken, "Allocated block");
            return Ok(offset);
        }

        largest = largest.max(block - BLOCK_HEADER_SIZE);
        prev = cur;
        cur = next;
    }

    tracing::debug!(size, largest_free = largest, "Allocation failed");
    Err(RtshmError::OutOfSpace {
        requested: size as u64,
        largest_free: largest,
    })
}

/// Return the block whose usable region starts at `offset` to the free list.
pub(crate) fn free(guard: &ArenaGuard<'_>, offset: ArenaOffset) -> Result<()> {
    let mapping = guard.mapping();
    let end = extent_end(mapping)?;

    let block = match offset.checked_sub(BLOCK_HEADER_SIZE) {
        Some(b) if b.as_u64() >= DATA_OFFSET && b.as_u64() < end && b.as_u64() % BLOCK_ALIGN == 0 => {
            b.as_u64()
        }
        _ => {
            return Err(RtshmError::InvalidReference {
                offset,
                cause: "not the start of an allocation".to_string(),
            });
        }
    };
    if word(mapping, block, LINK)? != IN_USE {
        return Err(RtshmError::InvalidReference {
            offset,
            cause: "block is not allocated (double free?)".to_string(),
        });
    }
    let size = block_size(mapping, block, end)?;

    // Find the free neighbours on either side of `block`.
    let mut prev = 0u64;
    let mut prev_size = 0u64;
    let mut cur = mapping.load_u64(FREE_HEAD_FIELD)?;
    while cur != 0 && cur < block {
        let cur_size = block_size(mapping, cur, end)?;
        if cur + cur_size > block {
            return Err(corruption(cur, "free block overlaps an allocated block"));
        }
        let next = next_free(mapping, cur, cur_size)?;
        prev = cur;
        prev_size = cur_size;
        cur = next;
    }
    if cur != 0 && block + size > cur {
        return Err(corruption(block, "allocated block overlaps a free block"));
    }

    // Merge with the following free block.
    let (merged_size, merged_next) = if cur != 0 && block + size == cur {
        let cur_size = block_size(mapping, cur, end)?;
        (size + cur_size, next_free(mapping, cur, cur_size)?)
    } else {
        (size, cur)
    };

    // Merge into the preceding free block, or link in as a new one.
    if prev != 0 && prev + prev_size == block {
        set_word(mapping, prev, SIZE, prev_size + merged_size)?;
        set_word(mapping, prev, LINK, merged_next)?;
    } else {
        set_word(mapping, block, SIZE, merged_size)?;
        set_word(mapping, block, LINK, merged_next)?;
        relink(mapping, prev, block)?;
    }

    add_allocated(mapping, -(size as i64))?;
    tracing::debug!(%offset, block = size, "Freed block");
    Ok(())
}

/// Snapshot the free list.
pub(crate) fn free_blocks(guard: &ArenaGuard<'_>) -> Result<Vec<FreeBlock>> {
    let mapping = guard.mapping();
    let end = extent_end(mapping)?;

    let mut blocks = Vec::new();
    let mut cur = mapping.load_u64(FREE_HEAD_FIELD)?;
    while cur != 0 {
        let size = block_size(mapping, cur, end)?;
        blocks.push(FreeBlock {
            offset: ArenaOffset::new(cur),
            size,
        });
        cur = next_free(mapping, cur, size)?;
    }
    Ok(blocks)
}

/// Compute allocator accounting.
pub(crate) fn stats(guard: &ArenaGuard<'_>) -> Result<ArenaStats> {
    let mapping = guard.mapping();
    let extent = extent_end(mapping)? - DATA_OFFSET;
    let blocks = free_blocks(guard)?;

    Ok(ArenaStats {
        extent,
        free_bytes: blocks.iter().map(|b| b.size).sum(),
        allocated_bytes: mapping.load_u64(ALLOCATED_FIELD)?,
        free_blocks: blocks.len(),
        largest_free: blocks
            .iter()
            .map(|b| b.size - BLOCK_HEADER_SIZE)
            .max()
            .unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPACITY: u64 = 4096;

    fn formatted() -> Mapping {
        let mapping = Mapping::anonymous(CAPACITY as usize).unwrap();
        mapping.store_u64(CAPACITY_FIELD, CAPACITY).unwrap();
        let guard = ArenaGuard::acquire(&mapping).unwrap();
        format(&guard).unwrap();
        drop(guard);
        mapping
    }

    fn assert_accounting(guard: &ArenaGuard<'_>) {
        let stats = stats(guard).unwrap();
        assert_eq!(stats.free_bytes + stats.allocated_bytes, stats.extent);
    }

    #[test]
    fn format_creates_single_free_block() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();
        let blocks = free_blocks(&guard).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].offset.as_u64(), DATA_OFFSET);
        assert_eq!(blocks[0].size, CAPACITY - DATA_OFFSET);
    }

    #[test]
    fn allocations_are_aligned_and_distinct() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();

        let a = allocate(&guard, 1).unwrap();
        let b = allocate(&guard, 100).unwrap();
        let c = allocate(&guard, 0).unwrap();

        for off in [a, b, c] {
            assert_eq!(off.as_u64() % BLOCK_ALIGN, 0);
        }
        assert_eq!(a.as_u64(), DATA_OFFSET + BLOCK_HEADER_SIZE);
        assert!(b.as_u64() >= a.as_u64() + BLOCK_ALIGN);
        assert!(c.as_u64() >= b.as_u64() + 100);
        assert_accounting(&guard);
    }

    #[test]
    fn allocation_is_zeroed() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();

        let a = allocate(&guard, 64).unwrap();
        mapping.write_bytes(a, &[0xff; 64]).unwrap();
        free(&guard, a).unwrap();

        let b = allocate(&guard, 64).unwrap();
        assert_eq!(a, b);
        assert_eq!(mapping.read_bytes(b, 64).unwrap(), vec![0; 64]);
    }

    #[test]
    fn free_coalesces_neighbours() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();

        let a = allocate(&guard, 32).unwrap();
        let b = allocate(&guard, 32).unwrap();
        let c = allocate(&guard, 32).unwrap();
        assert_accounting(&guard);

        free(&guard, a).unwrap();
        free(&guard, c).unwrap();
        assert_eq!(free_blocks(&guard).unwrap().len(), 2);
        assert_accounting(&guard);

        free(&guard, b).unwrap();
        let blocks = free_blocks(&guard).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].size, CAPACITY - DATA_OFFSET);
        assert_eq!(stats(&guard).unwrap().allocated_bytes, 0);
    }

    #[test]
    fn out_of_space_reports_largest_block() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();

        let err = allocate(&guard, CAPACITY as usize).unwrap_err();
        match err {
            RtshmError::OutOfSpace {
                requested,
                largest_free,
            } => {
                assert_eq!(requested, CAPACITY);
                assert_eq!(largest_free, CAPACITY - DATA_OFFSET - BLOCK_HEADER_SIZE);
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = allocate(&guard, usize::MAX).unwrap_err();
        assert_eq!(err.code(), "E004");
    }

    #[test]
    fn exact_fit_consumes_whole_extent() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();

        let usable = (CAPACITY - DATA_OFFSET - BLOCK_HEADER_SIZE) as usize;
        let all = allocate(&guard, usable).unwrap();
        assert!(free_blocks(&guard).unwrap().is_empty());
        assert_eq!(allocate(&guard, 1).unwrap_err().code(), "E004");

        free(&guard, all).unwrap();
        assert_eq!(free_blocks(&guard).unwrap().len(), 1);
    }

    #[test]
    fn double_free_is_rejected() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();

        let a = allocate(&guard, 48).unwrap();
        free(&guard, a).unwrap();
        assert_eq!(free(&guard, a).unwrap_err().code(), "E005");
        assert_accounting(&guard);
    }

    #[test]
    fn stray_free_is_rejected() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();

        let a = allocate(&guard, 48).unwrap();
        assert_eq!(free(&guard, a.add(16)).unwrap_err().code(), "E005");
        assert_eq!(free(&guard, ArenaOffset::new(8)).unwrap_err().code(), "E005");
        assert_eq!(free(&guard, ArenaOffset::NULL).unwrap_err().code(), "E005");
    }

    #[test]
    fn free_list_cycle_is_corruption() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();

        let a = allocate(&guard, 32).unwrap();
        let _b = allocate(&guard, 32).unwrap();
        free(&guard, a).unwrap();

        // Point the first free block back at itself.
        let head = mapping.load_u64(FREE_HEAD_FIELD).unwrap();
        set_word(&mapping, head, LINK, head).unwrap();

        let err = free_blocks(&guard).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn oversized_block_is_corruption() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();

        set_word(&mapping, DATA_OFFSET, SIZE, CAPACITY * 2).unwrap();
        assert!(allocate(&guard, 16).unwrap_err().is_fatal());
    }

    #[test]
    fn accounting_holds_through_mixed_sequence() {
        let mapping = formatted();
        let guard = ArenaGuard::acquire(&mapping).unwrap();

        let mut live = Vec::new();
        for i in 0..20usize {
            if let Ok(off) = allocate(&guard, 8 + (i * 37) % 120) {
                live.push(off);
            }
            assert_accounting(&guard);
            if i % 3 == 2 {
                let off = live.remove(i % live.len());
                free(&guard, off).unwrap();
                assert_accounting(&guard);
            }
        }
        for off in live {
            free(&guard, off).unwrap();
        }
        assert_eq!(free_blocks(&guard).unwrap().len(), 1);
        assert_accounting(&guard);
    }
}
