//! Shared-memory arena with a relocatable free-list allocator.
//!
//! A region is a single file (normally under `/dev/shm`) that several
//! processes map, each at whatever base address its OS picks. Nothing inside
//! the region stores an address: every link is an [`ArenaOffset`] from the
//! first byte of the region, and offset 0 is the null link.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ 0    Arena header (magic, version, capacity, free head, mutex)   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ 64   Parameter-tree header (root section, structural lock)       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ 80   Registry control block (init marker, lock, six list heads)  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ 144  Managed extent                                              │
//! │ ┌──────────────────────────────────────────────────────────────┐ │
//! │ │ Block: [link: u64][size: u64][usable bytes ...]              │ │
//! │ ├──────────────────────────────────────────────────────────────┤ │
//! │ │ ...                                                          │ │
//! │ └──────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Allocation and free take the arena mutex, a spin lock stored in the
//! header, so they are safe across processes as well as threads.
//!
//! [`ArenaOffset`]: crate::types::ArenaOffset

mod allocator;
mod config;
mod header;
mod lock;
mod mapping;
mod region;

pub use allocator::{ArenaStats, BLOCK_ALIGN, BLOCK_HEADER_SIZE, FreeBlock};
pub use config::{ArenaConfig, DEFAULT_ARENA_SIZE, DEFAULT_KEY, MAX_ARENA_SIZE, MIN_ARENA_SIZE};
pub use header::{ARENA_MAGIC, ARENA_VERSION, ArenaHeader, DATA_OFFSET, HEADER_SIZE};

pub use region::Arena;

pub(crate) use allocator::{allocate as allocate_locked, free as free_locked};
pub(crate) use header::{
    REGISTRY_HEADS_OFFSET, REGISTRY_INIT_FIELD, REGISTRY_INIT_MARKER, REGISTRY_LOCK_FIELD,
    TREE_LOCK_FIELD, TREE_ROOT_FIELD,
};
pub(crate) use lock::ArenaGuard;
pub(crate) use mapping::Mapping;
