//! rtshm Core Library
//!
//! Relocatable data structures for a shared-memory region that several
//! processes map at different base addresses.
//!
//! # Overview
//!
//! Everything stored in the region links by byte offset from the region
//! start, never by address, so any process can walk any structure no matter
//! where its own mapping landed.
//!
//! # Key Components
//!
//! - **Arena**: the mapped region and its free-list allocator
//! - **Registry**: named-object lists (components, pins, signals, threads,
//!   functions, rings) with visitor iteration
//! - **Params**: hierarchical configuration tree of sections, parameters and
//!   typed multi-valued entries
//! - **Types**: offsets, typed relative pointers and name fields
//!
//! # Example
//!
//! ```no_run
//! use rtshm_core::prelude::*;
//!
//! # fn main() -> rtshm_core::Result<()> {
//! let config = ArenaConfig::default().with_instance(1);
//! let arena = Arena::open_or_create(&config)?;
//!
//! let params = ParamTree::new(&arena);
//! params.set_int("/sec1/sub1", "count", 0, 5)?;
//! assert_eq!(params.get_int("/sec1/sub1", "count", 0)?, 5);
//!
//! let comps = Registry::<Components>::new(&arena);
//! comps.insert("motion", &[])?;
//! let n = comps.for_each(None, |_| Visit::Continue)?;
//! # let _ = n;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod error;
pub mod params;
pub mod prelude;
pub mod registry;
pub mod types;

// Re-export key types at crate root for convenience
pub use arena::{Arena, ArenaConfig, ArenaStats, FreeBlock};
pub use error::{Result, RtshmError};
pub use params::{ParamTree, Value, ValueKind};
pub use registry::{ObjectKind, Registry, Visit};
pub use types::{ArenaOffset, RelPtr};
