//! Core types for rtshm.
//!
//! - `ArenaOffset`: byte offset from the start of the shared region
//! - `RelPtr`: offset tagged with the kind of node it points to
//! - fixed-size name fields stored inside nodes

mod name;
mod pointer;

pub use name::validate_name;
pub(crate) use name::{name_eq, read_name, write_name};
pub use pointer::{ArenaOffset, RelPtr};
