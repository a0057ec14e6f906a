//! Prelude for convenient imports.
//!
//! This module re-exports the most commonly used types and traits.
//!
//! # Example
//!
//! ```
//! use rtshm_core::prelude::*;
//! ```

// Core types
pub use crate::types::{ArenaOffset, RelPtr};

// Error handling
pub use crate::error::{Result, RtshmError};

// Arena
pub use crate::arena::{Arena, ArenaConfig, ArenaHeader, ArenaStats, FreeBlock};

// Registry
pub use crate::registry::{
    Components, Functions, Node, ObjectKind, Pins, Registry, Rings, Signals, Threads, Visit,
};

// Parameter tree
pub use crate::params::{ParamTree, Scalar, Slot, TreeSnapshot, Value, ValueKind};
