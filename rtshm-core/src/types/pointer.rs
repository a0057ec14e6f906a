//! Offset-based reference types for arena access.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Offset into the shared arena.
///
/// This is a raw byte displacement from the first byte of the region. It is
/// the only form of reference stored inside the arena: the same offset is
/// valid in every process that maps the region, whatever its base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ArenaOffset(u64);

impl ArenaOffset {
    /// The null offset. Offset 0 holds the arena header, so no node ever
    /// lives there.
    pub const NULL: Self = Self(0);

    /// Create a new arena offset.
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Get the raw offset value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Get the offset as a `usize` index into the mapping.
    #[must_use]
    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Check if this is the null offset.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Add a byte offset.
    #[must_use]
    pub const fn add(&self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }

    /// Subtract a byte offset, returning `None` on underflow.
    #[must_use]
    pub const fn checked_sub(&self, bytes: u64) -> Option<Self> {
        match self.0.checked_sub(bytes) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Display for ArenaOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u64> for ArenaOffset {
    fn from(offset: u64) -> Self {
        Self(offset)
    }
}

impl From<usize> for ArenaOffset {
    fn from(offset: usize) -> Self {
        Self(offset as u64)
    }
}

/// A typed offset to a node in the arena.
///
/// `RelPtr<T>` records what kind of node lives at an offset so that section,
/// parameter and value offsets cannot be mixed up. The data is always
/// accessed through the arena mapping, never through this value directly.
#[repr(transparent)]
pub struct RelPtr<T> {
    offset: ArenaOffset,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RelPtr<T> {
    /// The null relative pointer.
    pub const NULL: Self = Self {
        offset: ArenaOffset::NULL,
        _marker: PhantomData,
    };

    /// Create a null pointer.
    #[must_use]
    pub const fn null() -> Self {
        Self::NULL
    }

    /// Create a new relative pointer.
    #[must_use]
    pub const fn new(offset: ArenaOffset) -> Self {
        Self {
            offset,
            _marker: PhantomData,
        }
    }

    /// Get the arena offset.
    #[must_use]
    pub const fn offset(&self) -> ArenaOffset {
        self.offset
    }

    /// Check if this is a null pointer.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.offset.is_null()
    }

    /// Reinterpret the pointer as pointing to another node type.
    #[must_use]
    pub const fn cast<U>(self) -> RelPtr<U> {
        RelPtr::new(self.offset)
    }

    /// Offset of a field `field_offset` bytes into the node.
    #[must_use]
    pub(crate) const fn field(&self, field_offset: u64) -> ArenaOffset {
        self.offset.add(field_offset)
    }
}

impl<T> Clone for RelPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RelPtr<T> {}

impl<T> PartialEq for RelPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl<T> Eq for RelPtr<T> {}

impl<T> std::hash::Hash for RelPtr<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.offset.hash(state);
    }
}

impl<T> fmt::Debug for RelPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelPtr")
            .field("offset", &self.offset)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> fmt::Display for RelPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelPtr<{}>@{}", std::any::type_name::<T>(), self.offset)
    }
}

impl<T> Default for RelPtr<T> {
    fn default() -> Self {
        Self::NULL
    }
}
