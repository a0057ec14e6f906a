//! Registry node layout and handle.

use super::kind::ObjectKind;
use super::Registry;
use crate::error::{Result, RtshmError};
use crate::types::{ArenaOffset, RelPtr, read_name};
use std::marker::PhantomData;

/// Maximum length of a registry object name in bytes.
pub const REGISTRY_NAME_MAX: usize = 48;

pub(super) const NEXT: u64 = 0;
pub(super) const REFCOUNT: u64 = 8;
pub(super) const KIND: u64 = 12;
pub(super) const NAME: u64 = 16;
pub(super) const PAYLOAD: u64 = NAME + REGISTRY_NAME_MAX as u64;

/// Total allocation size of a node of kind `K`.
pub(super) const fn node_size<K: ObjectKind>() -> usize {
    PAYLOAD as usize + K::PAYLOAD_LEN
}

/// Marker type for `RelPtr`s to registry nodes.
pub struct NodeHeader<K>(PhantomData<K>);

/// A node in a registry list.
///
/// The handle stays valid until the node is removed; after removal its
/// storage may be reused by any later allocation.
pub struct Node<'r, K: ObjectKind> {
    registry: &'r Registry<K>,
    ptr: RelPtr<NodeHeader<K>>,
}

impl<'r, K: ObjectKind> Node<'r, K> {
    pub(super) fn new(registry: &'r Registry<K>, offset: ArenaOffset) -> Self {
        Self {
            registry,
            ptr: RelPtr::new(offset),
        }
    }

    /// Arena offset of the node.
    pub fn offset(&self) -> ArenaOffset {
        self.ptr.offset()
    }

    /// Object name.
    pub fn name(&self) -> Result<String> {
        read_name(
            self.registry.mapping()?,
            self.ptr.field(NAME),
            REGISTRY_NAME_MAX,
        )
    }

    /// Number of outstanding attachments.
    pub fn refcount(&self) -> Result<u32> {
        self.registry.mapping()?.load_u32(self.ptr.field(REFCOUNT))
    }

    /// Record one more attachment; returns the new count.
    pub fn attach(&self) -> Result<u32> {
        let guard = self.registry.arena().lock()?;
        let mapping = guard.mapping();
        let at = self.ptr.field(REFCOUNT);
        let count = mapping.load_u32(at)?.checked_add(1).ok_or_else(|| {
            RtshmError::InvalidReference {
                offset: self.offset(),
                cause: "attachment count overflow".to_string(),
            }
        })?;
        mapping.store_u32(at, count)?;
        Ok(count)
    }

    /// Drop one attachment; returns the new count.
    pub fn detach(&self) -> Result<u32> {
        let guard = self.registry.arena().lock()?;
        let mapping = guard.mapping();
        let at = self.ptr.field(REFCOUNT);
        let count = mapping.load_u32(at)?.checked_sub(1).ok_or_else(|| {
            RtshmError::InvalidReference {
                offset: self.offset(),
                cause: "node has no attachments".to_string(),
            }
        })?;
        mapping.store_u32(at, count)?;
        Ok(count)
    }

    /// Copy of the kind-specific payload.
    pub fn payload(&self) -> Result<Vec<u8>> {
        self.registry
            .mapping()?
            .read_bytes(self.ptr.field(PAYLOAD), K::PAYLOAD_LEN)
    }

    /// Overwrite the payload. Shorter input is zero-padded.
    pub fn write_payload(&self, payload: &[u8]) -> Result<()> {
        write_payload::<K>(self.registry.mapping()?, self.offset(), payload)?;
        self.registry.arena().written()
    }
}

pub(super) fn write_payload<K: ObjectKind>(
    mapping: &crate::arena::Mapping,
    node: ArenaOffset,
    payload: &[u8],
) -> Result<()> {
    let at = node.add(PAYLOAD);
    if payload.len() > K::PAYLOAD_LEN {
        return Err(RtshmError::InvalidReference {
            offset: at,
            cause: format!(
                "{} byte payload exceeds the {} byte {} slot",
                payload.len(),
                K::PAYLOAD_LEN,
                K::NAME
            ),
        });
    }
    mapping.write_bytes(at, payload)?;
    mapping.zero(at.add(payload.len() as u64), K::PAYLOAD_LEN - payload.len())
}

impl<K: ObjectKind> Clone for Node<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: ObjectKind> Copy for Node<'_, K> {}

impl<K: ObjectKind> std::fmt::Debug for Node<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &K::NAME)
            .field("offset", &self.offset())
            .finish()
    }
}
