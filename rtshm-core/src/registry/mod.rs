//! Named-object registry.
//!
//! Each [`ObjectKind`] owns one singly linked list of nodes in the arena,
//! rooted in a head slot of the registry control block. Every node carries a
//! NUL-padded name, an attachment count and a fixed-length opaque payload.
//!
//! Walks honour the shared config lock: while it is held, every registry
//! refuses both reads and mutation.
//!
//! ```text
//! control block           node                      node
//! ┌────────────┐   ┌───────────────────────┐   ┌───────────────────────┐
//! │ heads[slot]├──►│ next ─────────────────┼──►│ next = 0              │
//! └────────────┘   │ refcount | kind tag   │   │ refcount | kind tag   │
//!                  │ name[48]              │   │ name[48]              │
//!                  │ payload[PAYLOAD_LEN]  │   │ payload[PAYLOAD_LEN]  │
//!                  └───────────────────────┘   └───────────────────────┘
//! ```

mod kind;
mod node;

pub use kind::{
    Components, Functions, InsertPolicy, KIND_COUNT, ObjectKind, Pins, Rings, Signals, Threads,
};
pub use node::{Node, NodeHeader, REGISTRY_NAME_MAX};

use crate::arena::{
    Arena, ArenaGuard, Mapping, REGISTRY_HEADS_OFFSET, REGISTRY_INIT_FIELD, REGISTRY_INIT_MARKER,
    REGISTRY_LOCK_FIELD, allocate_locked, free_locked,
};
use crate::error::{Result, RtshmError};
use crate::types::{ArenaOffset, name_eq, validate_name, write_name};
use node::{KIND, NAME, NEXT, node_size};
use std::marker::PhantomData;

/// Visitor verdict for [`Registry::for_each`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Keep walking.
    Continue,
    /// Stop; the walk returns the number of nodes visited so far.
    Stop,
    /// Fail the walk with [`RtshmError::VisitorAborted`] carrying this code.
    Abort(i32),
}

impl From<i32> for Visit {
    /// Negative aborts, positive stops, zero continues.
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Continue,
            c if c > 0 => Self::Stop,
            c => Self::Abort(c),
        }
    }
}

/// Zero every head slot and mark the control block initialized.
pub(crate) fn init_table(mapping: &Mapping) -> Result<()> {
    for slot in 0..KIND_COUNT {
        mapping.store_u64(head_field(slot), 0)?;
    }
    mapping.store_u32(REGISTRY_LOCK_FIELD, 0)?;
    mapping.store_u32(REGISTRY_INIT_FIELD, REGISTRY_INIT_MARKER)
}

fn head_field(slot: usize) -> ArenaOffset {
    ArenaOffset::new(REGISTRY_HEADS_OFFSET + 8 * slot as u64)
}

fn next_of(mapping: &Mapping, node: ArenaOffset) -> Result<ArenaOffset> {
    mapping.load_offset(node.add(NEXT))
}

/// Registry of objects of kind `K` in one arena.
pub struct Registry<K: ObjectKind> {
    arena: Arena,
    _kind: PhantomData<K>,
}

impl<K: ObjectKind> Registry<K> {
    /// Open the `K` registry of `arena`.
    pub fn new(arena: &Arena) -> Self {
        Self {
            arena: arena.clone(),
            _kind: PhantomData,
        }
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    /// The attached mapping with an initialized control block.
    pub(crate) fn mapping(&self) -> Result<&Mapping> {
        let mapping = self
            .arena
            .mapping()
            .map_err(|_| RtshmError::NotInitialized {
                component: "registry",
            })?;
        if mapping.load_u32(REGISTRY_INIT_FIELD)? != REGISTRY_INIT_MARKER {
            return Err(RtshmError::NotInitialized {
                component: "registry",
            });
        }
        Ok(mapping)
    }

    /// Fail with `Locked` while the shared config lock is held.
    fn check_unlocked(&self, mapping: &Mapping, operation: &'static str) -> Result<()> {
        if mapping.load_u32(REGISTRY_LOCK_FIELD)? != 0 {
            tracing::warn!(registry = K::NAME, operation, "Registry is locked");
            return Err(RtshmError::Locked {
                component: "registry",
            });
        }
        Ok(())
    }

    /// Upper bound on list length, for cycle detection.
    fn max_nodes(mapping: &Mapping) -> usize {
        mapping.len() / node_size::<K>() + 1
    }

    fn cycle(&self, at: ArenaOffset) -> RtshmError {
        tracing::error!(registry = K::NAME, offset = %at, "Registry list does not terminate");
        RtshmError::ArenaCorruption {
            offset: at,
            cause: format!("{} list does not terminate", K::NAME),
        }
    }

    /// Walk the list, calling `visitor` for every node named `filter` (or
    /// every node when `filter` is `None`).
    ///
    /// Returns the number of matching nodes visited. [`Visit::Stop`] ends the
    /// walk early and the count includes the stopping node;
    /// [`Visit::Abort`] fails the walk with `VisitorAborted`.
    pub fn for_each<F>(&self, filter: Option<&str>, mut visitor: F) -> Result<usize>
    where
        F: FnMut(&Node<'_, K>) -> Visit,
    {
        self.walk(filter, Some(&mut visitor))
    }

    /// Number of nodes named `filter`, or of all nodes.
    pub fn count(&self, filter: Option<&str>) -> Result<usize> {
        self.walk(filter, None)
    }

    fn walk(
        &self,
        filter: Option<&str>,
        mut visitor: Option<&mut dyn FnMut(&Node<'_, K>) -> Visit>,
    ) -> Result<usize> {
        let mapping = self.mapping()?;
        self.check_unlocked(mapping, "walk")?;

        let limit = Self::max_nodes(mapping);
        let mut visited = 0usize;
        let mut steps = 0usize;
        let mut next = mapping.load_offset(head_field(K::SLOT))?;

        while !next.is_null() {
            steps += 1;
            if steps > limit {
                return Err(self.cycle(next));
            }
            let node = Node::new(self, next);
            let matches = match filter {
                Some(name) => name_eq(mapping, next.add(NAME), REGISTRY_NAME_MAX, name)?,
                None => true,
            };
            if matches {
                visited += 1;
                if let Some(visit) = visitor.as_mut() {
                    match visit(&node) {
                        Visit::Continue => {}
                        Visit::Stop => return Ok(visited),
                        Visit::Abort(code) => {
                            return Err(RtshmError::VisitorAborted {
                                registry: K::NAME,
                                code,
                            });
                        }
                    }
                }
            }
            next = next_of(mapping, next)?;
        }
        Ok(visited)
    }

    /// First node named `name`.
    pub fn find(&self, name: &str) -> Result<Option<Node<'_, K>>> {
        let mut found = None;
        self.for_each(Some(name), |node| {
            found = Some(node.offset());
            Visit::Stop
        })?;
        Ok(found.map(|offset| Node::new(self, offset)))
    }

    /// Names of every node in list order.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut failure = None;
        self.for_each(None, |node| match node.name() {
            Ok(name) => {
                names.push(name);
                Visit::Continue
            }
            Err(e) => {
                failure = Some(e);
                Visit::Stop
            }
        })?;
        match failure {
            Some(e) => Err(e),
            None => Ok(names),
        }
    }

    /// Create a node named `name` with the given payload.
    ///
    /// Duplicate names are not rejected; lookups return the first match in
    /// list order.
    pub fn insert(&self, name: &str, payload: &[u8]) -> Result<Node<'_, K>> {
        validate_name(name, REGISTRY_NAME_MAX)?;
        let mapping = self.mapping()?;

        let offset = {
            let guard = ArenaGuard::acquire(mapping)?;
            self.check_unlocked(mapping, "insert")?;

            let offset = allocate_locked(&guard, node_size::<K>())?;
            let published = self
                .fill(mapping, offset, name, payload)
                .and_then(|()| self.link(mapping, offset));
            if let Err(e) = published {
                free_locked(&guard, offset)?;
                return Err(e);
            }
            offset
        };

        tracing::debug!(registry = K::NAME, name, %offset, "Inserted registry node");
        self.arena.written()?;
        Ok(Node::new(self, offset))
    }

    fn fill(&self, mapping: &Mapping, node: ArenaOffset, name: &str, payload: &[u8]) -> Result<()> {
        node::write_payload::<K>(mapping, node, payload)?;
        write_name(mapping, node.add(NAME), REGISTRY_NAME_MAX, name)?;
        mapping.store_u32(node.add(KIND), K::TAG)
    }

    /// Publish `node` according to the kind's insertion policy. Caller holds
    /// the arena mutex.
    fn link(&self, mapping: &Mapping, node: ArenaOffset) -> Result<()> {
        let head = head_field(K::SLOT);
        match K::INSERT {
            InsertPolicy::Head => {
                mapping.store_offset(node.add(NEXT), mapping.load_offset(head)?)?;
                mapping.store_offset(head, node)
            }
            InsertPolicy::Tail => {
                let limit = Self::max_nodes(mapping);
                let mut link = head;
                let mut steps = 0usize;
                loop {
                    let next = mapping.load_offset(link)?;
                    if next.is_null() {
                        break;
                    }
                    steps += 1;
                    if steps > limit {
                        return Err(self.cycle(next));
                    }
                    link = next.add(NEXT);
                }
                mapping.store_offset(link, node)
            }
        }
    }

    /// Unlink and free the first node named `name`.
    ///
    /// Refused with `ObjectInUse` while the node has attachments.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mapping = self.mapping()?;

        let offset = {
            let guard = ArenaGuard::acquire(mapping)?;
            self.check_unlocked(mapping, "remove")?;

            let limit = Self::max_nodes(mapping);
            let mut link = head_field(K::SLOT);
            let mut steps = 0usize;
            let node = loop {
                let cur = mapping.load_offset(link)?;
                if cur.is_null() {
                    return Err(RtshmError::NotFound {
                        what: format!("{} '{}'", K::NAME, name),
                    });
                }
                steps += 1;
                if steps > limit {
                    return Err(self.cycle(cur));
                }
                if name_eq(mapping, cur.add(NAME), REGISTRY_NAME_MAX, name)? {
                    break cur;
                }
                link = cur.add(NEXT);
            };

            let refcount = mapping.load_u32(node.add(node::REFCOUNT))?;
            if refcount > 0 {
                tracing::warn!(registry = K::NAME, name, refcount, "Refusing to remove attached object");
                return Err(RtshmError::ObjectInUse {
                    registry: K::NAME,
                    name: name.to_string(),
                    refcount,
                });
            }

            mapping.store_offset(link, next_of(mapping, node)?)?;
            free_locked(&guard, node)?;
            node
        };

        tracing::debug!(registry = K::NAME, name, %offset, "Removed registry node");
        self.arena.written()
    }

    /// Set or clear the config lock shared by every registry of the arena.
    pub fn set_locked(&self, locked: bool) -> Result<()> {
        let mapping = self.mapping()?;
        let _guard = ArenaGuard::acquire(mapping)?;
        mapping.store_u32(REGISTRY_LOCK_FIELD, u32::from(locked))?;
        tracing::info!(locked, "Registry config lock changed");
        Ok(())
    }

    /// Check if the shared config lock is held.
    pub fn is_locked(&self) -> Result<bool> {
        Ok(self.mapping()?.load_u32(REGISTRY_LOCK_FIELD)? != 0)
    }
}

impl<K: ObjectKind> Clone for Registry<K> {
    fn clone(&self) -> Self {
        Self::new(&self.arena)
    }
}

impl<K: ObjectKind> std::fmt::Debug for Registry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &K::NAME)
            .field("arena", &self.arena)
            .finish()
    }
}
