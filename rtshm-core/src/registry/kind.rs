//! Object kinds hosted by the registry.

/// Where [`Registry::insert`](super::Registry::insert) links new nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    /// Newest node first.
    Head,
    /// Oldest node first; walks follow creation order.
    Tail,
}

/// A kind of named object with its own list in the registry control block.
pub trait ObjectKind: Send + Sync + 'static {
    /// Human-readable kind name used in errors and logs.
    const NAME: &'static str;
    /// Tag stored in every node of this kind.
    const TAG: u32;
    /// Index of the list-head slot in the control block.
    const SLOT: usize;
    /// Length of the opaque payload following the node header.
    const PAYLOAD_LEN: usize;
    /// Insertion policy for new nodes.
    const INSERT: InsertPolicy;
}

/// Number of list-head slots in the control block.
pub const KIND_COUNT: usize = 6;

macro_rules! object_kind {
    ($(#[$meta:meta])* $ty:ident, $name:literal, tag = $tag:literal, slot = $slot:literal,
     payload = $len:literal, insert = $policy:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $ty;

        impl ObjectKind for $ty {
            const NAME: &'static str = $name;
            const TAG: u32 = $tag;
            const SLOT: usize = $slot;
            const PAYLOAD_LEN: usize = $len;
            const INSERT: InsertPolicy = InsertPolicy::$policy;
        }
    };
}

object_kind!(
    /// Loaded components.
    Components, "component", tag = 0x434F_4D50, slot = 0, payload = 32, insert = Head
);
object_kind!(
    /// Component pins.
    Pins, "pin", tag = 0x5049_4E53, slot = 1, payload = 32, insert = Tail
);
object_kind!(
    /// Signals connecting pins.
    Signals, "signal", tag = 0x5349_474E, slot = 2, payload = 32, insert = Tail
);
object_kind!(
    /// Realtime threads.
    Threads, "thread", tag = 0x5448_5244, slot = 3, payload = 48, insert = Tail
);
object_kind!(
    /// Exported functions.
    Functions, "function", tag = 0x4655_4E43, slot = 4, payload = 32, insert = Head
);
object_kind!(
    /// Ring buffers.
    Rings, "ring", tag = 0x5249_4E47, slot = 5, payload = 16, insert = Head
);
