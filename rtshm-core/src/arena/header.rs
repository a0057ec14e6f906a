//! Arena header structure and fixed region layout.

use crate::types::ArenaOffset;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use uuid::Uuid;

/// Magic number for rtshm regions.
pub const ARENA_MAGIC: u64 = 0x5254_5348_4D41_524E; // "RTSHMARN" in hex

/// Current region format version.
pub const ARENA_VERSION: u32 = 1;

/// Fixed size of the arena header in bytes.
pub const HEADER_SIZE: usize = 64;

/// Byte offsets of the header fields that change while the region is live.
pub(crate) const CAPACITY_FIELD: ArenaOffset = ArenaOffset::new(16);
pub(crate) const FREE_HEAD_FIELD: ArenaOffset = ArenaOffset::new(24);
pub(crate) const ALLOCATED_FIELD: ArenaOffset = ArenaOffset::new(32);
pub(crate) const MUTEX_FIELD: ArenaOffset = ArenaOffset::new(40);

/// Parameter-tree header, immediately after the arena header.
pub(crate) const TREE_ROOT_FIELD: ArenaOffset = ArenaOffset::new(HEADER_SIZE as u64);
pub(crate) const TREE_LOCK_FIELD: ArenaOffset = ArenaOffset::new(HEADER_SIZE as u64 + 8);
pub(crate) const TREE_HEADER_SIZE: usize = 16;

/// Registry control block, after the parameter-tree header.
pub(crate) const REGISTRY_TABLE_OFFSET: u64 = (HEADER_SIZE + TREE_HEADER_SIZE) as u64;
pub(crate) const REGISTRY_INIT_FIELD: ArenaOffset = ArenaOffset::new(REGISTRY_TABLE_OFFSET);
pub(crate) const REGISTRY_LOCK_FIELD: ArenaOffset = ArenaOffset::new(REGISTRY_TABLE_OFFSET + 4);
pub(crate) const REGISTRY_HEADS_OFFSET: u64 = REGISTRY_TABLE_OFFSET + 8;
/// Marker stored in the control block once every head slot is zeroed.
pub(crate) const REGISTRY_INIT_MARKER: u32 = 0x5245_4749; // "REGI"
const REGISTRY_TABLE_SIZE: usize = 64;

/// Start of the managed extent.
pub const DATA_OFFSET: u64 = (HEADER_SIZE + TREE_HEADER_SIZE + REGISTRY_TABLE_SIZE) as u64;

/// Arena header.
///
/// Stored at offset 0 of every region. Only `magic`, `version`, `key` and
/// `region_id` are fixed after creation; the allocator updates the other
/// words in place through atomic accesses.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct ArenaHeader {
    /// Magic number for region identification.
    pub magic: u64,
    /// Region format version.
    pub version: u32,
    /// Flags (reserved for future use).
    pub flags: u32,
    /// Total size of the region in bytes.
    pub capacity: u64,
    /// Offset of the first free block, or null.
    pub free_head: ArenaOffset,
    /// Bytes currently held by allocated blocks, headers included.
    pub allocated: u64,
    /// Arena mutex word; 0 when unlocked.
    pub mutex: u32,
    /// Segment key the region was created under.
    pub key: u32,
    /// Identifier generated when the region was formatted.
    pub region_id: Uuid,
}

impl ArenaHeader {
    /// Create a header for a freshly formatted region.
    pub fn new(capacity: u64, key: u32) -> Self {
        Self {
            magic: ARENA_MAGIC,
            version: ARENA_VERSION,
            flags: 0,
            capacity,
            free_head: ArenaOffset::new(DATA_OFFSET),
            allocated: 0,
            mutex: 0,
            key,
            region_id: Uuid::new_v4(),
        }
    }

    /// Validate the header against the size of the mapping it was read from.
    pub fn validate(&self, mapped_len: u64) -> Result<(), &'static str> {
        if self.magic != ARENA_MAGIC {
            return Err("Invalid magic number");
        }
        if self.version != ARENA_VERSION {
            return Err("Unsupported arena version");
        }
        if self.capacity > mapped_len {
            return Err("Capacity exceeds mapped length");
        }
        if self.capacity <= DATA_OFFSET {
            return Err("Capacity leaves no managed extent");
        }
        let head = self.free_head.as_u64();
        if head != 0 && (head < DATA_OFFSET || head >= self.capacity) {
            return Err("Free list head outside managed extent");
        }
        Ok(())
    }

    /// Read header from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Buffer too small for header",
            ));
        }

        let mut cursor = io::Cursor::new(bytes);

        let magic = cursor.read_u64::<LittleEndian>()?;
        let version = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;
        let capacity = cursor.read_u64::<LittleEndian>()?;
        let free_head = ArenaOffset::new(cursor.read_u64::<LittleEndian>()?);
        let allocated = cursor.read_u64::<LittleEndian>()?;
        let mutex = cursor.read_u32::<LittleEndian>()?;
        let key = cursor.read_u32::<LittleEndian>()?;

        let mut id_bytes = [0u8; 16];
        cursor.read_exact(&mut id_bytes)?;

        Ok(Self {
            magic,
            version,
            flags,
            capacity,
            free_head,
            allocated,
            mutex,
            key,
            region_id: Uuid::from_bytes(id_bytes),
        })
    }

    /// Write header to a byte buffer.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);

        buf.write_u64::<LittleEndian>(self.magic)?;
        buf.write_u32::<LittleEndian>(self.version)?;
        buf.write_u32::<LittleEndian>(self.flags)?;
        buf.write_u64::<LittleEndian>(self.capacity)?;
        buf.write_u64::<LittleEndian>(self.free_head.as_u64())?;
        buf.write_u64::<LittleEndian>(self.allocated)?;
        buf.write_u32::<LittleEndian>(self.mutex)?;
        buf.write_u32::<LittleEndian>(self.key)?;
        buf.write_all(self.region_id.as_bytes())?;

        debug_assert_eq!(buf.len(), HEADER_SIZE);

        Ok(buf)
    }
}
