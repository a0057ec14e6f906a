//! Arena creation and attachment settings.

use std::path::PathBuf;

/// Default region size: 100 KiB.
pub const DEFAULT_ARENA_SIZE: u64 = 100 * 1024;

/// Minimum region size: room for the fixed layout and a few nodes.
pub const MIN_ARENA_SIZE: u64 = 1024;

/// Maximum region size: 4 GiB.
pub const MAX_ARENA_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Default segment key.
pub const DEFAULT_KEY: u32 = 0x00BE_EB00;

/// Bits of the key kept when the instance number is folded in.
const KEY_MASK: u32 = 0x00ff_ffff;

/// Configuration for arena creation and attachment.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Region size in bytes.
    pub capacity: u64,
    /// Directory holding the backing files.
    pub directory: PathBuf,
    /// Base segment key.
    pub key: u32,
    /// Instance number, folded into the top byte of the segment key.
    pub instance: u8,
    /// Whether to flush the mapping after every mutation.
    pub sync_on_write: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ARENA_SIZE,
            directory: PathBuf::from("/dev/shm/rtshm"),
            key: DEFAULT_KEY,
            instance: 0,
            sync_on_write: false,
        }
    }
}

impl ArenaConfig {
    /// Create a configuration for testing.
    ///
    /// Uses a temporary directory with a unique name per invocation.
    pub fn in_memory() -> Self {
        Self {
            directory: std::env::temp_dir().join(format!("rtshm_{}", uuid::Uuid::new_v4())),
            ..Self::default()
        }
    }

    /// Set the region size, clamped to [`MAX_ARENA_SIZE`].
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity.min(MAX_ARENA_SIZE);
        self
    }

    /// Set the directory holding the backing files.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the base segment key.
    pub fn with_key(mut self, key: u32) -> Self {
        self.key = key;
        self
    }

    /// Set the instance number.
    pub fn with_instance(mut self, instance: u8) -> Self {
        self.instance = instance;
        self
    }

    /// Enable flushing after every mutation.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Segment key with the instance number folded into the top byte.
    pub fn segment_key(&self) -> u32 {
        (self.key & KEY_MASK) | (u32::from(self.instance) << 24)
    }

    /// Path of the backing file for this configuration.
    pub fn segment_path(&self) -> PathBuf {
        self.directory.join(format!("rtshm-{:08x}", self.segment_key()))
    }
}
