//! Region lifecycle: create, attach, detach.

use super::allocator::{self, ArenaStats, FreeBlock};
use super::config::{ArenaConfig, MAX_ARENA_SIZE, MIN_ARENA_SIZE};
use super::header::{ArenaHeader, HEADER_SIZE, TREE_HEADER_SIZE, TREE_ROOT_FIELD};
use super::lock::ArenaGuard;
use super::mapping::Mapping;
use crate::error::{Result, RtshmError};
use crate::types::ArenaOffset;
use fs2::FileExt;
use memmap2::MmapOptions;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Shared handle state.
struct ArenaInner {
    mapping: Mapping,
    /// Backing file; holds a shared advisory lock while attached.
    file: Option<File>,
    path: Option<PathBuf>,
    attached: AtomicBool,
    key: u32,
    region_id: Uuid,
    sync_on_write: bool,
}

/// One process's handle to a shared region.
///
/// Cloning the handle is cheap and clones share attachment state: detaching
/// any clone detaches them all.
#[derive(Clone)]
pub struct Arena {
    inner: Arc<ArenaInner>,
}

fn create_error(path: &Path, cause: impl ToString) -> RtshmError {
    RtshmError::ArenaCreate {
        path: path.to_path_buf(),
        cause: cause.to_string(),
    }
}

fn check_capacity(capacity: u64) -> Result<()> {
    if !(MIN_ARENA_SIZE..=MAX_ARENA_SIZE).contains(&capacity) {
        return Err(RtshmError::ArenaCreate {
            path: PathBuf::new(),
            cause: format!(
                "capacity {} outside {}..={}",
                capacity, MIN_ARENA_SIZE, MAX_ARENA_SIZE
            ),
        });
    }
    Ok(())
}

/// Write a fresh header and empty structures over `mapping`.
fn format(mapping: &Mapping, capacity: u64, key: u32) -> Result<ArenaHeader> {
    let header = ArenaHeader::new(capacity, key);
    let bytes = header.to_bytes().map_err(|e| RtshmError::ArenaIo {
        cause: e.to_string(),
    })?;
    mapping.write_bytes(ArenaOffset::NULL, &bytes)?;
    mapping.zero(TREE_ROOT_FIELD, TREE_HEADER_SIZE)?;
    crate::registry::init_table(mapping)?;

    let guard = ArenaGuard::acquire(mapping)?;
    allocator::format(&guard)?;
    crate::params::init_root(&guard)?;
    Ok(header)
}

impl Arena {
    /// Create and format the region named by `config`.
    ///
    /// Fails if another handle, in this or any other process, is attached to
    /// the same backing file.
    pub fn create(config: &ArenaConfig) -> Result<Self> {
        check_capacity(config.capacity)?;
        std::fs::create_dir_all(&config.directory)
            .map_err(|e| create_error(&config.directory, e))?;

        let path = config.segment_path();

        // No truncate: the file may belong to a live region until we hold
        // the exclusive lock.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| create_error(&path, e))?;

        file.try_lock_exclusive()
            .map_err(|e| create_error(&path, format!("Region in use: {}", e)))?;

        file.set_len(0).map_err(|e| create_error(&path, e))?;
        file.set_len(config.capacity)
            .map_err(|e| create_error(&path, e))?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(config.capacity as usize)
                .map_mut(&file)
                .map_err(|e| RtshmError::ArenaMmap {
                    path: path.clone(),
                    cause: e.to_string(),
                })?
        };
        let mapping = Mapping::new(mmap)?;

        let key = config.segment_key();
        let header = format(&mapping, config.capacity, key)?;
        mapping.flush().map_err(|e| RtshmError::ArenaIo {
            cause: e.to_string(),
        })?;

        // Formatting is complete; let attachers in.
        file.lock_shared()
            .map_err(|e| create_error(&path, format!("Failed to downgrade lock: {}", e)))?;

        tracing::info!(
            path = %path.display(),
            capacity = config.capacity,
            key = %format!("{:#010x}", key),
            region_id = %header.region_id,
            "Created arena"
        );

        Ok(Self::from_parts(
            mapping,
            Some(file),
            Some(path),
            header,
            config.sync_on_write,
        ))
    }

    /// Attach to the existing region named by `config`.
    pub fn attach(config: &ArenaConfig) -> Result<Self> {
        Self::open_existing(config.segment_path(), config.sync_on_write)
    }

    /// Attach to the region stored in `path`.
    pub fn attach_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_existing(path.as_ref().to_path_buf(), false)
    }

    /// Map an existing backing file. Validates the header; never
    /// re-initializes anything.
    fn open_existing(path: PathBuf, sync_on_write: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| create_error(&path, e))?;

        // Blocks while a creator is still formatting.
        file.lock_shared()
            .map_err(|e| create_error(&path, format!("Failed to lock file: {}", e)))?;

        let len = file.metadata().map_err(|e| create_error(&path, e))?.len();
        if len < HEADER_SIZE as u64 || len > MAX_ARENA_SIZE {
            return Err(RtshmError::InvalidHeader {
                cause: format!("file size {} is not a valid region size", len),
            });
        }

        let mmap = unsafe {
            MmapOptions::new()
                .len(len as usize)
                .map_mut(&file)
                .map_err(|e| RtshmError::ArenaMmap {
                    path: path.clone(),
                    cause: e.to_string(),
                })?
        };
        let mapping = Mapping::new(mmap)?;

        let header = read_header(&mapping)?;

        tracing::info!(
            path = %path.display(),
            capacity = header.capacity,
            region_id = %header.region_id,
            "Attached arena"
        );

        Ok(Self::from_parts(
            mapping,
            Some(file),
            Some(path),
            header,
            sync_on_write,
        ))
    }

    /// Attach to the region named by `config`, creating it if the backing
    /// file does not exist yet.
    pub fn open_or_create(config: &ArenaConfig) -> Result<Self> {
        if config.segment_path().exists() {
            Self::attach(config)
        } else {
            Self::create(config)
        }
    }

    /// Create a formatted region backed by anonymous memory.
    ///
    /// Only visible to this process and threads sharing the handle.
    pub fn anonymous(capacity: u64) -> Result<Self> {
        check_capacity(capacity)?;
        let mapping = Mapping::anonymous(capacity as usize)?;
        let header = format(&mapping, capacity, 0)?;
        tracing::debug!(capacity, region_id = %header.region_id, "Created anonymous arena");
        Ok(Self::from_parts(mapping, None, None, header, false))
    }

    fn from_parts(
        mapping: Mapping,
        file: Option<File>,
        path: Option<PathBuf>,
        header: ArenaHeader,
        sync_on_write: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ArenaInner {
                mapping,
                file,
                path,
                attached: AtomicBool::new(true),
                key: header.key,
                region_id: header.region_id,
                sync_on_write,
            }),
        }
    }

    /// The mapping, if this handle is still attached.
    pub(crate) fn mapping(&self) -> Result<&Mapping> {
        if self.inner.attached.load(Ordering::Acquire) {
            Ok(&self.inner.mapping)
        } else {
            Err(RtshmError::NotInitialized { component: "arena" })
        }
    }

    /// Acquire the arena mutex.
    pub(crate) fn lock(&self) -> Result<ArenaGuard<'_>> {
        ArenaGuard::acquire(self.mapping()?)
    }

    /// Flush after a mutation when configured to.
    pub(crate) fn written(&self) -> Result<()> {
        if self.inner.sync_on_write {
            self.flush()?;
        }
        Ok(())
    }

    /// Allocate `size` zeroed bytes and return the offset of the usable region.
    pub fn allocate(&self, size: usize) -> Result<ArenaOffset> {
        let offset = {
            let guard = self.lock()?;
            allocator::allocate(&guard, size)?
        };
        self.written()?;
        Ok(offset)
    }

    /// Release an allocation returned by [`Arena::allocate`].
    pub fn free(&self, offset: ArenaOffset) -> Result<()> {
        {
            let guard = self.lock()?;
            allocator::free(&guard, offset)?;
        }
        self.written()
    }

    /// Allocator accounting snapshot.
    pub fn stats(&self) -> Result<ArenaStats> {
        let guard = self.lock()?;
        allocator::stats(&guard)
    }

    /// Snapshot of the free list in address order.
    pub fn free_blocks(&self) -> Result<Vec<FreeBlock>> {
        let guard = self.lock()?;
        allocator::free_blocks(&guard)
    }

    /// Convert an arena offset into an address in this process's mapping.
    pub fn offset_to_local(&self, offset: ArenaOffset) -> Result<NonNull<u8>> {
        self.mapping()?.offset_to_local(offset)
    }

    /// Convert an address in this process's mapping into an arena offset.
    pub fn address_to_offset(&self, addr: *const u8) -> Result<ArenaOffset> {
        self.mapping()?.address_to_offset(addr)
    }

    /// Copy bytes out of the region.
    pub fn read_bytes(&self, offset: ArenaOffset, len: usize) -> Result<Vec<u8>> {
        self.mapping()?.read_bytes(offset, len)
    }

    /// Copy bytes into the region.
    pub fn write_bytes(&self, offset: ArenaOffset, bytes: &[u8]) -> Result<()> {
        self.mapping()?.write_bytes(offset, bytes)?;
        self.written()
    }

    /// Current header contents.
    pub fn header(&self) -> Result<ArenaHeader> {
        read_header(self.mapping()?)
    }

    /// Flush all pending writes to the backing file.
    pub fn flush(&self) -> Result<()> {
        self.mapping()?.flush().map_err(|e| RtshmError::ArenaIo {
            cause: e.to_string(),
        })
    }

    /// Detach this handle. Every later operation fails with `NotInitialized`.
    ///
    /// The mapping itself is released when the last clone is dropped.
    pub fn detach(&self) {
        if self.inner.attached.swap(false, Ordering::AcqRel) {
            tracing::info!(region_id = %self.inner.region_id, "Detached arena");
        }
    }

    /// Check if the handle is attached.
    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire)
    }

    /// Size of the mapping in bytes.
    pub fn capacity(&self) -> u64 {
        self.inner.mapping.len() as u64
    }

    /// Backing file path, `None` for anonymous regions.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Segment key the region was created under.
    pub fn key(&self) -> u32 {
        self.inner.key
    }

    /// Identifier generated when the region was formatted.
    pub fn region_id(&self) -> Uuid {
        self.inner.region_id
    }

    /// Detach and delete the backing file.
    ///
    /// Other processes that still map the region keep their mapping; the
    /// name disappears from the directory.
    pub fn delete(self) -> Result<()> {
        self.detach();
        let path = self.inner.path.clone();
        drop(self);

        match path {
            Some(path) => std::fs::remove_file(&path)
                .map_err(|e| create_error(&path, format!("Failed to delete region file: {}", e))),
            None => Ok(()),
        }
    }
}

fn read_header(mapping: &Mapping) -> Result<ArenaHeader> {
    let bytes = mapping.read_bytes(ArenaOffset::NULL, HEADER_SIZE)?;
    let header = ArenaHeader::from_bytes(&bytes).map_err(|e| RtshmError::InvalidHeader {
        cause: e.to_string(),
    })?;
    header
        .validate(mapping.len() as u64)
        .map_err(|cause| RtshmError::InvalidHeader {
            cause: cause.to_string(),
        })?;
    Ok(header)
}

impl Drop for ArenaInner {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            if let Err(e) = self.mapping.flush() {
                tracing::warn!(error = %e, "Failed to flush arena on drop");
            }
            let _ = FileExt::unlock(file);
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("path", &self.inner.path)
            .field("key", &format_args!("{:#010x}", self.inner.key))
            .field("region_id", &self.inner.region_id)
            .field("attached", &self.is_attached())
            .finish()
    }
}
