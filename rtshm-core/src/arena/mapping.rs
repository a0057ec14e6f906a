//! Process-local view of a shared region.
//!
//! A [`Mapping`] owns one `mmap` of the region and is the only place where
//! arena offsets become addresses. Every word stored in the region is
//! little-endian; multi-byte fields are accessed through atomics so that a
//! link published by one process is never observed half-written by another.

use crate::error::{Result, RtshmError};
use crate::types::ArenaOffset;
use memmap2::MmapMut;
use std::io;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// One process's mapping of the shared region.
pub struct Mapping {
    mmap: MmapMut,
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is shared memory by construction; all mutation goes
// through raw pointers and atomics, never through `&mut` borrows of `mmap`.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    /// Wrap an existing writable mapping.
    pub(crate) fn new(mut mmap: MmapMut) -> Result<Self> {
        let len = mmap.len();
        let base = NonNull::new(mmap.as_mut_ptr()).ok_or_else(|| RtshmError::ArenaMmap {
            path: Default::default(),
            cause: "mapping returned a null base address".to_string(),
        })?;
        Ok(Self { mmap, base, len })
    }

    /// Create a process-private anonymous mapping of `len` zeroed bytes.
    pub(crate) fn anonymous(len: usize) -> Result<Self> {
        let mmap = MmapMut::map_anon(len).map_err(|e| RtshmError::ArenaMmap {
            path: Default::default(),
            cause: e.to_string(),
        })?;
        Self::new(mmap)
    }

    /// Size of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    fn base(&self) -> *const u8 {
        self.base.as_ptr()
    }

    /// Convert an arena offset into an address in this mapping.
    pub fn offset_to_local(&self, offset: ArenaOffset) -> Result<NonNull<u8>> {
        let ptr = self.span(offset, 1, 1)?;
        // SAFETY: `span` checked that the pointer lies inside the mapping.
        Ok(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Convert an address inside this mapping back into an arena offset.
    pub fn address_to_offset(&self, addr: *const u8) -> Result<ArenaOffset> {
        let base = self.base.as_ptr() as usize;
        let addr = addr as usize;
        match addr.checked_sub(base) {
            Some(delta) if delta < self.len => Ok(ArenaOffset::from(delta)),
            _ => Err(RtshmError::InvalidReference {
                offset: ArenaOffset::new(addr.wrapping_sub(base) as u64),
                cause: format!(
                    "address {:#x} is outside the mapping at {:#x}..{:#x}",
                    addr,
                    base,
                    base + self.len
                ),
            }),
        }
    }

    /// Bounds and alignment check; returns the local address of `offset`.
    fn span(&self, offset: ArenaOffset, len: usize, align: usize) -> Result<*mut u8> {
        let start = offset.as_usize();
        let end = start.checked_add(len);
        if end.is_none_or(|end| end > self.len) {
            return Err(RtshmError::InvalidReference {
                offset,
                cause: format!("{} bytes exceed mapping of {} bytes", len, self.len),
            });
        }
        if start % align != 0 {
            return Err(RtshmError::InvalidReference {
                offset,
                cause: format!("not aligned to {} bytes", align),
            });
        }
        // SAFETY: start + len <= self.len, so the result stays in bounds.
        Ok(unsafe { self.base.as_ptr().add(start) })
    }

    fn atomic_u64(&self, offset: ArenaOffset) -> Result<&AtomicU64> {
        let ptr = self.span(offset, 8, 8)?;
        // SAFETY: in bounds and 8-byte aligned; the region outlives `self`.
        Ok(unsafe { AtomicU64::from_ptr(ptr.cast()) })
    }

    /// Shared atomic view of the 32-bit word at `offset`.
    pub(crate) fn atomic_u32(&self, offset: ArenaOffset) -> Result<&AtomicU32> {
        let ptr = self.span(offset, 4, 4)?;
        // SAFETY: in bounds and 4-byte aligned; the region outlives `self`.
        Ok(unsafe { AtomicU32::from_ptr(ptr.cast()) })
    }

    /// Load a `u64` field with acquire ordering.
    pub(crate) fn load_u64(&self, offset: ArenaOffset) -> Result<u64> {
        Ok(u64::from_le(self.atomic_u64(offset)?.load(Ordering::Acquire)))
    }

    /// Store a `u64` field with release ordering.
    pub(crate) fn store_u64(&self, offset: ArenaOffset, value: u64) -> Result<()> {
        self.atomic_u64(offset)?.store(value.to_le(), Ordering::Release);
        Ok(())
    }

    /// Load an offset field.
    pub(crate) fn load_offset(&self, offset: ArenaOffset) -> Result<ArenaOffset> {
        self.load_u64(offset).map(ArenaOffset::new)
    }

    /// Store an offset field.
    pub(crate) fn store_offset(&self, offset: ArenaOffset, value: ArenaOffset) -> Result<()> {
        self.store_u64(offset, value.as_u64())
    }

    /// Load a `u32` field with acquire ordering.
    pub(crate) fn load_u32(&self, offset: ArenaOffset) -> Result<u32> {
        Ok(u32::from_le(self.atomic_u32(offset)?.load(Ordering::Acquire)))
    }

    /// Store a `u32` field with release ordering.
    pub(crate) fn store_u32(&self, offset: ArenaOffset, value: u32) -> Result<()> {
        self.atomic_u32(offset)?.store(value.to_le(), Ordering::Release);
        Ok(())
    }

    /// Compare-and-swap a `u32` field; returns the previous value on success
    /// and the current value on failure.
    pub(crate) fn compare_exchange_u32(
        &self,
        offset: ArenaOffset,
        current: u32,
        new: u32,
    ) -> Result<std::result::Result<u32, u32>> {
        Ok(self
            .atomic_u32(offset)?
            .compare_exchange(current.to_le(), new.to_le(), Ordering::AcqRel, Ordering::Acquire)
            .map(u32::from_le)
            .map_err(u32::from_le))
    }

    /// Copy `len` bytes out of the region.
    pub(crate) fn read_bytes(&self, offset: ArenaOffset, len: usize) -> Result<Vec<u8>> {
        let src = self.span(offset, len, 1)?;
        let mut out = vec![0u8; len];
        // SAFETY: `src` is valid for `len` bytes and cannot overlap `out`.
        unsafe { ptr::copy_nonoverlapping(src, out.as_mut_ptr(), len) };
        Ok(out)
    }

    /// Copy `bytes` into the region.
    pub(crate) fn write_bytes(&self, offset: ArenaOffset, bytes: &[u8]) -> Result<()> {
        let dst = self.span(offset, bytes.len(), 1)?;
        // SAFETY: `dst` is valid for `bytes.len()` bytes and cannot overlap
        // a caller-owned slice.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) };
        Ok(())
    }

    /// Zero `len` bytes of the region.
    pub(crate) fn zero(&self, offset: ArenaOffset, len: usize) -> Result<()> {
        let dst = self.span(offset, len, 1)?;
        // SAFETY: `dst` is valid for `len` bytes.
        unsafe { ptr::write_bytes(dst, 0, len) };
        Ok(())
    }

    /// Flush dirty pages to the backing file.
    pub(crate) fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_round_trip() {
        let mapping = Mapping::anonymous(4096).unwrap();
        for raw in [0u64, 1, 64, 4095] {
            let offset = ArenaOffset::new(raw);
            let local = mapping.offset_to_local(offset).unwrap();
            assert_eq!(mapping.address_to_offset(local.as_ptr()).unwrap(), offset);
        }
    }

    #[test]
    fn address_round_trip() {
        let mapping = Mapping::anonymous(4096).unwrap();
        let addr = unsafe { mapping.base().add(1234) };
        let offset = mapping.address_to_offset(addr).unwrap();
        assert_eq!(offset.as_u64(), 1234);
        assert_eq!(mapping.offset_to_local(offset).unwrap().as_ptr() as *const u8, addr);
    }

    #[test]
    fn out_of_range_is_invalid_reference() {
        let mapping = Mapping::anonymous(4096).unwrap();
        let err = mapping.offset_to_local(ArenaOffset::new(4096)).unwrap_err();
        assert_eq!(err.code(), "E005");

        let outside = mapping.base().wrapping_add(8192);
        assert_eq!(mapping.address_to_offset(outside).unwrap_err().code(), "E005");
        let before = mapping.base().wrapping_sub(1);
        assert_eq!(mapping.address_to_offset(before).unwrap_err().code(), "E005");
    }

    #[test]
    fn word_access_is_little_endian() {
        let mapping = Mapping::anonymous(4096).unwrap();
        mapping.store_u64(ArenaOffset::new(16), 0x0102_0304_0506_0708).unwrap();
        let raw = mapping.read_bytes(ArenaOffset::new(16), 8).unwrap();
        assert_eq!(raw, vec![8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(mapping.load_u64(ArenaOffset::new(16)).unwrap(), 0x0102_0304_0506_0708);

        mapping.store_u32(ArenaOffset::new(32), 7).unwrap();
        assert_eq!(mapping.load_u32(ArenaOffset::new(32)).unwrap(), 7);
    }

    #[test]
    fn misaligned_word_is_rejected() {
        let mapping = Mapping::anonymous(4096).unwrap();
        assert!(mapping.load_u64(ArenaOffset::new(12)).is_err());
        assert!(mapping.load_u32(ArenaOffset::new(2)).is_err());
        assert!(mapping.store_u64(ArenaOffset::new(4092), 1).is_err());
    }

    #[test]
    fn compare_exchange_claims_once() {
        let mapping = Mapping::anonymous(4096).unwrap();
        let at = ArenaOffset::new(64);
        assert_eq!(mapping.compare_exchange_u32(at, 0, 2).unwrap(), Ok(0));
        assert_eq!(mapping.compare_exchange_u32(at, 0, 3).unwrap(), Err(2));
        assert_eq!(mapping.load_u32(at).unwrap(), 2);
    }

    #[test]
    fn bytes_and_zero() {
        let mapping = Mapping::anonymous(4096).unwrap();
        mapping.write_bytes(ArenaOffset::new(100), b"hello").unwrap();
        assert_eq!(mapping.read_bytes(ArenaOffset::new(100), 5).unwrap(), b"hello");
        mapping.zero(ArenaOffset::new(100), 5).unwrap();
        assert_eq!(mapping.read_bytes(ArenaOffset::new(100), 5).unwrap(), vec![0; 5]);
    }
}
