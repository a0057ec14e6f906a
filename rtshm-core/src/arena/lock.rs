//! Arena-wide mutual exclusion.
//!
//! The mutex is a single word in the arena header, shared by every process
//! that maps the region. It is held only for the duration of one allocator
//! operation or one structural check-and-link, so waiters spin briefly and
//! then yield instead of parking.

use super::header::MUTEX_FIELD;
use super::mapping::Mapping;
use crate::error::Result;
use std::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Spins before falling back to yielding the thread.
const SPIN_LIMIT: u32 = 64;

/// Proof that the arena mutex is held. Released on drop.
pub(crate) struct ArenaGuard<'a> {
    word: &'a AtomicU32,
    mapping: &'a Mapping,
}

impl<'a> ArenaGuard<'a> {
    /// Acquire the arena mutex, spinning until it is free.
    pub(crate) fn acquire(mapping: &'a Mapping) -> Result<Self> {
        let word = mapping.atomic_u32(MUTEX_FIELD)?;
        let mut spins = 0u32;
        while word
            .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while word.load(Ordering::Relaxed) != UNLOCKED {
                if spins < SPIN_LIMIT {
                    spins += 1;
                    std::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
        }
        Ok(Self { word, mapping })
    }

    /// The mapping this guard protects.
    pub(crate) fn mapping(&self) -> &'a Mapping {
        self.mapping
    }
}

impl Drop for ArenaGuard<'_> {
    fn drop(&mut self) {
        self.word.store(UNLOCKED, Ordering::Release);
    }
}
