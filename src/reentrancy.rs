//! Debug-only detection of calls back into a map from its own key impls.
//!
//! Public `CuckooMap` methods call user code: `K: Hash` while computing the
//! digest of a key, and `K: Eq` while comparing a stored key against a
//! lookup. The borrow checker rules out a re-entrant call through the
//! borrowed map, but not one made through a raw pointer or a second shared
//! path smuggled into the key. Such a call cannot observe a half-moved
//! displacement chain, since displacement and rebuilds only read cached
//! digests and every mutation needs `&mut self`. It is still a bug in the
//! key type, and in debug builds the inner call panics. Release builds carry
//! no state and no check.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

/// Busy flag held for the duration of one public map call.
#[derive(Debug)]
pub(crate) struct DebugReentrancy {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
    // Raw pointer marker: the map is neither Send nor Sync.
    _local: PhantomData<*mut ()>,
}

impl DebugReentrancy {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Cell::new(false),
            _local: PhantomData,
        }
    }

    /// Marks the map busy until the returned guard drops.
    #[inline]
    pub(crate) fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            let was_busy = self.busy.replace(true);
            assert!(
                !was_busy,
                "CuckooMap re-entered from a key's Hash or Eq impl"
            );
            return ReentrancyGuard { flag: &self.busy };
        }

        #[cfg(not(debug_assertions))]
        {
            return ReentrancyGuard { _flag: PhantomData };
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    flag: &'a Cell<bool>,
    #[cfg(not(debug_assertions))]
    _flag: PhantomData<&'a ()>,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.flag.set(false);
    }
}
