//! Debug-only reentrancy detection for the structural layer.
//!
//! The ordered table calls into user code (`K: Eq + Hash`) while its index
//! and slot storage may disagree. A key whose `Eq` reaches back into the
//! same table would observe that torn state, so in debug builds every
//! guarded section marks the tracker busy and a nested entry panics. Release
//! builds compile the tracker down to a marker.

use core::cell::Cell;
use core::marker::PhantomData;

/// Busy flag embedded in a data structure. Guard entry-points with
/// `let _g = self.reentrancy.enter();`.
#[derive(Debug)]
pub(crate) struct DebugReentrancy {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
    // Raw pointer marker keeps the owner !Send + !Sync.
    _single_thread: PhantomData<*mut ()>,
}

impl DebugReentrancy {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Cell::new(false),
            _single_thread: PhantomData,
        }
    }

    /// Marks the owner busy until the returned guard drops.
    ///
    /// Panics in debug builds when the owner is already busy.
    #[inline]
    pub(crate) fn enter(&self) -> Section<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "reentrancy detected: ordered table entered while busy"
            );
            Section { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            Section { _owner: PhantomData }
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII marker returned by [`DebugReentrancy::enter`].
pub(crate) struct Section<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _owner: PhantomData<&'a ()>,
}

impl Drop for Section<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.owner.busy.set(false);
    }
}
