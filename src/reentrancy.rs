//! Debug-only probe guard.
//!
//! The storage block calls into user code (`K: Hash` and `K: Eq`) only
//! while hashing an incoming key and probing the index. A key whose
//! `Eq` or `Hash` reaches back into the same block would observe it
//! mid-operation, so those sections are bracketed with a guard. Debug
//! builds panic on nested entry; release builds compile the guard away.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

#[derive(Debug)]
pub(crate) struct ProbeGuard {
    #[cfg(debug_assertions)]
    active: Cell<bool>,
    // Single-threaded, like the storage that embeds it.
    _nosend: PhantomData<*mut ()>,
}

impl ProbeGuard {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            active: Cell::new(false),
            _nosend: PhantomData,
        }
    }

    /// Mark the start of a probing section; the section ends when the
    /// returned scope is dropped.
    #[cfg(debug_assertions)]
    #[inline]
    pub(crate) fn enter(&self) -> ProbeScope<'_> {
        assert!(
            !self.active.replace(true),
            "reentrant access to insertion-ordered map storage during key probe"
        );
        ProbeScope { guard: self }
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    pub(crate) fn enter(&self) -> ProbeScope<'_> {
        ProbeScope { _lt: PhantomData }
    }
}

pub(crate) struct ProbeScope<'a> {
    #[cfg(debug_assertions)]
    guard: &'a ProbeGuard,
    #[cfg(not(debug_assertions))]
    _lt: PhantomData<&'a ()>,
}

impl Drop for ProbeScope<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.guard.active.set(false);
    }
}
