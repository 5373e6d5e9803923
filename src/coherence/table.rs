// CLASSIFICATION: COMMUNITY
// Filename: table.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Per-page coherence bookkeeping.
//!
//! One slot per page, each with its own mutex and condition variable, so a
//! reader waiting for page 3 is never woken by traffic for page 7.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::coherence::state::PageState;
use crate::coherence::CoherenceError;

/// Progress of this peer's own Request(Shared) for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Pending,
    /// Peer sent page bytes.
    Filled,
    /// Peer had no valid copy.
    Empty,
}

/// Progress of this peer's own Request(Modified) for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidateStatus {
    #[default]
    Idle,
    Pending,
    Acked,
}

/// Mutable per-page record guarded by the slot mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageEntry {
    pub state: PageState,
    pub fetch: FetchStatus,
    pub invalidate: InvalidateStatus,
    /// State held before an outstanding write claimed `Modified`.
    pub claimed_from: Option<PageState>,
}

impl PageEntry {
    /// Whether the page memory holds bytes worth shipping to the peer. A
    /// claim made from `Invalid` has nothing to offer until it completes.
    pub fn has_data(&self) -> bool {
        self.state.is_valid() && self.claimed_from != Some(PageState::Invalid)
    }
}

/// Wait handle for one page.
#[derive(Debug, Default)]
pub struct PageSlot {
    entry: Mutex<PageEntry>,
    changed: Condvar,
}

impl PageSlot {
    pub fn lock(&self) -> Result<MutexGuard<'_, PageEntry>, CoherenceError> {
        self.entry.lock().map_err(|_| CoherenceError::LockPoisoned)
    }

    /// Block while `pending` holds for the entry.
    pub fn wait_while<'a, F>(
        &self,
        guard: MutexGuard<'a, PageEntry>,
        pending: F,
    ) -> Result<MutexGuard<'a, PageEntry>, CoherenceError>
    where
        F: FnMut(&mut PageEntry) -> bool,
    {
        self.changed
            .wait_while(guard, pending)
            .map_err(|_| CoherenceError::LockPoisoned)
    }

    pub fn notify(&self) {
        self.changed.notify_all();
    }
}

/// Arena of page slots indexed by page number.
#[derive(Debug)]
pub struct PageTable {
    slots: Vec<PageSlot>,
}

impl PageTable {
    /// A table of `pages` slots, all [`PageState::Invalid`].
    pub fn new(pages: usize) -> Self {
        Self {
            slots: (0..pages).map(|_| PageSlot::default()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, page: usize) -> Result<&PageSlot, CoherenceError> {
        self.slots.get(page).ok_or(CoherenceError::PageOutOfRange {
            page,
            pages: self.slots.len(),
        })
    }

    /// Current state of one page.
    pub fn state(&self, page: usize) -> Result<PageState, CoherenceError> {
        Ok(self.slot(page)?.lock()?.state)
    }
}
