// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! MSI page coherence between the two peers.

pub mod engine;
pub mod state;
pub mod stats;
pub mod table;

use thiserror::Error;

use crate::memory::RegionError;
use crate::net::ChannelError;

pub use engine::{CoherenceEngine, PageRead};
pub use state::PageState;
pub use stats::StatsSnapshot;

/// Errors raised by the coherence engine. All are fatal.
#[derive(Debug, Error)]
pub enum CoherenceError {
    #[error("page {page} is outside the {pages}-page region")]
    PageOutOfRange { page: usize, pages: usize },
    #[error("page slot lock poisoned")]
    LockPoisoned,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Region(#[from] RegionError),
}
