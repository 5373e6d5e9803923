// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Crate-level error taxonomy.
//!
//! Every component owns its own error enum; [`DsmError`] folds them together
//! so setup and protocol failures can travel up to the binary as one type.
//! Only [`crate::shell::CommandError`] is recoverable, and the dispatcher
//! handles it locally.

use thiserror::Error;

use crate::coherence::CoherenceError;
use crate::config::ConfigError;
use crate::memory::{FaultError, RegionError};
use crate::net::{ChannelError, RendezvousError};

/// Any fatal error raised by a DSM component.
#[derive(Debug, Error)]
pub enum DsmError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("rendezvous: {0}")]
    Rendezvous(#[from] RendezvousError),
    #[error("channel: {0}")]
    Channel(#[from] ChannelError),
    #[error("region: {0}")]
    Region(#[from] RegionError),
    #[error("fault engine: {0}")]
    Fault(#[from] FaultError),
    #[error("coherence: {0}")]
    Coherence(#[from] CoherenceError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate.
pub type DsmResult<T> = Result<T, DsmError>;
