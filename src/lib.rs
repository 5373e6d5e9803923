// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.2
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Two-peer distributed shared memory emulator.
//!
//! Two processes map the same virtual address range and keep each page
//! coherent with the MSI protocol over a single TCP rendezvous.

/// Runtime configuration and validation
pub mod config;

/// Crate-level error taxonomy
pub mod error;

/// Rendezvous handshake, framed transport and wire codec
pub mod net;

/// Shared region mapping and first-touch page population
pub mod memory;

/// MSI coherence engine
pub mod coherence;

/// Operator command shell
pub mod shell;

/// Per-process context wiring the components together
pub mod node;

/// Command line entry
pub mod cli;

pub use error::{DsmError, DsmResult};
