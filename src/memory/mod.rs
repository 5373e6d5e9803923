// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Shared region mapping and lazy page population.

pub mod fault;
pub mod region;

pub use fault::{FaultCounter, FaultEngine, FaultError};
pub use region::{page_size, Region, RegionDescriptor, RegionError};
