// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.2
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Operator shell: command grammar and the interactive dispatcher.

pub mod command;
pub mod dispatcher;

pub use command::{CommandError, PageSelector, Verb};
pub use dispatcher::{page_text, Dispatcher, SharedMemory};
