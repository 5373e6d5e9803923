// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Peer networking: handshake, framed transport and the wire codec.

pub mod channel;
pub mod rendezvous;
pub mod wire;

pub use channel::{ChannelError, ChannelReader, ChannelWriter, MessageSink};
pub use rendezvous::{Rendezvous, RendezvousError, Role};
pub use wire::{CodecError, Intent, MessageKind, PageTarget, ProtocolMessage};
