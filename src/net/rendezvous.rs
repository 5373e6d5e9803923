// CLASSIFICATION: COMMUNITY
// Filename: rendezvous.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Two-peer rendezvous over TCP.
//!
//! Each peer binds its own listener and then tries one connect to the other.
//! A successful connect means the other side was already waiting, so this
//! side claims [`Role::Responder`]; a refused connect claims
//! [`Role::Initiator`], which accepts first and connects back afterwards.
//! One synchronization byte carrying the claim crosses each direction before
//! any payload. If both sides claimed responder (simultaneous start) the
//! lower listen port becomes initiator, so the election is always unanimous.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};

use log::{debug, info};
use thiserror::Error;

use crate::config::DsmConfig;
use crate::net::channel::{ChannelReader, ChannelWriter};

const CLAIM_INITIATOR: u8 = 0;
const CLAIM_RESPONDER: u8 = 1;

/// Errors raised while establishing the peer connection. All are fatal.
#[derive(Debug, Error)]
pub enum RendezvousError {
    #[error("bind to port {port} failed: {source}")]
    Bind { port: u16, source: io::Error },
    #[error("accept on port {port} failed: {source}")]
    Accept { port: u16, source: io::Error },
    #[error("connect to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        source: io::Error,
    },
    #[error("synchronization byte exchange failed: {0}")]
    Sync(#[source] io::Error),
    #[error("peer sent unknown synchronization byte {0}")]
    UnknownClaim(u8),
}

/// Role agreed on by both peers after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the shared region and sends its descriptor.
    Initiator,
    /// Maps the region at the address the initiator sends.
    Responder,
}

impl Role {
    fn claim_byte(self) -> u8 {
        match self {
            Role::Initiator => CLAIM_INITIATOR,
            Role::Responder => CLAIM_RESPONDER,
        }
    }

    fn from_claim(byte: u8) -> Result<Self, RendezvousError> {
        match byte {
            CLAIM_INITIATOR => Ok(Role::Initiator),
            CLAIM_RESPONDER => Ok(Role::Responder),
            other => Err(RendezvousError::UnknownClaim(other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

/// Settle the final role from both claims.
fn elect(mine: Role, theirs: Role, listen_port: u16, peer_port: u16) -> Role {
    if mine != theirs {
        return mine;
    }
    if listen_port < peer_port {
        Role::Initiator
    } else {
        Role::Responder
    }
}

/// An established peer connection: one stream per direction.
#[derive(Debug)]
pub struct Rendezvous {
    role: Role,
    inbound: TcpStream,
    outbound: TcpStream,
}

impl Rendezvous {
    /// Run the handshake described in the module docs. Blocks until the
    /// peer shows up.
    pub fn establish(config: &DsmConfig) -> Result<Self, RendezvousError> {
        let listen_port = config.listen_port;
        let listener = TcpListener::bind(("0.0.0.0", listen_port)).map_err(|source| {
            RendezvousError::Bind {
                port: listen_port,
                source,
            }
        })?;
        info!("listening on port {listen_port}");

        let connect = || {
            TcpStream::connect((config.peer_host.as_str(), config.peer_port)).map_err(|source| {
                RendezvousError::Connect {
                    host: config.peer_host.clone(),
                    port: config.peer_port,
                    source,
                }
            })
        };
        let accept = || {
            listener
                .accept()
                .map(|(stream, addr)| {
                    debug!("accepted peer connection from {addr}");
                    stream
                })
                .map_err(|source| RendezvousError::Accept {
                    port: listen_port,
                    source,
                })
        };

        let (claim, mut inbound, outbound) = match connect() {
            Ok(mut outbound) => {
                debug!("peer already listening; claiming responder");
                send_claim(&mut outbound, Role::Responder)?;
                let inbound = accept()?;
                (Role::Responder, inbound, outbound)
            }
            Err(err) => {
                debug!("{err}; claiming initiator and waiting for peer");
                let inbound = accept()?;
                let mut outbound = connect()?;
                send_claim(&mut outbound, Role::Initiator)?;
                (Role::Initiator, inbound, outbound)
            }
        };

        let theirs = recv_claim(&mut inbound)?;
        let role = elect(claim, theirs, listen_port, config.peer_port);
        for stream in [&inbound, &outbound] {
            stream.set_nodelay(true).map_err(RendezvousError::Sync)?;
        }
        info!("rendezvous complete: this peer is the {role}");
        Ok(Self {
            role,
            inbound,
            outbound,
        })
    }

    /// Wrap two already-connected streams, skipping the handshake.
    pub fn from_streams(role: Role, inbound: TcpStream, outbound: TcpStream) -> Self {
        Self {
            role,
            inbound,
            outbound,
        }
    }

    /// Role elected for this peer.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Split into the framed reader and writer halves used by the engine.
    pub fn into_channel(self, page_size: usize) -> (ChannelReader, ChannelWriter) {
        (
            ChannelReader::new(self.inbound, page_size),
            ChannelWriter::new(self.outbound, page_size),
        )
    }
}

fn send_claim(stream: &mut TcpStream, role: Role) -> Result<(), RendezvousError> {
    stream
        .write_all(&[role.claim_byte()])
        .map_err(RendezvousError::Sync)
}

fn recv_claim(stream: &mut TcpStream) -> Result<Role, RendezvousError> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte).map_err(RendezvousError::Sync)?;
    Role::from_claim(byte[0])
}
