// CLASSIFICATION: COMMUNITY
// Filename: channel.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! Framed message transport over the rendezvous streams.

use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;

use log::trace;
use thiserror::Error;

use crate::memory::region::{RegionDescriptor, DESCRIPTOR_LEN};
use crate::net::wire::{CodecError, FrameHeader, ProtocolMessage, HEADER_LEN};

/// Errors raised on the peer channel. All are fatal to the process.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("peer closed the connection")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed frame: {0}")]
    Codec(#[from] CodecError),
    #[error("channel writer lock poisoned")]
    LockPoisoned,
}

/// Anything that can deliver a protocol message to the peer.
pub trait MessageSink: Send + Sync {
    /// Send one whole message.
    fn send(&self, msg: &ProtocolMessage) -> Result<(), ChannelError>;
}

/// Sending half. Shared by the dispatcher and the inbound receiver, so
/// writes are serialised per frame.
#[derive(Debug)]
pub struct ChannelWriter {
    stream: Mutex<TcpStream>,
    page_size: usize,
}

impl ChannelWriter {
    pub fn new(stream: TcpStream, page_size: usize) -> Self {
        Self {
            stream: Mutex::new(stream),
            page_size,
        }
    }

    /// Send the region descriptor. Only the initiator does this, once.
    pub fn send_descriptor(&self, descriptor: &RegionDescriptor) -> Result<(), ChannelError> {
        self.write_frame(&descriptor.encode())
    }

    fn write_frame(&self, frame: &[u8]) -> Result<(), ChannelError> {
        let mut stream = self.stream.lock().map_err(|_| ChannelError::LockPoisoned)?;
        stream.write_all(frame)?;
        stream.flush()?;
        Ok(())
    }
}

impl MessageSink for ChannelWriter {
    fn send(&self, msg: &ProtocolMessage) -> Result<(), ChannelError> {
        let frame = msg.encode(self.page_size)?;
        trace!(
            "send {:?}/{:?} for {} ({} payload bytes)",
            msg.kind,
            msg.intent,
            msg.target,
            msg.payload.len()
        );
        self.write_frame(&frame)
    }
}

/// Receiving half, owned by the inbound receiver loop.
#[derive(Debug)]
pub struct ChannelReader {
    stream: BufReader<TcpStream>,
    page_size: usize,
}

impl ChannelReader {
    pub fn new(stream: TcpStream, page_size: usize) -> Self {
        Self {
            stream: BufReader::new(stream),
            page_size,
        }
    }

    /// Block until the peer's region descriptor arrives.
    pub fn recv_descriptor(&mut self) -> Result<RegionDescriptor, ChannelError> {
        let mut raw = [0u8; DESCRIPTOR_LEN];
        self.read_header(&mut raw)?;
        Ok(RegionDescriptor::decode(&raw))
    }

    /// Block until the next whole message arrives.
    pub fn recv(&mut self) -> Result<ProtocolMessage, ChannelError> {
        let mut raw = [0u8; HEADER_LEN];
        self.read_header(&mut raw)?;
        let header = FrameHeader::decode(&raw, self.page_size)?;
        let mut payload = vec![0u8; header.payload_len];
        self.stream.read_exact(&mut payload)?;
        let msg = ProtocolMessage::from_parts(header, payload);
        trace!(
            "recv {:?}/{:?} for {} ({} payload bytes)",
            msg.kind,
            msg.intent,
            msg.target,
            msg.payload.len()
        );
        Ok(msg)
    }

    fn read_header(&mut self, buf: &mut [u8]) -> Result<(), ChannelError> {
        match self.stream.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(ChannelError::Closed),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::wire::{Intent, PageTarget};
    use std::net::TcpListener;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn messages_cross_whole() {
        let (tx, rx) = pair();
        let writer = ChannelWriter::new(tx, 4096);
        let mut reader = ChannelReader::new(rx, 4096);
        writer
            .send(&ProtocolMessage::request(Intent::Shared, PageTarget::Page(1)))
            .unwrap();
        writer
            .send(&ProtocolMessage::response(
                Intent::Shared,
                PageTarget::Page(1),
                b"hello\0".to_vec(),
            ))
            .unwrap();
        let first = reader.recv().unwrap();
        assert_eq!(first.target, PageTarget::Page(1));
        assert!(first.payload.is_empty());
        let second = reader.recv().unwrap();
        assert_eq!(second.payload, b"hello\0");
    }

    #[test]
    fn eof_between_frames_is_closed() {
        let (tx, rx) = pair();
        drop(tx);
        let mut reader = ChannelReader::new(rx, 4096);
        assert!(matches!(reader.recv(), Err(ChannelError::Closed)));
    }

    #[test]
    fn short_payload_is_an_io_error() {
        let (mut tx, rx) = pair();
        let mut frame = ProtocolMessage::response(Intent::Shared, PageTarget::Page(0), vec![7; 32])
            .encode(4096)
            .unwrap();
        frame.truncate(HEADER_LEN + 4);
        tx.write_all(&frame).unwrap();
        drop(tx);
        let mut reader = ChannelReader::new(rx, 4096);
        assert!(matches!(reader.recv(), Err(ChannelError::Io(_))));
    }

    #[test]
    fn descriptor_crosses_verbatim() {
        let (tx, rx) = pair();
        let writer = ChannelWriter::new(tx, 4096);
        let mut reader = ChannelReader::new(rx, 4096);
        let descriptor = RegionDescriptor {
            address: 0x7f00_0000_0000,
            length: 8192,
        };
        writer.send_descriptor(&descriptor).unwrap();
        assert_eq!(reader.recv_descriptor().unwrap(), descriptor);
    }
}
