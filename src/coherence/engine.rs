// CLASSIFICATION: COMMUNITY
// Filename: engine.rs v0.1
// Author: Lukas Bower
// Date Modified: 2027-09-02

//! MSI coherence engine for one peer.
//!
//! Local operations ([`CoherenceEngine::read`], [`CoherenceEngine::write`])
//! run on the dispatcher thread and may block on a page's slot until the
//! inbound receiver ([`CoherenceEngine::serve`]) applies the peer's answer.
//!
//! Writes are synchronous: the writer claims `Modified`, sends
//! Request(Modified) and stores its bytes only after the peer acknowledges.
//! When both peers claim the same page at once, the initiator keeps its
//! claim and the responder yields and retries. Messages for a page are sent
//! while that page's slot is locked, so the order on the wire matches the
//! order of state changes.

use std::ops::Range;
use std::sync::{Arc, MutexGuard};

use log::{debug, trace, warn};

use crate::coherence::state::PageState;
use crate::coherence::stats::{ProtocolStats, StatsSnapshot};
use crate::coherence::table::{FetchStatus, InvalidateStatus, PageEntry, PageSlot, PageTable};
use crate::coherence::CoherenceError;
use crate::memory::Region;
use crate::net::{ChannelError, ChannelReader, Intent, MessageKind, MessageSink, PageTarget, ProtocolMessage, Role};

/// Result of a coherent page read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRead {
    /// Valid page bytes.
    Data(Vec<u8>),
    /// The peer had no valid copy to share.
    Empty,
}

/// Per-peer coherence engine.
pub struct CoherenceEngine {
    region: Arc<Region>,
    table: PageTable,
    sink: Arc<dyn MessageSink>,
    role: Role,
    stats: ProtocolStats,
}

impl CoherenceEngine {
    /// Engine over `region`; every page starts [`PageState::Invalid`].
    pub fn new(region: Arc<Region>, sink: Arc<dyn MessageSink>, role: Role) -> Self {
        let table = PageTable::new(region.page_count());
        Self {
            region,
            table,
            sink,
            role,
            stats: ProtocolStats::default(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.table.len()
    }

    pub fn region(&self) -> &Arc<Region> {
        &self.region
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Coherence state of one page. Never touches memory or the network.
    pub fn state(&self, page: usize) -> Result<PageState, CoherenceError> {
        self.table.state(page)
    }

    /// Gain exclusive ownership of `page`, then overwrite it with `bytes`
    /// (truncated or zero-padded to one page).
    pub fn write(&self, page: usize, bytes: &[u8]) -> Result<(), CoherenceError> {
        let slot = self.table.slot(page)?;
        loop {
            let mut entry = slot.wait_while(slot.lock()?, |e| {
                e.invalidate != InvalidateStatus::Idle
            })?;
            if entry.state.is_exclusive() {
                self.region.write_page(page, bytes)?;
                return Ok(());
            }

            entry.claimed_from = Some(entry.state);
            entry.state = PageState::Modified;
            entry.invalidate = InvalidateStatus::Pending;
            self.send_request(Intent::Modified, page)?;

            let mut entry = slot.wait_while(entry, |e| e.invalidate == InvalidateStatus::Pending)?;
            entry.invalidate = InvalidateStatus::Idle;
            entry.claimed_from = None;
            slot.notify();
            if entry.state.is_exclusive() {
                self.region.write_page(page, bytes)?;
                return Ok(());
            }
            debug!("page {page} taken by a crossing peer request; retrying write");
        }
    }

    /// Read `page`, fetching it from the peer first when the local copy is
    /// invalid. Blocks until the peer answers.
    pub fn read(&self, page: usize) -> Result<PageRead, CoherenceError> {
        let slot = self.table.slot(page)?;
        loop {
            let mut entry = slot.wait_while(slot.lock()?, |e| e.fetch == FetchStatus::Pending)?;
            if entry.state.is_valid() {
                return Ok(PageRead::Data(self.region.read_page(page)?));
            }

            entry.fetch = FetchStatus::Pending;
            self.send_request(Intent::Shared, page)?;

            let mut entry = slot.wait_while(entry, |e| e.fetch == FetchStatus::Pending)?;
            let outcome = entry.fetch;
            entry.fetch = FetchStatus::Idle;
            slot.notify();
            match outcome {
                FetchStatus::Empty => return Ok(PageRead::Empty),
                _ if entry.state.is_valid() => {
                    return Ok(PageRead::Data(self.region.read_page(page)?))
                }
                // Invalidated again between the reply and this wake-up.
                _ => debug!("page {page} invalidated before the fetch was consumed; refetching"),
            }
        }
    }

    /// Receive and apply peer messages until the channel fails.
    pub fn serve(&self, reader: &mut ChannelReader) -> Result<(), CoherenceError> {
        loop {
            let msg = reader.recv()?;
            self.handle(msg)?;
        }
    }

    /// Apply one inbound message.
    pub fn handle(&self, msg: ProtocolMessage) -> Result<(), CoherenceError> {
        self.stats.record_received();
        match (msg.kind, msg.intent) {
            (MessageKind::Request, Intent::Modified) => self.on_invalidate_request(msg.target),
            (MessageKind::Request, Intent::Shared) => self.on_fetch_request(msg.target),
            (MessageKind::Response, Intent::Modified) => self.on_invalidate_ack(msg.target),
            (MessageKind::Response, Intent::Shared) => self.on_fetch_reply(msg.target, msg.payload),
        }
    }

    fn on_invalidate_request(&self, target: PageTarget) -> Result<(), CoherenceError> {
        // Slots stay locked until the ack is on the wire so a local write
        // cannot slip its own request in ahead of it.
        let mut held = Vec::new();
        for page in self.pages_of(target)? {
            let slot = self.table.slot(page)?;
            let mut entry = self.settled(slot)?;
            if entry.invalidate == InvalidateStatus::Pending && self.role == Role::Initiator {
                debug!("crossing write on page {page}; initiator keeps ownership");
            } else {
                self.invalidate(page, &mut entry)?;
            }
            held.push(entry);
        }
        self.send_response(ProtocolMessage::response(Intent::Modified, target, Vec::new()))?;
        drop(held);
        Ok(())
    }

    /// Lock a slot once any acknowledged local write has stored its bytes.
    /// The writer only needs this slot's lock to finish.
    fn settled<'a>(&self, slot: &'a PageSlot) -> Result<MutexGuard<'a, PageEntry>, CoherenceError> {
        slot.wait_while(slot.lock()?, |e| e.invalidate == InvalidateStatus::Acked)
    }

    fn invalidate(&self, page: usize, entry: &mut PageEntry) -> Result<(), CoherenceError> {
        trace!("page {page}: {} -> INVALID", entry.state);
        entry.state = PageState::Invalid;
        self.region.discard_page(page)?;
        self.stats.record_invalidation();
        Ok(())
    }

    fn on_fetch_request(&self, target: PageTarget) -> Result<(), CoherenceError> {
        for page in self.pages_of(target)? {
            let slot = self.table.slot(page)?;
            let mut entry = self.settled(slot)?;
            let payload = if entry.has_data() {
                trace!("page {page}: {} -> SHARED (serving peer)", entry.state);
                entry.state = PageState::Shared;
                self.stats.record_fetch_served();
                self.region.read_page(page)?
            } else {
                debug!("peer asked for page {page} but the local copy is invalid");
                Vec::new()
            };
            self.send_response(ProtocolMessage::response(
                Intent::Shared,
                PageTarget::Page(page),
                payload,
            ))?;
        }
        Ok(())
    }

    fn on_invalidate_ack(&self, target: PageTarget) -> Result<(), CoherenceError> {
        for page in self.pages_of(target)? {
            let slot = self.table.slot(page)?;
            let mut entry = slot.lock()?;
            if entry.invalidate == InvalidateStatus::Pending {
                entry.invalidate = InvalidateStatus::Acked;
                slot.notify();
            } else {
                trace!("ack for page {page} with no invalidate outstanding");
            }
        }
        Ok(())
    }

    fn on_fetch_reply(&self, target: PageTarget, payload: Vec<u8>) -> Result<(), CoherenceError> {
        let PageTarget::Page(page) = target else {
            warn!("ignoring page data addressed to all pages");
            return Ok(());
        };
        let slot = self.table.slot(page)?;
        let mut entry = slot.lock()?;
        if entry.fetch != FetchStatus::Pending {
            warn!("ignoring unsolicited data for page {page}");
            return Ok(());
        }
        if payload.is_empty() {
            entry.fetch = FetchStatus::Empty;
        } else {
            if !entry.state.is_valid() {
                self.region.write_page(page, &payload)?;
                entry.state = PageState::Shared;
            }
            entry.fetch = FetchStatus::Filled;
        }
        slot.notify();
        Ok(())
    }

    fn pages_of(&self, target: PageTarget) -> Result<Range<usize>, CoherenceError> {
        match target {
            PageTarget::All => Ok(0..self.table.len()),
            PageTarget::Page(page) if page < self.table.len() => Ok(page..page + 1),
            PageTarget::Page(page) => Err(CoherenceError::PageOutOfRange {
                page,
                pages: self.table.len(),
            }),
        }
    }

    fn send_request(&self, intent: Intent, page: usize) -> Result<(), ChannelError> {
        self.sink
            .send(&ProtocolMessage::request(intent, PageTarget::Page(page)))?;
        self.stats.record_request();
        Ok(())
    }

    fn send_response(&self, msg: ProtocolMessage) -> Result<(), CoherenceError> {
        self.sink.send(&msg)?;
        self.stats.record_response();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<ProtocolMessage>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<ProtocolMessage> {
            self.sent.lock().unwrap().clone()
        }

        fn wait_for(&self, count: usize) -> Vec<ProtocolMessage> {
            for _ in 0..500 {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                thread::sleep(Duration::from_millis(2));
            }
            panic!("expected {count} messages, saw {:?}", self.sent());
        }
    }

    impl MessageSink for RecordingSink {
        fn send(&self, msg: &ProtocolMessage) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    fn engine(pages: usize, role: Role) -> (Arc<CoherenceEngine>, Arc<RecordingSink>) {
        let region = Arc::new(Region::allocate(pages).unwrap());
        let sink = Arc::new(RecordingSink::default());
        let engine = CoherenceEngine::new(region, sink.clone() as Arc<dyn MessageSink>, role);
        (Arc::new(engine), sink)
    }

    /// Drive a local write to completion by acknowledging its invalidate.
    fn write_acked(engine: &Arc<CoherenceEngine>, sink: &RecordingSink, page: usize, text: &[u8]) {
        let before = sink.sent().len();
        let writer = {
            let engine = Arc::clone(engine);
            let text = text.to_vec();
            thread::spawn(move || engine.write(page, &text))
        };
        let sent = sink.wait_for(before + 1);
        assert_eq!(
            sent[before],
            ProtocolMessage::request(Intent::Modified, PageTarget::Page(page))
        );
        engine
            .handle(ProtocolMessage::response(Intent::Modified, PageTarget::Page(page), Vec::new()))
            .unwrap();
        writer.join().unwrap().unwrap();
    }

    #[test]
    fn write_waits_for_ack_then_owns_page() {
        let (engine, sink) = engine(2, Role::Responder);
        write_acked(&engine, &sink, 1, b"A");
        assert_eq!(engine.state(1).unwrap(), PageState::Modified);
        assert_eq!(&engine.region().read_page(1).unwrap()[..1], b"A");

        engine.write(1, b"B").unwrap();
        assert_eq!(sink.sent().len(), 1, "second write on an owned page stays local");
    }

    #[test]
    fn invalidate_request_drops_copy_and_acks() {
        let (engine, sink) = engine(1, Role::Responder);
        write_acked(&engine, &sink, 0, b"mine");
        engine
            .handle(ProtocolMessage::request(Intent::Modified, PageTarget::Page(0)))
            .unwrap();
        assert_eq!(engine.state(0).unwrap(), PageState::Invalid);
        assert!(engine.region().read_page(0).unwrap().iter().all(|b| *b == 0));
        assert_eq!(
            sink.sent().last().unwrap(),
            &ProtocolMessage::response(Intent::Modified, PageTarget::Page(0), Vec::new())
        );
    }

    #[test]
    fn fetch_of_invalid_page_answers_empty() {
        let (engine, sink) = engine(1, Role::Initiator);
        engine
            .handle(ProtocolMessage::request(Intent::Shared, PageTarget::Page(0)))
            .unwrap();
        let reply = sink.sent().pop().unwrap();
        assert_eq!(reply.kind, MessageKind::Response);
        assert_eq!(reply.intent, Intent::Shared);
        assert!(reply.payload.is_empty());
        assert_eq!(engine.state(0).unwrap(), PageState::Invalid);
    }

    #[test]
    fn fetch_of_modified_page_downgrades_and_ships_bytes() {
        let (engine, sink) = engine(1, Role::Initiator);
        write_acked(&engine, &sink, 0, b"A");
        engine
            .handle(ProtocolMessage::request(Intent::Shared, PageTarget::Page(0)))
            .unwrap();
        let reply = sink.sent().pop().unwrap();
        assert_eq!(reply.payload.len(), engine.region().page_size());
        assert_eq!(&reply.payload[..2], b"A\0");
        assert_eq!(engine.state(0).unwrap(), PageState::Shared);
        assert_eq!(engine.stats().fetches_served, 1);
    }

    #[test]
    fn read_blocks_until_reply_installs_page() {
        let (engine, sink) = engine(2, Role::Responder);
        let reader = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.read(0))
        };
        let sent = sink.wait_for(1);
        assert_eq!(sent[0], ProtocolMessage::request(Intent::Shared, PageTarget::Page(0)));
        engine
            .handle(ProtocolMessage::response(Intent::Shared, PageTarget::Page(0), b"A\0".to_vec()))
            .unwrap();
        match reader.join().unwrap().unwrap() {
            PageRead::Data(bytes) => assert_eq!(&bytes[..2], b"A\0"),
            PageRead::Empty => panic!("expected page data"),
        }
        assert_eq!(engine.state(0).unwrap(), PageState::Shared);
        assert_eq!(engine.state(1).unwrap(), PageState::Invalid);
    }

    #[test]
    fn empty_reply_wakes_reader_without_data() {
        let (engine, sink) = engine(1, Role::Responder);
        let reader = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.read(0))
        };
        sink.wait_for(1);
        engine
            .handle(ProtocolMessage::response(Intent::Shared, PageTarget::Page(0), Vec::new()))
            .unwrap();
        assert_eq!(reader.join().unwrap().unwrap(), PageRead::Empty);
        assert_eq!(engine.state(0).unwrap(), PageState::Invalid);
    }

    #[test]
    fn unsolicited_data_is_ignored() {
        let (engine, _sink) = engine(1, Role::Responder);
        engine
            .handle(ProtocolMessage::response(Intent::Shared, PageTarget::Page(0), b"x".to_vec()))
            .unwrap();
        assert_eq!(engine.state(0).unwrap(), PageState::Invalid);
    }

    #[test]
    fn all_pages_sentinel_fans_out() {
        let (engine, sink) = engine(3, Role::Initiator);
        write_acked(&engine, &sink, 1, b"one");
        engine
            .handle(ProtocolMessage::request(Intent::Shared, PageTarget::All))
            .unwrap();
        let replies: Vec<_> = sink.sent().into_iter().skip(1).collect();
        let targets: Vec<_> = replies.iter().map(|m| m.target).collect();
        assert_eq!(
            targets,
            vec![PageTarget::Page(0), PageTarget::Page(1), PageTarget::Page(2)]
        );
        assert!(replies[0].payload.is_empty());
        assert_eq!(&replies[1].payload[..3], b"one");

        engine
            .handle(ProtocolMessage::request(Intent::Modified, PageTarget::All))
            .unwrap();
        for page in 0..3 {
            assert_eq!(engine.state(page).unwrap(), PageState::Invalid);
        }
        assert_eq!(sink.sent().last().unwrap().target, PageTarget::All);
    }

    #[test]
    fn inbound_page_out_of_range_is_fatal() {
        let (engine, _sink) = engine(1, Role::Initiator);
        let err = engine
            .handle(ProtocolMessage::request(Intent::Modified, PageTarget::Page(5)))
            .unwrap_err();
        assert!(matches!(err, CoherenceError::PageOutOfRange { page: 5, pages: 1 }));
    }

    #[test]
    fn initiator_keeps_page_on_crossing_write() {
        let (engine, sink) = engine(1, Role::Initiator);
        let writer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.write(0, b"initiator"))
        };
        sink.wait_for(1);
        engine
            .handle(ProtocolMessage::request(Intent::Modified, PageTarget::Page(0)))
            .unwrap();
        assert_eq!(engine.state(0).unwrap(), PageState::Modified);
        engine
            .handle(ProtocolMessage::response(Intent::Modified, PageTarget::Page(0), Vec::new()))
            .unwrap();
        writer.join().unwrap().unwrap();
        assert_eq!(&engine.region().read_page(0).unwrap()[..9], b"initiator");
    }

    #[test]
    fn responder_yields_and_retries_on_crossing_write() {
        let (engine, sink) = engine(1, Role::Responder);
        let writer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.write(0, b"responder"))
        };
        sink.wait_for(1);
        engine
            .handle(ProtocolMessage::request(Intent::Modified, PageTarget::Page(0)))
            .unwrap();
        assert_eq!(engine.state(0).unwrap(), PageState::Invalid);
        engine
            .handle(ProtocolMessage::response(Intent::Modified, PageTarget::Page(0), Vec::new()))
            .unwrap();

        // sent so far: first claim, ack to the peer, retried claim.
        let sent = sink.wait_for(3);
        assert_eq!(sent[2], ProtocolMessage::request(Intent::Modified, PageTarget::Page(0)));
        engine
            .handle(ProtocolMessage::response(Intent::Modified, PageTarget::Page(0), Vec::new()))
            .unwrap();
        writer.join().unwrap().unwrap();
        assert_eq!(engine.state(0).unwrap(), PageState::Modified);
        assert_eq!(engine.stats().requests_sent, 2);
    }

    #[test]
    fn fetch_behind_ack_waits_for_stored_bytes() {
        for _ in 0..50 {
            let (engine, sink) = engine(1, Role::Responder);
            let writer = {
                let engine = Arc::clone(&engine);
                thread::spawn(move || engine.write(0, b"NEW"))
            };
            sink.wait_for(1);
            engine
                .handle(ProtocolMessage::response(Intent::Modified, PageTarget::Page(0), Vec::new()))
                .unwrap();
            engine
                .handle(ProtocolMessage::request(Intent::Shared, PageTarget::Page(0)))
                .unwrap();
            writer.join().unwrap().unwrap();

            let reply = sink.sent().pop().unwrap();
            assert_eq!(reply.intent, Intent::Shared);
            assert_eq!(&reply.payload[..4], b"NEW\0");
            assert_eq!(engine.state(0).unwrap(), PageState::Shared);
        }
    }

    #[test]
    fn fetch_during_claim_from_invalid_answers_empty() {
        let (engine, sink) = engine(1, Role::Responder);
        let writer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.write(0, b"late"))
        };
        sink.wait_for(1);
        engine
            .handle(ProtocolMessage::request(Intent::Shared, PageTarget::Page(0)))
            .unwrap();
        let reply = sink.sent().pop().unwrap();
        assert_eq!(reply.target, PageTarget::Page(0));
        assert!(reply.payload.is_empty());
        assert_eq!(engine.state(0).unwrap(), PageState::Modified);
        assert_eq!(engine.stats().fetches_served, 0);

        engine
            .handle(ProtocolMessage::response(Intent::Modified, PageTarget::Page(0), Vec::new()))
            .unwrap();
        writer.join().unwrap().unwrap();
        assert_eq!(&engine.region().read_page(0).unwrap()[..4], b"late");
    }
}
