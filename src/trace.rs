//! This module provides the debug/trace sink: a `record(event_kind, guest_pc, host_pc, payload)`
//! collaborator that block discovery and the dispatch loop call into at the interesting moments
//! (block translate start/end, cache hit/miss, unknown instruction, buffer overflow). A ring
//! buffer plus `log` output is cheap enough to always carry, and makes the rest of the core
//! trivially debuggable without pulling in a tracing framework.

use std::collections::VecDeque;

/// The kind of event recorded by a [`TraceSink`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventKind {
    /// A block translation started at the given guest PC.
    BlockTranslateStart,
    /// A block translation finished and was committed to the cache.
    BlockTranslateEnd,
    /// A cache lookup was satisfied by an existing entry.
    CacheHit,
    /// A cache lookup found nothing at the computed slot.
    CacheMiss,
    /// A decoded instruction could not be classified.
    UnknownInstruction,
    /// A code buffer overflowed while translating a block.
    BufferOverflow,
}

/// One recorded event.
#[derive(Clone, Copy, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub guest_pc: u64,
    pub host_pc: u64,
    pub payload: u64,
}

/// A fixed-capacity ring buffer of events, plus `log` crate output at the same call sites.
/// Dropping the oldest event to make room for a new one is not an error; this sink is for
/// interactive inspection, not for an audit trail.
pub struct TraceSink {
    capacity: usize,
    events: VecDeque<Event>,
}

impl TraceSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: VecDeque::with_capacity(capacity),
        }
    }

    /// Records one event, evicting the oldest entry if the ring buffer is full, and emits a
    /// `log::trace!` line with the same information.
    pub fn record(&mut self, kind: EventKind, guest_pc: u64, host_pc: u64, payload: u64) {
        log::trace!(
            "{:?} guest_pc=0x{:x} host_pc=0x{:x} payload=0x{:x}",
            kind,
            guest_pc,
            host_pc,
            payload,
        );

        if self.events.len() == self.capacity {
            self.events.pop_front();
        }

        self.events.push_back(Event { kind, guest_pc, host_pc, payload });
    }

    /// Returns the events currently held, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for TraceSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut sink = TraceSink::new(2);
        sink.record(EventKind::CacheMiss, 1, 0, 0);
        sink.record(EventKind::CacheHit, 2, 0, 0);
        sink.record(EventKind::CacheHit, 3, 0, 0);

        let guest_pcs: Vec<u64> = sink.events().map(|e| e.guest_pc).collect();
        assert_eq!(guest_pcs, vec![2, 3]);
    }
}
