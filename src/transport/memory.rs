//! In-process segment
//!
//! A log region bounded by a word budget plus a counter directory, shared
//! between a writer and any number of attached readers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{Result, VslError};
use crate::record::{encode_record, record_len, FormatVersion, Side};
use crate::registry::Token;

use super::cursor::MemoryCursor;
use super::{CounterFn, CounterPoint, Cursor, CursorOptions, Transport, WriterStatus};

/// Default log region size in 32-bit words (1 MiB)
pub const DEFAULT_CAPACITY_WORDS: usize = 256 * 1024;

#[derive(Debug, Clone)]
struct Counter {
    section: String,
    ident: String,
    field: String,
    value: u64,
}

pub(super) struct SegmentState {
    /// Bumped on every writer restart
    pub(super) epoch: u64,

    /// Retained records, oldest first
    pub(super) records: VecDeque<Bytes>,

    /// Sequence number of `records[0]`
    pub(super) first_seq: u64,

    words: usize,
    capacity_words: usize,
    counters: Vec<Counter>,

    /// Cursor acquisitions still to fail
    cursor_failures: usize,
}

impl SegmentState {
    /// Sequence number the next appended record will get
    pub(super) fn head_seq(&self) -> u64 {
        self.first_seq + self.records.len() as u64
    }
}

/// Shared in-process segment; clones refer to the same segment
#[derive(Clone)]
pub struct MemorySegment {
    state: Arc<RwLock<SegmentState>>,
}

impl MemorySegment {
    /// Create a segment with the default log region size
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY_WORDS)
    }

    /// Create a segment whose log region holds `capacity_words` words
    pub fn with_capacity(capacity_words: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(SegmentState {
                epoch: 0,
                records: VecDeque::new(),
                first_seq: 0,
                words: 0,
                capacity_words,
                counters: Vec::new(),
                cursor_failures: 0,
            })),
        }
    }

    // =========================================================================
    // Writer side
    // =========================================================================

    /// Append one raw record, evicting the oldest records to make room
    ///
    /// Only the header is checked (for its size); the payload is stored
    /// as given. Records of a header version this crate does not know are
    /// stored unchecked. Returns the record's sequence number.
    pub fn append(&self, raw: Bytes) -> Result<u64> {
        match record_len(&raw) {
            Ok(len) if raw.len() < len => {
                return Err(VslError::Truncated(format!(
                    "record declares {} bytes, got {}",
                    len,
                    raw.len()
                )));
            }
            Ok(_) | Err(VslError::UnknownFormat { .. }) => {}
            Err(e) => return Err(e),
        }

        let words = raw.len().div_ceil(4);
        let mut state = self.state.write();
        if words > state.capacity_words {
            return Err(VslError::Config(format!(
                "record of {} words exceeds log capacity of {} words",
                words, state.capacity_words
            )));
        }

        let seq = state.head_seq();
        state.records.push_back(raw);
        state.words += words;

        while state.words > state.capacity_words {
            if let Some(evicted) = state.records.pop_front() {
                state.words -= evicted.len().div_ceil(4);
                state.first_seq += 1;
            }
        }

        Ok(seq)
    }

    /// Encode and append a record
    pub fn write(
        &self,
        version: FormatVersion,
        tag: u8,
        vxid: u64,
        side: Side,
        payload: &str,
    ) -> Result<u64> {
        self.append(encode_record(version, tag, vxid, side, payload.as_bytes()))
    }

    /// Simulate a writer restart: the log starts over and every existing
    /// cursor is abandoned
    pub fn restart_writer(&self) {
        let mut state = self.state.write();
        state.epoch += 1;
        let head = state.head_seq();
        state.records.clear();
        state.words = 0;
        state.first_seq = head;
        tracing::debug!(epoch = state.epoch, "writer restarted");
    }

    /// Set a counter, creating it if needed
    pub fn set_counter(&self, section: &str, ident: &str, field: &str, value: u64) {
        let mut state = self.state.write();
        match state
            .counters
            .iter_mut()
            .find(|c| c.section == section && c.ident == ident && c.field == field)
        {
            Some(counter) => counter.value = value,
            None => state.counters.push(Counter {
                section: section.to_string(),
                ident: ident.to_string(),
                field: field.to_string(),
                value,
            }),
        }
    }

    /// Add `delta` to a counter, creating it at zero if needed
    pub fn add_counter(&self, section: &str, ident: &str, field: &str, delta: u64) {
        let current = {
            let state = self.state.read();
            state
                .counters
                .iter()
                .find(|c| c.section == section && c.ident == ident && c.field == field)
                .map(|c| c.value)
                .unwrap_or(0)
        };
        self.set_counter(section, ident, field, current.wrapping_add(delta));
    }

    /// Make the next `count` cursor acquisitions fail
    pub fn fail_cursors(&self, count: usize) {
        self.state.write().cursor_failures = count;
    }

    // =========================================================================
    // Reader side
    // =========================================================================

    /// Attach a reader to this segment
    pub fn attach(&self) -> Arc<dyn Transport> {
        let epoch = self.state.read().epoch;
        Arc::new(MemoryTransport {
            state: Arc::clone(&self.state),
            seen_epoch: AtomicU64::new(epoch),
        })
    }

    /// Current writer epoch
    pub fn epoch(&self) -> u64 {
        self.state.read().epoch
    }

    /// Number of records currently retained
    pub fn retained(&self) -> usize {
        self.state.read().records.len()
    }

    /// Sequence number of the oldest retained record
    pub fn first_seq(&self) -> u64 {
        self.state.read().first_seq
    }
}

impl Default for MemorySegment {
    fn default() -> Self {
        Self::new()
    }
}

/// A reader's attachment to a [`MemorySegment`]
struct MemoryTransport {
    state: Arc<RwLock<SegmentState>>,

    /// Writer epoch at the last status poll
    seen_epoch: AtomicU64,
}

impl Transport for MemoryTransport {
    fn cursor(&self, options: CursorOptions) -> std::result::Result<Box<dyn Cursor>, String> {
        let mut state = self.state.write();
        if state.cursor_failures > 0 {
            state.cursor_failures -= 1;
            return Err("Log region not ready".to_string());
        }

        let head = state.head_seq();
        let start = if options.contains(CursorOptions::TAIL) {
            head
        } else {
            state.first_seq
        };
        let stop_at = options.contains(CursorOptions::TAILSTOP).then_some(head);

        Ok(Box::new(MemoryCursor::new(
            Arc::clone(&self.state),
            state.epoch,
            start,
            stop_at,
            options.contains(CursorOptions::BATCH),
        )))
    }

    fn status(&self) -> WriterStatus {
        let epoch = self.state.read().epoch;
        if self.seen_epoch.swap(epoch, Ordering::AcqRel) != epoch {
            WriterStatus::Restarted
        } else {
            WriterStatus::Unchanged
        }
    }

    fn iter_counters(&self, callback: CounterFn, token: Token) -> i32 {
        let counters = self.state.read().counters.clone();
        for counter in &counters {
            let point = CounterPoint {
                section: &counter.section,
                ident: &counter.ident,
                field: &counter.field,
                value: counter.value,
            };
            let rc = callback(&point, token);
            if rc != 0 {
                return rc;
            }
        }
        0
    }
}
