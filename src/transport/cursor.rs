//! Cursor over an in-process segment

use std::sync::Arc;

use parking_lot::RwLock;

use super::memory::SegmentState;
use super::{Cursor, CursorStep};

pub(super) struct MemoryCursor {
    state: Arc<RwLock<SegmentState>>,

    /// Writer epoch the cursor was made in
    epoch: u64,

    /// Sequence number of the next record to return
    position: u64,

    /// TAILSTOP limit
    stop_at: Option<u64>,

    batch: bool,
}

impl MemoryCursor {
    pub(super) fn new(
        state: Arc<RwLock<SegmentState>>,
        epoch: u64,
        position: u64,
        stop_at: Option<u64>,
        batch: bool,
    ) -> Self {
        Self {
            state,
            epoch,
            position,
            stop_at,
            batch,
        }
    }
}

impl Cursor for MemoryCursor {
    fn next(&mut self) -> CursorStep {
        let state = self.state.read();

        if state.epoch != self.epoch {
            return CursorStep::Abandoned;
        }
        if self.position < state.first_seq {
            return CursorStep::Overrun;
        }
        if self.stop_at.is_some_and(|stop| self.position >= stop) {
            return CursorStep::End;
        }
        if self.position >= state.head_seq() {
            return if self.batch {
                CursorStep::End
            } else {
                CursorStep::Idle
            };
        }

        let index = (self.position - state.first_seq) as usize;
        self.position += 1;
        CursorStep::Record(state.records[index].clone())
    }
}
