//! Query Module
//!
//! A compiled query reads records from a cursor, assembles them into
//! transaction groups and hands each selected group to a dispatch
//! callback.
//!
//! ## Responsibilities
//! - Compile the query text and normalise the grouping mode
//! - Own the cursor between acquisition and loss
//! - Run one dispatch step and classify its outcome
//!
//! ## Callback Boundary
//! The callback is a plain `fn` pointer plus an address-sized [`Token`];
//! whatever state it needs is looked up through the handle registry.

mod expr;
mod group;
mod grouping;
mod reader;

use bytes::Bytes;

use crate::error::{Result, VslError};
use crate::record::{decode, decode_header, Record};
use crate::registry::Token;
use crate::transport::{Cursor, CursorStep};

use expr::Expr;
use group::Assembler;

pub use group::{Transaction, TransactionKind, DEFAULT_PENDING_LIMIT};
pub use grouping::Grouping;
pub use reader::LogReader;

/// Records read from the cursor per dispatch step at most
pub const STEP_RECORDS: usize = 1024;

/// Dispatch callback: receives one group, non-zero aborts the step
pub type DispatchFn = fn(&[Transaction], Token) -> i32;

/// Outcome of one dispatch step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// Work was done and more may be ready
    Progress,

    /// Nothing to do yet
    Idle,

    /// Cursor reached its end; in-flight groups were flushed
    EndOfStream,

    /// Cursor invalidated by a writer restart
    Abandoned,

    /// Cursor fell behind the writer's retention
    Overrun,

    /// A record header carried an unrecognised version
    UnknownFormat(u8),

    /// The callback returned this non-zero value
    Callback(i32),
}

/// Compiled query with its cursor slot
pub struct Query {
    text: String,
    expr: Option<Expr>,
    grouping: Grouping,
    cursor: Option<Box<dyn Cursor>>,
    assembler: Assembler,
}

impl Query {
    /// Compile `text`; an empty (or blank) text selects every group
    pub fn compile(text: &str, grouping: Grouping) -> Result<Self> {
        let expr = if text.trim().is_empty() {
            None
        } else {
            Some(Expr::compile(text)?)
        };

        Ok(Self {
            text: text.to_string(),
            expr,
            grouping,
            cursor: None,
            assembler: Assembler::new(grouping),
        })
    }

    /// Compile with a raw grouping value (out-of-range values mean `Vxid`)
    pub fn compile_raw(text: &str, grouping: u32) -> Result<Self> {
        Self::compile(text, Grouping::from_raw(grouping))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn grouping(&self) -> Grouping {
        self.grouping
    }

    /// Install a cursor, replacing (and dropping) any previous one
    pub fn set_cursor(&mut self, cursor: Box<dyn Cursor>) {
        self.assembler.clear();
        self.cursor = Some(cursor);
    }

    /// Drop the cursor and everything assembled from it
    pub fn clear_cursor(&mut self) {
        self.assembler.clear();
        self.cursor = None;
    }

    pub fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    /// Cap on transactions held while waiting for their `End` record
    pub fn set_pending_limit(&mut self, limit: usize) {
        self.assembler.set_limit(limit);
    }

    /// Whether `group` satisfies the query
    pub fn selects(&self, group: &[Transaction]) -> bool {
        let expr = match &self.expr {
            Some(expr) => expr,
            None => return true,
        };
        let records: Vec<Record> = group
            .iter()
            .flat_map(|tx| tx.records.iter())
            .filter_map(|raw| decode(raw).ok())
            .collect();
        expr.matches(&records)
    }

    /// Run one dispatch step
    ///
    /// Reads up to [`STEP_RECORDS`] records, delivering every completed
    /// group the query selects. Without a cursor the step reports
    /// `Abandoned`.
    pub fn dispatch(&mut self, callback: DispatchFn, token: Token) -> StepResult {
        let mut consumed = false;

        for _ in 0..STEP_RECORDS {
            let step = match self.cursor.as_mut() {
                Some(cursor) => cursor.next(),
                None => return StepResult::Abandoned,
            };

            match step {
                CursorStep::Record(raw) => {
                    consumed = true;
                    if let Some(result) = self.ingest(raw, callback, token) {
                        return result;
                    }
                }
                CursorStep::Idle => {
                    return if consumed {
                        StepResult::Progress
                    } else {
                        StepResult::Idle
                    };
                }
                CursorStep::End => {
                    for group in self.assembler.flush() {
                        if let Some(result) = self.deliver(&group, callback, token) {
                            return result;
                        }
                    }
                    return StepResult::EndOfStream;
                }
                CursorStep::Abandoned => {
                    self.clear_cursor();
                    return StepResult::Abandoned;
                }
                CursorStep::Overrun => {
                    self.clear_cursor();
                    return StepResult::Overrun;
                }
            }
        }

        StepResult::Progress
    }

    /// Feed one record; `Some` ends the step early
    fn ingest(&mut self, raw: Bytes, callback: DispatchFn, token: Token) -> Option<StepResult> {
        let header = match decode_header(&raw) {
            Ok(header) => header,
            Err(VslError::UnknownFormat { version }) => {
                return Some(StepResult::UnknownFormat(version));
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed record");
                return None;
            }
        };

        for group in self.assembler.push(&header, raw) {
            if let Some(result) = self.deliver(&group, callback, token) {
                return Some(result);
            }
        }
        None
    }

    fn deliver(
        &self,
        group: &[Transaction],
        callback: DispatchFn,
        token: Token,
    ) -> Option<StepResult> {
        if !self.selects(group) {
            return None;
        }
        match callback(group, token) {
            0 => None,
            rc => Some(StepResult::Callback(rc)),
        }
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("text", &self.text)
            .field("grouping", &self.grouping)
            .field("has_cursor", &self.cursor.is_some())
            .field("pending", &self.assembler.pending())
            .finish()
    }
}
