//! Engine Module
//!
//! The log streaming engine: drives a query over a connection and feeds
//! decoded records to a handler.
//!
//! ## State Machine
//! ```text
//!   Querying ──► Reacquiring ⇄ Dispatching ──► Stopped | Failed
//! ```
//! - **Querying**: build the reader and compile the query
//! - **Reacquiring**: get a fresh cursor; failures are retried
//! - **Dispatching**: run dispatch steps until the stream ends, fails, the
//!   handler aborts, or a stop is requested
//!
//! ## Handler Boundary
//! The handler travels through the handle registry: the dispatch callback
//! only receives a token. The registration is released after the loop has
//! returned, so no callback can outlive it.

use std::fmt;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::connection::Connection;
use crate::error::{Result, VslError};
use crate::query::{Grouping, LogReader, Query, StepResult, Transaction};
use crate::record::{decode, Record};
use crate::registry::{handles, Token};
use crate::transport::{CursorOptions, Transport, WriterStatus};

/// Return code the dispatch callback uses after recording a fault
const FAULT: i32 = -1;

/// Per-record handler
///
/// A non-zero return aborts the current dispatch step and ends the
/// streaming call with [`StreamExit::Aborted`].
pub trait LogHandler: Send + 'static {
    fn handle(&mut self, record: &Record) -> i32;
}

impl<F> LogHandler for F
where
    F: FnMut(&Record) -> i32 + Send + 'static,
{
    fn handle(&mut self, record: &Record) -> i32 {
        self(record)
    }
}

/// How a streaming call ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// The cursor reached its end
    EndOfStream,

    /// A stop was requested or the connection closed
    Stopped,

    /// The handler returned this non-zero value
    Aborted(i32),
}

/// Parameters of one streaming call
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub query: String,
    pub grouping: Grouping,
    pub cursor_options: CursorOptions,
    pub reattach: bool,
    pub idle_interval: Duration,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
}

impl StreamRequest {
    /// Streaming parameters taken from a connection config
    pub fn from_config(config: &Config) -> Self {
        Self {
            query: config.query.clone(),
            grouping: config.grouping,
            cursor_options: config.cursor_options,
            reattach: config.reattach,
            idle_interval: Duration::from_millis(config.idle_interval_ms),
            include_tags: config.include_tags.clone(),
            exclude_tags: config.exclude_tags.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Reacquiring,
    Dispatching,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Reacquiring => f.write_str("reacquiring"),
            StreamState::Dispatching => f.write_str("dispatching"),
        }
    }
}

/// What the dispatch callback finds behind its token
struct DispatchContext {
    handler: Mutex<Box<dyn LogHandler>>,
    reader: LogReader,

    /// Error raised inside the callback, reported instead of its code
    fault: Mutex<Option<VslError>>,
}

impl DispatchContext {
    fn take_fault(&self) -> Option<VslError> {
        self.fault.lock().take()
    }
}

/// Walk every transaction of a group and hand matching records to the
/// registered handler
fn dispatch_callback(transactions: &[Transaction], token: Token) -> i32 {
    let ctx = handles().lookup::<DispatchContext>(token);

    for tx in transactions {
        for raw in &tx.records {
            let record = match decode(raw) {
                Ok(record) => record,
                Err(e) => {
                    *ctx.fault.lock() = Some(e);
                    return FAULT;
                }
            };
            if !ctx.reader.matches(&record) {
                continue;
            }
            let rc = ctx.handler.lock().handle(&record);
            if rc != 0 {
                return rc;
            }
        }
    }
    0
}

impl Connection {
    /// Stream records using the query, grouping and options of the config
    pub fn log<H: LogHandler>(&self, handler: H) -> Result<StreamExit> {
        let request = StreamRequest::from_config(self.config());
        self.stream_with(&request, handler)
    }

    /// Stream records with an explicit query and grouping
    pub fn log_query<H: LogHandler>(
        &self,
        query: &str,
        grouping: Grouping,
        handler: H,
    ) -> Result<StreamExit> {
        let mut request = StreamRequest::from_config(self.config());
        request.query = query.to_string();
        request.grouping = grouping;
        self.stream_with(&request, handler)
    }

    /// Stream records until end-of-stream, a fatal error, a handler abort
    /// or a stop request
    ///
    /// Blocks the calling thread. Only one streaming call may run on a
    /// connection at a time.
    pub fn stream_with<H: LogHandler>(
        &self,
        request: &StreamRequest,
        handler: H,
    ) -> Result<StreamExit> {
        let transport = self.transport()?;
        let mut slots = self.stream.lock();

        // Querying
        let reader = LogReader::with_tags(&request.include_tags, &request.exclude_tags)?;
        let query = Query::compile(&request.query, request.grouping)?;
        tracing::debug!(query = %request.query, grouping = %request.grouping, "query compiled");

        slots.reader = Some(reader.clone());
        let registration = handles().track(DispatchContext {
            handler: Mutex::new(Box::new(handler) as Box<dyn LogHandler>),
            reader,
            fault: Mutex::new(None),
        });

        self.enter_stream();
        let result = LogStream {
            connection: self,
            transport: transport.as_ref(),
            query: slots.query.insert(query),
            request,
            token: registration.token(),
            state: StreamState::Reacquiring,
        }
        .run();
        self.leave_stream();

        drop(registration);
        slots.release();
        drop(slots);
        drop(transport);

        // Closed from inside the handler: nobody else waited to detach
        if !self.is_alive() {
            self.detach();
        }

        match &result {
            Ok(exit) => tracing::debug!(?exit, "stream finished"),
            Err(e) => tracing::debug!(error = %e, "stream failed"),
        }
        result
    }
}

/// One running streaming call
struct LogStream<'a> {
    connection: &'a Connection,
    transport: &'a dyn Transport,
    query: &'a mut Query,
    request: &'a StreamRequest,
    token: Token,
    state: StreamState,
}

impl LogStream<'_> {
    fn run(&mut self) -> Result<StreamExit> {
        loop {
            if self.connection.take_stop() {
                tracing::debug!(state = %self.state, "stop observed");
                return Ok(StreamExit::Stopped);
            }

            match self.state {
                StreamState::Reacquiring => self.reacquire(),
                StreamState::Dispatching => {
                    if let Some(exit) = self.dispatch()? {
                        return Ok(exit);
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: StreamState) {
        tracing::trace!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    /// One cursor acquisition attempt
    fn reacquire(&mut self) {
        self.absorb_restart();

        match self.transport.cursor(self.request.cursor_options) {
            Ok(cursor) => {
                tracing::debug!(options = ?self.request.cursor_options, "cursor acquired");
                self.query.set_cursor(cursor);
                self.transition(StreamState::Dispatching);
            }
            Err(diagnostic) => {
                tracing::warn!(%diagnostic, "cursor acquisition failed, retrying");
                thread::sleep(self.request.idle_interval);
            }
        }
    }

    /// Clear a restart flag raised before acquisition; the new cursor
    /// already reads the restarted writer's log
    fn absorb_restart(&self) {
        if self.transport.status() == WriterStatus::Restarted {
            tracing::debug!("writer restart seen before cursor acquisition");
        }
    }

    /// Writer restarted or cursor abandoned: reacquire, or fail when
    /// reattachment is off
    fn lost_cursor(&mut self) -> Result<Option<StreamExit>> {
        self.query.clear_cursor();
        if !self.request.reattach {
            return Err(VslError::Abandoned);
        }
        tracing::warn!("log abandoned, reacquiring cursor");
        self.transition(StreamState::Reacquiring);
        Ok(None)
    }

    /// One dispatch step; `Some` ends the call
    fn dispatch(&mut self) -> Result<Option<StreamExit>> {
        if self.transport.status() == WriterStatus::Restarted {
            tracing::warn!("writer restarted");
            return self.lost_cursor();
        }

        let step = self.query.dispatch(dispatch_callback, self.token);
        tracing::trace!(?step, "dispatch step");

        match step {
            StepResult::Progress => Ok(None),
            StepResult::Idle => {
                thread::sleep(self.request.idle_interval);
                Ok(None)
            }
            StepResult::EndOfStream => Ok(Some(StreamExit::EndOfStream)),
            StepResult::Abandoned => self.lost_cursor(),
            StepResult::Overrun => Err(VslError::Overrun),
            StepResult::UnknownFormat(version) => Err(VslError::UnknownFormat { version }),
            StepResult::Callback(rc) => {
                let ctx = handles().lookup::<DispatchContext>(self.token);
                match ctx.take_fault() {
                    Some(fault) => Err(fault),
                    None => Ok(Some(StreamExit::Aborted(rc))),
                }
            }
        }
    }
}
