//! Connection
//!
//! Owns an attached segment and the per-call log resources built on it.
//!
//! ## Resources
//! - `transport`: attached for the whole life of the connection
//! - `stream`: reader and query (which holds the cursor), present only
//!   while a streaming call runs
//!
//! ## Teardown
//! `close` flips liveness under the state lock, waits for a running
//! streaming call to observe it and return, then releases query, reader
//! and transport in that order. Every step checks whether it already ran,
//! so repeated closes are no-ops.
//!
//! Closing from the thread that runs the streaming call (a handler) cannot
//! wait for it; the call notices the closed connection on its next loop
//! iteration and finishes the teardown itself when it returns.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, VslError};
use crate::query::{LogReader, Query};
use crate::transport::{Locator, SegmentDirectory, Transport};

/// Liveness flag and stop signal, guarded together
#[derive(Debug)]
struct Liveness {
    alive: bool,
    stop_requested: bool,

    /// Thread running the streaming loop, if any
    streaming: Option<ThreadId>,
}

/// Log resources of the streaming call in progress
#[derive(Default)]
pub(crate) struct StreamSlots {
    pub(crate) reader: Option<LogReader>,
    pub(crate) query: Option<Query>,
}

impl StreamSlots {
    /// Release the query (and its cursor) before the reader
    pub(crate) fn release(&mut self) {
        if self.query.take().is_some() {
            tracing::trace!("released query");
        }
        if self.reader.take().is_some() {
            tracing::trace!("released reader");
        }
    }
}

/// A connection to one log segment
pub struct Connection {
    config: Config,

    transport: Mutex<Option<Arc<dyn Transport>>>,

    /// Held by a streaming call for its whole duration
    pub(crate) stream: Mutex<StreamSlots>,

    state: Mutex<Liveness>,
}

impl Connection {
    /// Attach to the segment named in `config` through the process-wide
    /// segment directory
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with(config, SegmentDirectory::global())
    }

    /// Attach through a specific locator
    ///
    /// Retries per `open_timeout_ms`: negative retries forever, zero makes
    /// a single attempt, positive retries until the timeout has elapsed.
    pub fn open_with(config: Config, locator: &dyn Locator) -> Result<Self> {
        config.validate()?;

        let started = Instant::now();
        let deadline = (config.open_timeout_ms > 0)
            .then(|| started + Duration::from_millis(config.open_timeout_ms as u64));
        let backoff = Duration::from_millis(config.open_retry_interval_ms);
        let mut attempts = 0u64;

        loop {
            attempts += 1;
            match locator.attach(&config.segment) {
                Ok(transport) => {
                    tracing::debug!(segment = %config.segment, attempts, "attached segment");
                    return Ok(Self {
                        config,
                        transport: Mutex::new(Some(transport)),
                        stream: Mutex::new(StreamSlots::default()),
                        state: Mutex::new(Liveness {
                            alive: true,
                            stop_requested: false,
                            streaming: None,
                        }),
                    });
                }
                Err(diagnostic) => {
                    tracing::debug!(segment = %config.segment, attempts, %diagnostic, "attach failed");

                    let pause = match (config.open_timeout_ms, deadline) {
                        (0, _) => None,
                        (_, None) => Some(backoff),
                        (_, Some(deadline)) => {
                            let now = Instant::now();
                            (now < deadline).then(|| backoff.min(deadline - now))
                        }
                    };

                    match pause {
                        Some(pause) => thread::sleep(pause),
                        None => return Err(VslError::Connection(diagnostic)),
                    }
                }
            }
        }
    }

    /// Attach to segment `name` with a timeout, default settings otherwise
    pub fn open_path(name: &str, timeout_ms: i64) -> Result<Self> {
        let config = Config::builder()
            .segment(name)
            .open_timeout_ms(timeout_ms)
            .build();
        Self::open(config)
    }

    /// Ask the running (or next) streaming call to return
    ///
    /// The loop checks once per iteration, so the call returns within one
    /// idle interval. A stop issued before a call starts ends that call.
    /// A stop still pending when a call returns for another reason is
    /// discarded and does not affect the next call.
    pub fn stop(&self) {
        self.state.lock().stop_requested = true;
    }

    /// Whether the connection has not been closed
    pub fn is_alive(&self) -> bool {
        self.state.lock().alive
    }

    /// Close the connection
    ///
    /// Blocks until a running streaming call has returned, then releases
    /// everything. Safe to call any number of times, including from inside
    /// a handler, where it returns at once and the streaming call stops.
    pub fn close(&self) {
        let from_stream = {
            let mut state = self.state.lock();
            if !state.alive {
                return;
            }
            state.alive = false;
            state.stop_requested = true;
            state.streaming == Some(thread::current().id())
        };

        if from_stream {
            tracing::debug!(segment = %self.config.segment, "close requested by the streaming call");
            return;
        }

        // Waits for the streaming call, which holds this lock throughout
        self.stream.lock().release();
        self.detach();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The attached transport, unless closed
    pub(crate) fn transport(&self) -> Result<Arc<dyn Transport>> {
        if !self.is_alive() {
            return Err(VslError::Closed);
        }
        self.transport.lock().clone().ok_or(VslError::Closed)
    }

    /// Release the transport once; later calls find it gone
    pub(crate) fn detach(&self) {
        if let Some(transport) = self.transport.lock().take() {
            transport.detach();
            tracing::debug!(segment = %self.config.segment, "detached segment");
        }
    }

    /// Record the thread that runs the streaming loop
    pub(crate) fn enter_stream(&self) {
        self.state.lock().streaming = Some(thread::current().id());
    }

    /// Clear the running loop and any stop it did not observe
    pub(crate) fn leave_stream(&self) {
        let mut state = self.state.lock();
        state.streaming = None;
        state.stop_requested = false;
    }

    /// Consume a pending stop request; a closed connection always stops
    pub(crate) fn take_stop(&self) -> bool {
        let mut state = self.state.lock();
        if !state.alive {
            return true;
        }
        std::mem::replace(&mut state.stop_requested, false)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("segment", &self.config.segment)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}
