//! # vslog
//!
//! A client for a live, structured event log published in a shared
//! segment:
//! - Tails the circular log region through resumable cursors
//! - Groups records into transactions (raw, vxid, request, session)
//! - Decodes both record header versions
//! - Dispatches records to caller handlers, with cursor recovery
//! - Snapshots the segment's counters
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Connection                            │
//! │          (liveness, stop signal, ordered teardown)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Engine    │          │    Stats    │
//!   │ (dispatch)  │          │ (snapshot)  │
//!   └──────┬──────┘          └──────┬──────┘
//!          │   token ─► Registry ◄──┘
//!          ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Query    │─────────►│   Record    │
//!   │ (grouping)  │          │  (decoder)  │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │  Transport  │
//!   │  (cursor)   │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod registry;
pub mod record;
pub mod transport;
pub mod query;
pub mod connection;
pub mod engine;
pub mod stats;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{VslError, Result};
pub use config::Config;
pub use connection::Connection;
pub use engine::{LogHandler, StreamExit, StreamRequest};
pub use query::Grouping;
pub use record::{Record, Side};
pub use stats::CounterSnapshot;
pub use transport::CursorOptions;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of vslog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
