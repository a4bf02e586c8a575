//! Configuration for vslog
//!
//! Centralized configuration with sensible defaults.

use crate::error::{Result, VslError};
use crate::query::Grouping;
use crate::transport::CursorOptions;

/// Main configuration for a connection and its streaming calls
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Segment Configuration
    // -------------------------------------------------------------------------
    /// Segment name; empty selects the default segment
    pub segment: String,

    /// How long `open` keeps retrying (milliseconds)
    ///   < 0: retry forever
    ///   = 0: single attempt
    ///   > 0: retry until the timeout has elapsed
    pub open_timeout_ms: i64,

    /// Fixed pause between open attempts (milliseconds)
    pub open_retry_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Streaming Configuration
    // -------------------------------------------------------------------------
    /// Query text selecting transaction groups; empty selects all
    pub query: String,

    /// Record grouping mode
    pub grouping: Grouping,

    /// Cursor start/stop behaviour
    pub cursor_options: CursorOptions,

    /// Reacquire a cursor when the writer restarts instead of failing
    pub reattach: bool,

    /// Sleep when a dispatch step finds no work (milliseconds)
    pub idle_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Record Filter Configuration
    // -------------------------------------------------------------------------
    /// Only these tags reach the handler (empty = all); `Prefix*` allowed
    pub include_tags: Vec<String>,

    /// These tags never reach the handler; `Prefix*` allowed
    pub exclude_tags: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment: String::new(),
            open_timeout_ms: 0,
            open_retry_interval_ms: 100,
            query: String::new(),
            grouping: Grouping::Vxid,
            cursor_options: CursorOptions::TAIL,
            reattach: false,
            idle_interval_ms: 10,
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings that would make the retry or idle loops spin
    pub fn validate(&self) -> Result<()> {
        if self.idle_interval_ms == 0 {
            return Err(VslError::Config(
                "idle_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.open_retry_interval_ms == 0 {
            return Err(VslError::Config(
                "open_retry_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the segment name ("" = default segment)
    pub fn segment(mut self, name: impl Into<String>) -> Self {
        self.config.segment = name.into();
        self
    }

    /// Set the open timeout (negative = forever, 0 = single attempt)
    pub fn open_timeout_ms(mut self, ms: i64) -> Self {
        self.config.open_timeout_ms = ms;
        self
    }

    /// Set the pause between open attempts
    pub fn open_retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.open_retry_interval_ms = ms;
        self
    }

    /// Set the query text
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.config.query = query.into();
        self
    }

    /// Set the grouping mode
    pub fn grouping(mut self, grouping: Grouping) -> Self {
        self.config.grouping = grouping;
        self
    }

    /// Set the cursor options
    pub fn cursor_options(mut self, options: CursorOptions) -> Self {
        self.config.cursor_options = options;
        self
    }

    /// Enable or disable cursor reacquisition after writer restarts
    pub fn reattach(mut self, reattach: bool) -> Self {
        self.config.reattach = reattach;
        self
    }

    /// Set the idle sleep of the dispatch loop
    pub fn idle_interval_ms(mut self, ms: u64) -> Self {
        self.config.idle_interval_ms = ms;
        self
    }

    /// Add a tag to the include list
    pub fn include_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.include_tags.push(tag.into());
        self
    }

    /// Add a tag to the exclude list
    pub fn exclude_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.exclude_tags.push(tag.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
