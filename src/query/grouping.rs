//! Grouping modes

use std::fmt;
use std::str::FromStr;

use crate::error::VslError;

/// How records are correlated into transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Grouping {
    /// Every record is delivered on its own
    Raw = 0,

    /// One transaction per transaction id
    #[default]
    Vxid = 1,

    /// A client request with its backend fetches
    Request = 2,

    /// A whole client session with all its requests
    Session = 3,
}

impl Grouping {
    /// Map a raw mode value; anything out of range falls back to `Vxid`
    pub fn from_raw(value: u32) -> Self {
        match value {
            0 => Grouping::Raw,
            1 => Grouping::Vxid,
            2 => Grouping::Request,
            3 => Grouping::Session,
            other => {
                tracing::debug!(value = other, "unknown grouping, using vxid");
                Grouping::Vxid
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grouping::Raw => "raw",
            Grouping::Vxid => "vxid",
            Grouping::Request => "request",
            Grouping::Session => "session",
        }
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grouping {
    type Err = VslError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Grouping::Raw),
            "vxid" => Ok(Grouping::Vxid),
            "request" | "req" => Ok(Grouping::Request),
            "session" | "sess" => Ok(Grouping::Session),
            _ => Err(VslError::Config(format!("Unknown grouping mode: {}", s))),
        }
    }
}
