//! Segment directory
//!
//! Names in-process segments so connections can find them the way they
//! would find a segment published by an external writer.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::{Locator, MemorySegment, Transport};

/// Name used when a connection asks for the default segment
pub const DEFAULT_SEGMENT: &str = "_.vsm";

/// Named registry of segments
#[derive(Default)]
pub struct SegmentDirectory {
    segments: RwLock<HashMap<String, MemorySegment>>,
}

impl SegmentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The directory `Connection::open` consults
    pub fn global() -> &'static SegmentDirectory {
        static GLOBAL: OnceLock<SegmentDirectory> = OnceLock::new();
        GLOBAL.get_or_init(SegmentDirectory::new)
    }

    /// Publish `segment` under `name` ("" = default), replacing any previous one
    pub fn publish(&self, name: &str, segment: MemorySegment) {
        self.segments
            .write()
            .insert(Self::resolve(name).to_string(), segment);
    }

    /// Remove the segment published under `name`
    pub fn withdraw(&self, name: &str) -> Option<MemorySegment> {
        self.segments.write().remove(Self::resolve(name))
    }

    pub fn get(&self, name: &str) -> Option<MemorySegment> {
        self.segments.read().get(Self::resolve(name)).cloned()
    }

    fn resolve(name: &str) -> &str {
        if name.is_empty() {
            DEFAULT_SEGMENT
        } else {
            name
        }
    }
}

impl Locator for SegmentDirectory {
    fn attach(&self, name: &str) -> std::result::Result<Arc<dyn Transport>, String> {
        let name = Self::resolve(name);
        match self.get(name) {
            Some(segment) => Ok(segment.attach()),
            None => Err(format!("Cannot open {}: no such segment", name)),
        }
    }
}
