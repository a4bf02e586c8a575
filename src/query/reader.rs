//! Record-level filter
//!
//! Decides, per decoded record, whether the handler sees it. Applied after
//! the query has selected a transaction group.

use std::collections::HashSet;

use crate::error::{Result, VslError};
use crate::record::tags::{tag_index, tags_with_prefix};
use crate::record::Record;

/// Tag include/exclude filter
#[derive(Debug, Clone, Default)]
pub struct LogReader {
    include: HashSet<u8>,
    exclude: HashSet<u8>,
}

impl LogReader {
    /// Reader that passes every record
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from tag names; a trailing `*` matches a name prefix
    pub fn with_tags<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: resolve(include)?,
            exclude: resolve(exclude)?,
        })
    }

    /// Whether `record` passes the filter
    ///
    /// With an include list only listed tags pass; excluded tags never do.
    pub fn matches(&self, record: &Record) -> bool {
        if !self.include.is_empty() && !self.include.contains(&record.tag_index) {
            return false;
        }
        !self.exclude.contains(&record.tag_index)
    }
}

fn resolve<S: AsRef<str>>(names: &[S]) -> Result<HashSet<u8>> {
    let mut tags = HashSet::new();
    for name in names {
        let name = name.as_ref();
        let found = match name.strip_suffix('*') {
            Some(prefix) => tags_with_prefix(prefix),
            None => tag_index(name).into_iter().collect(),
        };
        if found.is_empty() {
            return Err(VslError::Config(format!("Unknown tag: {}", name)));
        }
        tags.extend(found);
    }
    Ok(tags)
}
