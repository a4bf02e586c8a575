//! Counter snapshots
//!
//! A snapshot is one full pass over the segment's counter directory. No
//! state survives between snapshots, and values are only as consistent as
//! the writer's per-counter updates.

use std::collections::btree_map;
use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::connection::Connection;
use crate::error::Result;
use crate::registry::{handles, Token};
use crate::transport::CounterPoint;

/// Counter values keyed by dotted name (`section.[ident.]field`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    values: BTreeMap<String, u64>,
}

impl CounterSnapshot {
    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Counters in name order
    pub fn iter(&self) -> btree_map::Iter<'_, String, u64> {
        self.values.iter()
    }

    /// Counters of one section, e.g. `"MAIN"`
    pub fn section<'a>(&'a self, section: &'a str) -> impl Iterator<Item = (&'a str, u64)> + 'a {
        self.values
            .iter()
            .filter(move |(name, _)| {
                name.strip_prefix(section)
                    .is_some_and(|rest| rest.starts_with('.'))
            })
            .map(|(name, value)| (name.as_str(), *value))
    }

    pub fn into_map(self) -> BTreeMap<String, u64> {
        self.values
    }
}

impl<'a> IntoIterator for &'a CounterSnapshot {
    type Item = (&'a String, &'a u64);
    type IntoIter = btree_map::Iter<'a, String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

fn collect_counter(point: &CounterPoint<'_>, token: Token) -> i32 {
    let sink = handles().lookup::<Mutex<BTreeMap<String, u64>>>(token);
    sink.lock().insert(point.name(), point.value);
    0
}

impl Connection {
    /// Take a full snapshot of every counter
    pub fn stats(&self) -> Result<CounterSnapshot> {
        let transport = self.transport()?;

        let registration = handles().track(Mutex::new(BTreeMap::<String, u64>::new()));
        let rc = transport.iter_counters(collect_counter, registration.token());
        if rc != 0 {
            tracing::debug!(rc, "counter walk stopped early");
        }

        let values = std::mem::take(
            &mut *handles()
                .lookup::<Mutex<BTreeMap<String, u64>>>(registration.token())
                .lock(),
        );
        drop(registration);

        tracing::trace!(count = values.len(), "counter snapshot");
        Ok(CounterSnapshot { values })
    }

    /// Look up one counter by dotted name in a fresh snapshot
    ///
    /// `Ok(None)` when no such counter exists.
    pub fn stat(&self, name: &str) -> Result<Option<u64>> {
        Ok(self.stats()?.get(name))
    }
}
