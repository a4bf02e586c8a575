//! Transaction assembly
//!
//! Collects records into transactions and transactions into groups
//! according to the grouping mode.
//!
//! ## Linking
//! A `Begin` record's payload reads `"<kind> <parent> <reason>"`. In
//! request and session mode the transaction is linked under its parent
//! when the parent is still being assembled. A group is delivered once its
//! root and every member have seen their `End` record.

use std::collections::HashMap;

use bytes::Bytes;

use crate::record::tags::tag_index;
use crate::record::{decode, Header};

use super::Grouping;

/// Pending transactions kept before the oldest group is forced out
pub const DEFAULT_PENDING_LIMIT: usize = 1000;

/// What started a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// Ungrouped record
    Raw,
    /// No `Begin` record seen
    Unknown,
    Session,
    Request,
    BackendRequest,
}

impl TransactionKind {
    fn parse(word: &str) -> Self {
        match word {
            "sess" => TransactionKind::Session,
            "req" => TransactionKind::Request,
            "bereq" => TransactionKind::BackendRequest,
            _ => TransactionKind::Unknown,
        }
    }
}

/// One transaction of a delivered group
#[derive(Debug, Clone)]
pub struct Transaction {
    pub vxid: u64,

    /// Parent transaction id from the `Begin` record (0 = none)
    pub parent: u64,

    /// 0 for raw records, 1 for a group root, +1 per generation below it
    pub level: u32,

    pub kind: TransactionKind,

    /// Raw records, in log order
    pub records: Vec<Bytes>,
}

struct Pending {
    parent: u64,
    link: Option<u64>,
    kind: TransactionKind,
    records: Vec<Bytes>,
    children: Vec<u64>,
    ended: bool,
    order: u64,
}

pub(crate) struct Assembler {
    grouping: Grouping,
    pending: HashMap<u64, Pending>,
    next_order: u64,
    limit: usize,
    begin_tag: Option<u8>,
    end_tag: Option<u8>,
}

impl Assembler {
    pub(crate) fn new(grouping: Grouping) -> Self {
        Self {
            grouping,
            pending: HashMap::new(),
            next_order: 0,
            limit: DEFAULT_PENDING_LIMIT,
            begin_tag: tag_index("Begin"),
            end_tag: tag_index("End"),
        }
    }

    pub(crate) fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
    }

    /// Number of transactions still being assembled
    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop everything in flight (the cursor they came from is gone)
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    /// Add one record; returns the groups it completed
    pub(crate) fn push(&mut self, header: &Header, raw: Bytes) -> Vec<Vec<Transaction>> {
        if self.grouping == Grouping::Raw {
            return vec![vec![Transaction {
                vxid: header.vxid,
                parent: 0,
                level: 0,
                kind: TransactionKind::Raw,
                records: vec![raw],
            }]];
        }

        // Records outside any transaction pass straight through
        if header.vxid == 0 {
            return vec![vec![Transaction {
                vxid: 0,
                parent: 0,
                level: 1,
                kind: TransactionKind::Unknown,
                records: vec![raw],
            }]];
        }

        let vxid = header.vxid;
        if !self.pending.contains_key(&vxid) {
            let order = self.next_order;
            self.next_order += 1;
            self.pending.insert(
                vxid,
                Pending {
                    parent: 0,
                    link: None,
                    kind: TransactionKind::Unknown,
                    records: Vec::new(),
                    children: Vec::new(),
                    ended: false,
                    order,
                },
            );
        }

        if Some(header.tag) == self.begin_tag {
            if let Some((kind, parent)) = parse_begin(&raw) {
                self.begin(vxid, kind, parent);
            }
        }

        let mut completed = Vec::new();
        if let Some(entry) = self.pending.get_mut(&vxid) {
            entry.records.push(raw);
            if Some(header.tag) == self.end_tag {
                entry.ended = true;
                let root = self.root_of(vxid);
                if self.is_complete(root) {
                    completed.push(self.take_group(root));
                }
            }
        }

        while self.pending.len() > self.limit {
            match self.oldest() {
                Some(oldest) => {
                    let root = self.root_of(oldest);
                    tracing::debug!(vxid = root, "pending limit reached, forcing group out");
                    completed.push(self.take_group(root));
                }
                None => break,
            }
        }

        completed
    }

    /// Deliver every group still in flight, complete or not
    pub(crate) fn flush(&mut self) -> Vec<Vec<Transaction>> {
        let mut groups = Vec::new();
        while let Some(oldest) = self.oldest() {
            let root = self.root_of(oldest);
            groups.push(self.take_group(root));
        }
        groups
    }

    fn begin(&mut self, vxid: u64, kind: TransactionKind, parent: u64) {
        if self.pending.get(&vxid).is_some_and(|p| p.link.is_some()) {
            tracing::debug!(vxid, parent, "repeated Begin for a linked transaction ignored");
            return;
        }

        let linking = matches!(self.grouping, Grouping::Request | Grouping::Session);
        let link = linking
            && parent != 0
            && self.pending.contains_key(&parent)
            && !self.links_to(parent, vxid);

        if let Some(entry) = self.pending.get_mut(&vxid) {
            entry.kind = kind;
            entry.parent = parent;
            if link {
                entry.link = Some(parent);
            }
        }
        if link {
            if let Some(parent_entry) = self.pending.get_mut(&parent) {
                parent_entry.children.push(vxid);
            }
        }
    }

    /// Whether following links up from `from` reaches `target`
    ///
    /// Links never form a cycle, so the walk ends.
    fn links_to(&self, from: u64, target: u64) -> bool {
        let mut current = from;
        loop {
            if current == target {
                return true;
            }
            match self.pending.get(&current).and_then(|p| p.link) {
                Some(link) => current = link,
                None => return false,
            }
        }
    }

    fn oldest(&self) -> Option<u64> {
        self.pending
            .iter()
            .min_by_key(|(_, p)| p.order)
            .map(|(vxid, _)| *vxid)
    }

    /// Whether `child` is grouped below `parent` in the current mode
    fn joins_parent(&self, parent: &Pending) -> bool {
        match self.grouping {
            Grouping::Session => true,
            Grouping::Request => parent.kind != TransactionKind::Session,
            Grouping::Raw | Grouping::Vxid => false,
        }
    }

    fn root_of(&self, vxid: u64) -> u64 {
        let mut current = vxid;
        while let Some(link) = self.pending.get(&current).and_then(|p| p.link) {
            match self.pending.get(&link) {
                Some(parent) if self.joins_parent(parent) => current = link,
                _ => break,
            }
        }
        current
    }

    /// Group members in delivery order, with levels
    fn members(&self, root: u64) -> Vec<(u64, u32)> {
        let mut members = Vec::new();
        let mut stack = vec![(root, 1u32)];
        while let Some((vxid, level)) = stack.pop() {
            let entry = match self.pending.get(&vxid) {
                Some(entry) => entry,
                None => continue,
            };
            members.push((vxid, level));
            if self.joins_parent(entry) {
                for child in entry.children.iter().rev() {
                    stack.push((*child, level + 1));
                }
            }
        }
        members
    }

    fn is_complete(&self, root: u64) -> bool {
        self.members(root)
            .iter()
            .all(|(vxid, _)| self.pending.get(vxid).is_some_and(|p| p.ended))
    }

    fn take_group(&mut self, root: u64) -> Vec<Transaction> {
        self.members(root)
            .into_iter()
            .filter_map(|(vxid, level)| {
                self.pending.remove(&vxid).map(|p| Transaction {
                    vxid,
                    parent: p.parent,
                    level,
                    kind: p.kind,
                    records: p.records,
                })
            })
            .collect()
    }
}

/// Kind and parent id from a `Begin` record
fn parse_begin(raw: &Bytes) -> Option<(TransactionKind, u64)> {
    let record = decode(raw).ok()?;
    let text = record.payload_text();
    let mut words = text.split_whitespace();
    let kind = TransactionKind::parse(words.next()?);
    let parent = words.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some((kind, parent))
}
