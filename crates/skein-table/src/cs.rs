//! Content store
//!
//! A capacity-bounded cache of Data keyed by name. When full, unsolicited
//! Data is evicted first, then the oldest insertion.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::time::Instant;

use skein_core::{Data, Interest, Name};
use tracing::trace;

/// Default number of packets the content store holds
pub const DEFAULT_CS_CAPACITY: usize = 500;

/// Queues are not compacted while they hold fewer slots than this
const MIN_COMPACT_SLOTS: usize = 64;

#[derive(Debug)]
struct CsEntry {
    data: Data,
    stale_at: Instant,
    is_unsolicited: bool,
    seq: u64,
}

/// Content store
#[derive(Debug)]
pub struct Cs {
    entries: BTreeMap<Name, CsEntry>,
    unsolicited_queue: VecDeque<(u64, Name)>,
    fifo_queue: VecDeque<(u64, Name)>,
    limit: usize,
    next_seq: u64,
}

impl Cs {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            unsolicited_queue: VecDeque::new(),
            fifo_queue: VecDeque::new(),
            limit,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Change the capacity, evicting as needed
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.evict();
    }

    /// Store Data, replacing any cached copy with the same name
    pub fn insert(&mut self, data: Data, is_unsolicited: bool, now: Instant) {
        if self.limit == 0 {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let name = data.name.clone();
        let queue = if is_unsolicited {
            &mut self.unsolicited_queue
        } else {
            &mut self.fifo_queue
        };
        queue.push_back((seq, name.clone()));
        trace!(name = %name, is_unsolicited, "CS insert");
        self.entries.insert(
            name,
            CsEntry {
                stale_at: now + data.freshness_period,
                data,
                is_unsolicited,
                seq,
            },
        );
        self.evict();
        self.compact();
    }

    /// Find Data satisfying `interest`
    ///
    /// With CanBePrefix the first match in canonical name order wins.
    pub fn find(&self, interest: &Interest, now: Instant) -> Option<&Data> {
        let usable = |entry: &CsEntry| !interest.must_be_fresh || entry.stale_at > now;
        if !interest.can_be_prefix {
            return self
                .entries
                .get(&interest.name)
                .filter(|e| usable(e))
                .map(|e| &e.data);
        }
        self.entries
            .range((Bound::Included(&interest.name), Bound::Unbounded))
            .take_while(|(name, _)| interest.name.is_prefix_of(name))
            .find(|(_, e)| usable(e))
            .map(|(_, e)| &e.data)
    }

    /// Erase up to `limit` entries under `prefix`, returning how many went
    pub fn erase(&mut self, prefix: &Name, limit: usize) -> usize {
        let doomed: Vec<Name> = self
            .entries
            .range((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(name, _)| prefix.is_prefix_of(name))
            .take(limit)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &doomed {
            self.entries.remove(name);
        }
        self.compact();
        doomed.len()
    }

    fn evict(&mut self) {
        while self.entries.len() > self.limit {
            let next = self
                .unsolicited_queue
                .pop_front()
                .or_else(|| self.fifo_queue.pop_front());
            let Some((seq, name)) = next else { break };
            // queue slots of replaced or erased entries are skipped
            if self.entries.get(&name).is_some_and(|e| e.seq == seq) {
                let evicted = self.entries.remove(&name);
                if let Some(evicted) = evicted {
                    trace!(name = %name, unsolicited = evicted.is_unsolicited, "CS evict");
                }
            }
        }
    }

    /// Drop queue slots left behind by replaced or erased entries
    ///
    /// Runs once the queues hold more than twice as many slots as there
    /// are entries, so the cost is amortized over the stale inserts.
    fn compact(&mut self) {
        let slots = self.unsolicited_queue.len() + self.fifo_queue.len();
        if slots <= MIN_COMPACT_SLOTS.max(2 * self.entries.len()) {
            return;
        }
        let entries = &self.entries;
        let is_live = |(seq, name): &(u64, Name)| entries.get(name).is_some_and(|e| e.seq == *seq);
        self.unsolicited_queue.retain(is_live);
        self.fifo_queue.retain(is_live);
        trace!(before = slots, after = self.unsolicited_queue.len() + self.fifo_queue.len(), "CS queues compacted");
    }
}

impl Default for Cs {
    fn default() -> Self {
        Self::new(DEFAULT_CS_CAPACITY)
    }
}
