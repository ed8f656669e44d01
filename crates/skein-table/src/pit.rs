//! Pending Interest table
//!
//! A PIT [`Entry`] tracks one outstanding Interest: the downstream faces it
//! arrived on (in-records) and the upstream faces it was forwarded to
//! (out-records). Entries are stored by [`PitId`] and attached to the name
//! tree entry of their Interest name.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use skein_core::{Data, FaceId, Interest, Nack, NackHeader, Name, TimerId};
use tracing::debug;

use crate::hashtable::NodeId;
use crate::name_tree::NameTree;
use crate::strategy_info::StrategyInfoHost;

/// Identifier of a PIT entry, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("pit#{_0}")]
pub struct PitId(u64);

impl PitId {
    /// Construct an id from its raw value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Where a pending Interest came from
#[derive(Debug, Clone)]
pub struct InRecord {
    face: FaceId,
    last_nonce: u32,
    last_renewed: Instant,
    expiry: Instant,
    interest: Interest,
}

impl InRecord {
    fn new(face: FaceId, interest: &Interest, now: Instant) -> Self {
        Self {
            face,
            last_nonce: interest.nonce,
            last_renewed: now,
            expiry: now + interest.lifetime,
            interest: interest.clone(),
        }
    }

    fn update(&mut self, interest: &Interest, now: Instant) {
        self.last_nonce = interest.nonce;
        self.last_renewed = now;
        self.expiry = now + interest.lifetime;
        self.interest = interest.clone();
    }

    pub fn face(&self) -> FaceId {
        self.face
    }

    pub fn last_nonce(&self) -> u32 {
        self.last_nonce
    }

    pub fn last_renewed(&self) -> Instant {
        self.last_renewed
    }

    pub fn expiry(&self) -> Instant {
        self.expiry
    }

    /// The most recent Interest received on this face
    pub fn interest(&self) -> &Interest {
        &self.interest
    }
}

/// Where a pending Interest was forwarded
#[derive(Debug)]
pub struct OutRecord {
    face: FaceId,
    last_nonce: u32,
    last_renewed: Instant,
    expiry: Instant,
    incoming_nack: Option<NackHeader>,
    strategy_info: StrategyInfoHost,
}

impl OutRecord {
    fn new(face: FaceId, interest: &Interest, now: Instant) -> Self {
        Self {
            face,
            last_nonce: interest.nonce,
            last_renewed: now,
            expiry: now + interest.lifetime,
            incoming_nack: None,
            strategy_info: StrategyInfoHost::new(),
        }
    }

    fn update(&mut self, interest: &Interest, now: Instant) {
        self.last_nonce = interest.nonce;
        self.last_renewed = now;
        self.expiry = now + interest.lifetime;
        self.incoming_nack = None;
    }

    pub fn face(&self) -> FaceId {
        self.face
    }

    pub fn last_nonce(&self) -> u32 {
        self.last_nonce
    }

    pub fn last_renewed(&self) -> Instant {
        self.last_renewed
    }

    pub fn expiry(&self) -> Instant {
        self.expiry
    }

    /// Nack received from this upstream for the last sent nonce
    pub fn incoming_nack(&self) -> Option<&NackHeader> {
        self.incoming_nack.as_ref()
    }

    /// Record a Nack; rejected if it answers an older nonce
    pub fn set_incoming_nack(&mut self, nack: &Nack) -> bool {
        if nack.interest.nonce != self.last_nonce {
            return false;
        }
        self.incoming_nack = Some(nack.header);
        true
    }

    pub fn strategy_info(&self) -> &StrategyInfoHost {
        &self.strategy_info
    }

    pub fn strategy_info_mut(&mut self) -> &mut StrategyInfoHost {
        &mut self.strategy_info
    }
}

/// A pending Interest
#[derive(Debug)]
pub struct Entry {
    id: PitId,
    interest: Interest,
    node: NodeId,
    in_records: Vec<InRecord>,
    out_records: Vec<OutRecord>,
    strategy_info: StrategyInfoHost,
    /// Timer that finalizes this entry
    pub expiry_timer: Option<TimerId>,
    /// Set once Data has satisfied the entry
    pub is_satisfied: bool,
    /// Freshness period of the satisfying Data
    pub data_freshness_period: Duration,
}

impl Entry {
    fn new(id: PitId, interest: &Interest, node: NodeId) -> Self {
        Self {
            id,
            interest: interest.clone(),
            node,
            in_records: Vec::new(),
            out_records: Vec::new(),
            strategy_info: StrategyInfoHost::new(),
            expiry_timer: None,
            is_satisfied: false,
            data_freshness_period: Duration::ZERO,
        }
    }

    pub fn id(&self) -> PitId {
        self.id
    }

    /// The Interest that created this entry
    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn name(&self) -> &Name {
        &self.interest.name
    }

    /// Name tree entry this PIT entry is attached to
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Check whether `interest` would share this entry
    pub fn can_match(&self, interest: &Interest) -> bool {
        self.interest.name == interest.name
            && self.interest.can_be_prefix == interest.can_be_prefix
            && self.interest.must_be_fresh == interest.must_be_fresh
    }

    pub fn in_records(&self) -> &[InRecord] {
        &self.in_records
    }

    pub fn has_in_records(&self) -> bool {
        !self.in_records.is_empty()
    }

    pub fn in_record(&self, face: FaceId) -> Option<&InRecord> {
        self.in_records.iter().find(|r| r.face == face)
    }

    /// Insert or renew the in-record for `face`
    pub fn insert_or_update_in_record(
        &mut self,
        face: FaceId,
        interest: &Interest,
        now: Instant,
    ) -> &mut InRecord {
        let pos = match self.in_records.iter().position(|r| r.face == face) {
            Some(pos) => {
                self.in_records[pos].update(interest, now);
                pos
            }
            None => {
                self.in_records.push(InRecord::new(face, interest, now));
                self.in_records.len() - 1
            }
        };
        &mut self.in_records[pos]
    }

    pub fn delete_in_record(&mut self, face: FaceId) -> bool {
        let before = self.in_records.len();
        self.in_records.retain(|r| r.face != face);
        self.in_records.len() != before
    }

    pub fn clear_in_records(&mut self) {
        self.in_records.clear();
    }

    pub fn out_records(&self) -> &[OutRecord] {
        &self.out_records
    }

    pub fn has_out_records(&self) -> bool {
        !self.out_records.is_empty()
    }

    pub fn out_record(&self, face: FaceId) -> Option<&OutRecord> {
        self.out_records.iter().find(|r| r.face == face)
    }

    pub fn out_record_mut(&mut self, face: FaceId) -> Option<&mut OutRecord> {
        self.out_records.iter_mut().find(|r| r.face == face)
    }

    /// Insert or renew the out-record for `face`
    ///
    /// Renewal keeps the record's strategy info.
    pub fn insert_or_update_out_record(
        &mut self,
        face: FaceId,
        interest: &Interest,
        now: Instant,
    ) -> &mut OutRecord {
        let pos = match self.out_records.iter().position(|r| r.face == face) {
            Some(pos) => {
                self.out_records[pos].update(interest, now);
                pos
            }
            None => {
                self.out_records.push(OutRecord::new(face, interest, now));
                self.out_records.len() - 1
            }
        };
        &mut self.out_records[pos]
    }

    pub fn delete_out_record(&mut self, face: FaceId) -> bool {
        let before = self.out_records.len();
        self.out_records.retain(|r| r.face != face);
        self.out_records.len() != before
    }

    /// Check for an out-record still waiting for Data or a Nack
    pub fn has_pending_out_records(&self, now: Instant) -> bool {
        self.out_records
            .iter()
            .any(|r| r.expiry > now && r.incoming_nack.is_none())
    }

    /// Time the Interest was last forwarded to any upstream
    pub fn last_outgoing(&self) -> Option<Instant> {
        self.out_records.iter().map(|r| r.last_renewed).max()
    }

    pub fn strategy_info(&self) -> &StrategyInfoHost {
        &self.strategy_info
    }

    pub fn strategy_info_mut(&mut self) -> &mut StrategyInfoHost {
        &mut self.strategy_info
    }

    /// Clear strategy info on the entry and every out-record
    pub fn clear_strategy_info(&mut self) {
        self.strategy_info.clear_strategy_info();
        for record in &mut self.out_records {
            record.strategy_info.clear_strategy_info();
        }
    }
}

/// Pending Interest table
#[derive(Debug, Default)]
pub struct Pit {
    entries: HashMap<PitId, Entry>,
    next_id: u64,
}

impl Pit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: PitId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: PitId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    /// Find the entry an Interest would share
    pub fn find(&self, tree: &NameTree, interest: &Interest) -> Option<PitId> {
        let depth = interest.name.len().min(tree.max_depth());
        let node = tree.find_exact_match_prefix(&interest.name, depth)?;
        self.find_in_node(tree, node, interest)
    }

    /// Find or create the entry for an Interest, returning whether it is new
    pub fn insert(&mut self, tree: &mut NameTree, interest: &Interest) -> (PitId, bool) {
        let node = tree.lookup(&interest.name);
        if let Some(id) = self.find_in_node(tree, node, interest) {
            return (id, false);
        }

        let id = PitId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, Entry::new(id, interest, node));
        tree[node].insert_pit_entry(id);
        debug!(pit = %id, name = %interest.name, "PIT entry created");
        (id, true)
    }

    /// Every entry that `data` satisfies, from the longest name up
    pub fn find_all_data_matches(&self, tree: &NameTree, data: &Data) -> Vec<PitId> {
        tree.find_all_matches(&data.name, |e| e.has_pit_entries())
            .into_iter()
            .flat_map(|node| tree[node].pit_entries().iter().copied())
            .filter(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|entry| entry.interest.matches_data(data))
            })
            .collect()
    }

    /// Remove an entry and any name tree entries it leaves unused
    pub fn erase(&mut self, tree: &mut NameTree, id: PitId) -> Option<Entry> {
        let entry = self.entries.remove(&id)?;
        tree[entry.node].erase_pit_entry(id);
        tree.erase_if_empty(entry.node, true);
        debug!(pit = %id, name = %entry.name(), "PIT entry erased");
        Some(entry)
    }

    /// Remove the in-record and out-record of `face` from an entry
    pub fn delete_in_out_records(&mut self, id: PitId, face: FaceId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.delete_in_record(face);
            entry.delete_out_record(face);
        }
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    fn find_in_node(&self, tree: &NameTree, node: NodeId, interest: &Interest) -> Option<PitId> {
        tree[node]
            .pit_entries()
            .iter()
            .copied()
            .find(|id| self.entries.get(id).is_some_and(|e| e.can_match(interest)))
    }
}
