//! Arena hashtable backing the name tree
//!
//! Every distinct name prefix maps to exactly one [`Node`]. Nodes live in a
//! generational arena and are addressed by [`NodeId`]; a bucket holds the
//! head of an intrusive doubly linked chain threaded through the nodes, so
//! attach and detach are O(1) relinks.
//!
//! A name's hash is computed incrementally per prefix length:
//! `h[0] = 0`, `h[i] = h[i-1] ^ hash(component[i-1])`. Computing the
//! [`HashSequence`] of a name once makes every prefix probe O(1).
//!
//! The table grows by `expand_factor` whenever an insert pushes the size
//! past `expand_load_factor * buckets`, and shrinks by `shrink_factor`
//! (never below `min_size`) whenever an erase drops the size below
//! `shrink_load_factor * buckets`. Resizing rehashes every node at once.

use serde::{Deserialize, Serialize};
use skein_core::{Component, Name};
use tracing::{debug, trace};

use crate::name_tree::Entry;

/// Hash of a name prefix
pub type HashValue = u64;

/// Hashes of every prefix of a name, indexed by prefix length
pub type HashSequence = Vec<HashValue>;

/// Hash a single component
pub fn hash_component(component: &Component) -> HashValue {
    let digest = blake3::hash(component.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// Hash the first `prefix_len` components of a name
pub fn compute_hash(name: &Name, prefix_len: usize) -> HashValue {
    name.components()
        .take(prefix_len)
        .fold(0, |h, c| h ^ hash_component(c))
}

/// Hashes of every prefix of `name` up to `prefix_len` components
pub fn compute_hashes(name: &Name, prefix_len: usize) -> HashSequence {
    let mut seq = Vec::with_capacity(prefix_len + 1);
    let mut h = 0;
    seq.push(h);
    for c in name.components().take(prefix_len) {
        h ^= hash_component(c);
        seq.push(h);
    }
    seq
}

/// Sizing policy of the hashtable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashtableOptions {
    /// Bucket count at construction
    pub initial_size: usize,
    /// Bucket count never drops below this
    pub min_size: usize,
    /// Grow when `size > expand_load_factor * buckets`
    pub expand_load_factor: f32,
    /// Growth multiplier, must exceed 1
    pub expand_factor: f32,
    /// Shrink when `size < shrink_load_factor * buckets`
    pub shrink_load_factor: f32,
    /// Shrink multiplier, between 0 and 1
    pub shrink_factor: f32,
}

impl Default for HashtableOptions {
    fn default() -> Self {
        Self::with_size(16)
    }
}

impl HashtableOptions {
    /// Default factors with a given initial and minimum bucket count
    pub fn with_size(size: usize) -> Self {
        Self {
            initial_size: size,
            min_size: size,
            expand_load_factor: 0.5,
            expand_factor: 2.0,
            shrink_load_factor: 0.1,
            shrink_factor: 0.5,
        }
    }

    /// Check the option invariants the hashtable relies on
    pub fn is_valid(&self) -> bool {
        self.min_size > 0
            && self.initial_size >= self.min_size
            && self.expand_load_factor > 0.0
            && self.expand_load_factor <= 1.0
            && self.expand_factor > 1.0
            && self.shrink_load_factor >= 0.0
            && self.shrink_load_factor < self.expand_load_factor
            && self.shrink_factor > 0.0
            && self.shrink_factor < 1.0
    }
}

/// Handle to a hashtable node
///
/// The generation makes a handle to an erased node detectably stale even
/// after its arena slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// A hashtable node owning one name tree entry
#[derive(Debug)]
pub struct Node {
    hash: HashValue,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    pub(crate) entry: Entry,
}

impl Node {
    /// Hash of the node's name
    pub fn hash(&self) -> HashValue {
        self.hash
    }

    /// The name tree entry stored in this node
    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Chained hashtable of name tree nodes
#[derive(Debug)]
pub struct Hashtable {
    options: HashtableOptions,
    buckets: Vec<Option<NodeId>>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    size: usize,
    expand_threshold: usize,
    shrink_threshold: usize,
}

impl Hashtable {
    /// Create a hashtable
    ///
    /// # Panics
    ///
    /// Panics if `options` violate [`HashtableOptions::is_valid`].
    pub fn new(options: HashtableOptions) -> Self {
        assert!(options.is_valid(), "invalid hashtable options: {options:?}");
        let mut table = Self {
            buckets: vec![None; options.initial_size],
            options,
            slots: Vec::new(),
            free: Vec::new(),
            size: 0,
            expand_threshold: 0,
            shrink_threshold: 0,
        };
        table.compute_thresholds();
        table
    }

    pub fn options(&self) -> &HashtableOptions {
        &self.options
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of buckets
    pub fn n_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Find the node for the first `prefix_len` components of `name`
    pub fn find(&self, name: &Name, prefix_len: usize) -> Option<NodeId> {
        self.lookup(name, prefix_len, compute_hash(name, prefix_len))
    }

    /// Find using a precomputed hash sequence
    pub fn find_with_hashes(
        &self,
        name: &Name,
        prefix_len: usize,
        hashes: &HashSequence,
    ) -> Option<NodeId> {
        self.lookup(name, prefix_len, hashes[prefix_len])
    }

    /// Find or insert the node for the first `prefix_len` components of
    /// `name`, returning whether it was newly inserted
    pub fn insert(
        &mut self,
        name: &Name,
        prefix_len: usize,
        hashes: &HashSequence,
    ) -> (NodeId, bool) {
        let hash = hashes[prefix_len];
        if let Some(id) = self.lookup(name, prefix_len, hash) {
            return (id, false);
        }

        let node = Node {
            hash,
            prev: None,
            next: None,
            entry: Entry::new(name.get_prefix(prefix_len)),
        };
        let id = self.allocate(node);
        let bucket = self.bucket_of(hash);
        self.attach(bucket, id);
        self.size += 1;
        trace!(name = %name.get_prefix(prefix_len), hash = %hex::encode(hash.to_be_bytes()), "Hashtable insert");

        if self.size > self.expand_threshold {
            let target = (self.options.expand_factor * self.buckets.len() as f32) as usize;
            self.resize(target);
        }
        (id, true)
    }

    /// Remove a node
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    pub fn erase(&mut self, id: NodeId) {
        let hash = self.node(id).hash;
        let bucket = self.bucket_of(hash);
        self.detach(bucket, id);

        let slot = &mut self.slots[id.index as usize];
        let node = slot.node.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.size -= 1;
        if let Some(node) = node {
            trace!(name = %node.entry.name(), "Hashtable erase");
        }

        if self.size < self.shrink_threshold {
            let shrunk = (self.options.shrink_factor * self.buckets.len() as f32) as usize;
            self.resize(shrunk.max(self.options.min_size));
        }
    }

    /// Iterate over nodes in bucket order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.buckets.iter().flat_map(move |head| {
            let mut cur = *head;
            std::iter::from_fn(move || {
                let id = cur?;
                let node = self.node(id);
                cur = node.next;
                Some((id, node))
            })
        })
    }

    fn node(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale hashtable node handle {id:?}"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale hashtable node handle {id:?}"),
        }
    }

    fn lookup(&self, name: &Name, prefix_len: usize, hash: HashValue) -> Option<NodeId> {
        let mut cur = self.buckets[self.bucket_of(hash)];
        while let Some(id) = cur {
            let node = self.node(id);
            if node.hash == hash && name.prefix_equals(prefix_len, node.entry.name()) {
                return Some(id);
            }
            cur = node.next;
        }
        None
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn bucket_of(&self, hash: HashValue) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    fn attach(&mut self, bucket: usize, id: NodeId) {
        let head = self.buckets[bucket];
        {
            let node = self.node_mut(id);
            node.prev = None;
            node.next = head;
        }
        if let Some(head) = head {
            self.node_mut(head).prev = Some(id);
        }
        self.buckets[bucket] = Some(id);
    }

    fn detach(&mut self, bucket: usize, id: NodeId) {
        let (prev, next) = {
            let node = self.node_mut(id);
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => {
                assert_eq!(self.buckets[bucket], Some(id), "node is not the head of its bucket");
                self.buckets[bucket] = next;
            }
        }
        if let Some(next) = next {
            self.node_mut(next).prev = prev;
        }
    }

    fn compute_thresholds(&mut self) {
        let n = self.buckets.len() as f32;
        self.expand_threshold = (self.options.expand_load_factor * n) as usize;
        self.shrink_threshold = (self.options.shrink_load_factor * n) as usize;
    }

    fn resize(&mut self, new_n_buckets: usize) {
        if new_n_buckets == self.buckets.len() {
            return;
        }
        let ids: Vec<NodeId> = self.iter().map(|(id, _)| id).collect();
        let old = self.buckets.len();
        self.buckets = vec![None; new_n_buckets];
        for id in ids {
            let bucket = self.bucket_of(self.node(id).hash);
            self.attach(bucket, id);
        }
        self.compute_thresholds();
        debug!(from = old, to = new_n_buckets, size = self.size, "Hashtable resized");
    }
}
