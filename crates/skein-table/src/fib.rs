//! Forwarding information base
//!
//! The [`Fib`] maps name prefixes to next hops. Each FIB [`Entry`] lives on
//! the name tree entry of its prefix and keeps its next hops sorted
//! ascending by cost, unique by face.

use skein_core::{FaceId, Name, NameError};
use tracing::{debug, trace};

use crate::hashtable::NodeId;
use crate::name_tree::{self, NameTree};

/// A next hop: an upstream face and its routing cost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextHop {
    pub face: FaceId,
    pub cost: u64,
}

impl NextHop {
    pub fn new(face: FaceId, cost: u64) -> Self {
        Self { face, cost }
    }
}

/// Routes for one prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    prefix: Name,
    next_hops: Vec<NextHop>,
}

impl Entry {
    pub fn new(prefix: Name) -> Self {
        Self {
            prefix,
            next_hops: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    /// Next hops, ascending by cost
    pub fn next_hops(&self) -> &[NextHop] {
        &self.next_hops
    }

    pub fn has_next_hops(&self) -> bool {
        !self.next_hops.is_empty()
    }

    pub fn has_next_hop(&self, face: FaceId) -> bool {
        self.find_next_hop(face).is_some()
    }

    pub fn find_next_hop(&self, face: FaceId) -> Option<&NextHop> {
        self.next_hops.iter().find(|nh| nh.face == face)
    }

    /// Add a next hop or update its cost, returning whether it is new
    ///
    /// Equal-cost next hops keep their relative order.
    pub fn add_or_update_next_hop(&mut self, face: FaceId, cost: u64) -> bool {
        let is_new = match self.next_hops.iter_mut().find(|nh| nh.face == face) {
            Some(nh) => {
                nh.cost = cost;
                false
            }
            None => {
                self.next_hops.push(NextHop::new(face, cost));
                true
            }
        };
        self.next_hops.sort_by_key(|nh| nh.cost);
        is_new
    }

    /// Remove a next hop, returning whether it was present
    pub fn remove_next_hop(&mut self, face: FaceId) -> bool {
        let before = self.next_hops.len();
        self.next_hops.retain(|nh| nh.face != face);
        self.next_hops.len() != before
    }
}

/// Outcome of [`Fib::remove_next_hop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveNextHopResult {
    /// The face was not a next hop; nothing changed
    NoSuchNextHop,
    /// The next hop was removed and others remain
    NextHopRemoved,
    /// The last next hop was removed, so the entry was erased
    FibEntryRemoved,
}

/// Forwarding information base
#[derive(Debug, Default)]
pub struct Fib {
    n_items: usize,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of FIB entries
    pub fn len(&self) -> usize {
        self.n_items
    }

    pub fn is_empty(&self) -> bool {
        self.n_items == 0
    }

    /// Get or create the entry for `prefix`, returning whether it is new
    pub fn insert(
        &mut self,
        tree: &mut NameTree,
        prefix: &Name,
    ) -> Result<(NodeId, bool), NameError> {
        tree.check_depth(prefix)?;
        let node = tree.lookup(prefix);
        let entry = &mut tree[node];
        if entry.fib_entry().is_some() {
            return Ok((node, false));
        }
        entry.set_fib_entry(Entry::new(prefix.clone()));
        self.n_items += 1;
        debug!(prefix = %prefix, "FIB entry created");
        Ok((node, true))
    }

    /// Add a next hop to the entry at `node` or update its cost
    ///
    /// Returns `true` when the face was not a next hop before, which is
    /// when the caller should run the new-next-hop notification.
    ///
    /// # Panics
    ///
    /// Panics if `node` carries no FIB entry.
    pub fn add_or_update_next_hop(
        &mut self,
        tree: &mut NameTree,
        node: NodeId,
        face: FaceId,
        cost: u64,
    ) -> bool {
        let entry = Self::entry_mut(tree, node);
        let is_new = entry.add_or_update_next_hop(face, cost);
        trace!(prefix = %entry.prefix(), face = %face, cost, is_new, "Next hop updated");
        is_new
    }

    /// Remove `face` from the entry at `node`, erasing the entry when it
    /// loses its last next hop
    pub fn remove_next_hop(
        &mut self,
        tree: &mut NameTree,
        node: NodeId,
        face: FaceId,
    ) -> RemoveNextHopResult {
        let entry = Self::entry_mut(tree, node);
        if !entry.remove_next_hop(face) {
            return RemoveNextHopResult::NoSuchNextHop;
        }
        if entry.has_next_hops() {
            return RemoveNextHopResult::NextHopRemoved;
        }
        self.erase_entry(tree, node);
        RemoveNextHopResult::FibEntryRemoved
    }

    /// Erase the entry for `prefix`, returning whether one existed
    pub fn erase(&mut self, tree: &mut NameTree, prefix: &Name) -> bool {
        match tree.find_exact_match(prefix) {
            Some(node) if tree[node].fib_entry().is_some() => {
                self.erase_entry(tree, node);
                true
            }
            _ => false,
        }
    }

    /// Erase the entry at `node` and any name tree entries it leaves unused
    pub fn erase_entry(&mut self, tree: &mut NameTree, node: NodeId) {
        if let Some(entry) = tree[node].take_fib_entry() {
            self.n_items -= 1;
            debug!(prefix = %entry.prefix(), "FIB entry erased");
            tree.erase_if_empty(node, true);
        }
    }

    /// Longest-prefix match for `name`
    pub fn find_longest_prefix_match<'t>(&self, tree: &'t NameTree, name: &Name) -> Option<&'t Entry> {
        tree.find_longest_prefix_match(name, has_fib_entry)
            .and_then(|node| tree[node].fib_entry())
    }

    /// Longest-prefix match starting from another table's name tree entry
    ///
    /// Reuses the entry's position in the tree instead of rehashing the name.
    pub fn find_longest_prefix_match_from<'t>(&self, tree: &'t NameTree, node: NodeId) -> Option<&'t Entry> {
        tree.find_longest_prefix_match_from(node, has_fib_entry)
            .and_then(|node| tree[node].fib_entry())
    }

    /// Exact match for `prefix`
    pub fn find_exact_match<'t>(&self, tree: &'t NameTree, prefix: &Name) -> Option<&'t Entry> {
        tree.find_exact_match(prefix)
            .and_then(|node| tree[node].fib_entry())
    }

    /// Iterate over every FIB entry
    pub fn iter<'t>(&self, tree: &'t NameTree) -> impl Iterator<Item = &'t Entry> + 't {
        tree.iter().filter_map(|(_, entry)| entry.fib_entry())
    }

    /// Remove `face` from every entry, erasing entries left without next
    /// hops; name tree entries are left for the caller to collect
    ///
    /// Returns the number of entries that lost a next hop.
    pub fn remove_next_hop_from_all_entries(&mut self, tree: &mut NameTree, face: FaceId) -> usize {
        let nodes = tree.full_enumerate(has_fib_entry);
        let mut touched = 0;
        for node in nodes {
            let entry = Self::entry_mut(tree, node);
            if !entry.remove_next_hop(face) {
                continue;
            }
            touched += 1;
            if !entry.has_next_hops() {
                tree[node].take_fib_entry();
                self.n_items -= 1;
            }
        }
        touched
    }

    fn entry_mut(tree: &mut NameTree, node: NodeId) -> &mut Entry {
        match tree[node].fib_entry_mut() {
            Some(entry) => entry,
            None => panic!("name tree entry has no FIB entry"),
        }
    }
}

fn has_fib_entry(entry: &name_tree::Entry) -> bool {
    entry.fib_entry().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn setup() -> (NameTree, Fib) {
        (NameTree::default(), Fib::new())
    }

    #[test]
    fn test_insert_idempotent() {
        let (mut tree, mut fib) = setup();
        let (node, is_new) = fib.insert(&mut tree, &name("/a")).unwrap();
        assert!(is_new);
        let (again, is_new) = fib.insert(&mut tree, &name("/a")).unwrap();
        assert!(!is_new);
        assert_eq!(node, again);
        assert_eq!(fib.len(), 1);
    }

    #[test]
    fn test_insert_too_deep() {
        let mut tree = NameTree::new(2, Default::default());
        let mut fib = Fib::new();
        assert!(matches!(
            fib.insert(&mut tree, &name("/a/b/c")),
            Err(NameError::DepthExceeded { depth: 3, max: 2 })
        ));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_next_hops_sorted_and_unique() {
        let (mut tree, mut fib) = setup();
        let (node, _) = fib.insert(&mut tree, &name("/a")).unwrap();

        assert!(fib.add_or_update_next_hop(&mut tree, node, FaceId(1), 30));
        assert!(fib.add_or_update_next_hop(&mut tree, node, FaceId(2), 10));
        assert!(fib.add_or_update_next_hop(&mut tree, node, FaceId(3), 20));
        assert!(!fib.add_or_update_next_hop(&mut tree, node, FaceId(1), 5));

        let entry = tree[node].fib_entry().unwrap();
        let faces: Vec<_> = entry.next_hops().iter().map(|nh| nh.face).collect();
        assert_eq!(faces, vec![FaceId(1), FaceId(2), FaceId(3)]);
        assert_eq!(entry.next_hops()[0].cost, 5);
    }

    #[test]
    fn test_equal_cost_keeps_insertion_order() {
        let (mut tree, mut fib) = setup();
        let (node, _) = fib.insert(&mut tree, &name("/a")).unwrap();
        fib.add_or_update_next_hop(&mut tree, node, FaceId(5), 10);
        fib.add_or_update_next_hop(&mut tree, node, FaceId(4), 10);
        fib.add_or_update_next_hop(&mut tree, node, FaceId(3), 1);

        let faces: Vec<_> = tree[node]
            .fib_entry()
            .unwrap()
            .next_hops()
            .iter()
            .map(|nh| nh.face)
            .collect();
        assert_eq!(faces, vec![FaceId(3), FaceId(5), FaceId(4)]);
    }

    #[test]
    fn test_remove_next_hop_outcomes() {
        let (mut tree, mut fib) = setup();
        let (node, _) = fib.insert(&mut tree, &name("/a/b")).unwrap();
        fib.add_or_update_next_hop(&mut tree, node, FaceId(1), 10);
        fib.add_or_update_next_hop(&mut tree, node, FaceId(2), 20);

        let before = tree[node].fib_entry().unwrap().clone();
        assert_eq!(
            fib.remove_next_hop(&mut tree, node, FaceId(9)),
            RemoveNextHopResult::NoSuchNextHop
        );
        assert_eq!(tree[node].fib_entry().unwrap(), &before);

        assert_eq!(
            fib.remove_next_hop(&mut tree, node, FaceId(1)),
            RemoveNextHopResult::NextHopRemoved
        );
        assert_eq!(
            fib.remove_next_hop(&mut tree, node, FaceId(2)),
            RemoveNextHopResult::FibEntryRemoved
        );
        assert!(fib.find_exact_match(&tree, &name("/a/b")).is_none());
        assert!(fib.is_empty());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_longest_prefix_match() {
        let (mut tree, mut fib) = setup();
        fib.insert(&mut tree, &name("/")).unwrap();
        fib.insert(&mut tree, &name("/a")).unwrap();
        fib.insert(&mut tree, &name("/a/b/c")).unwrap();

        let lpm = |n: &str| {
            fib.find_longest_prefix_match(&tree, &name(n))
                .map(|e| e.prefix().to_string())
        };
        assert_eq!(lpm("/a/b/c/d"), Some("/a/b/c".to_string()));
        assert_eq!(lpm("/a/b"), Some("/a".to_string()));
        assert_eq!(lpm("/x"), Some("/".to_string()));
    }

    #[test]
    fn test_longest_prefix_match_none() {
        let (mut tree, mut fib) = setup();
        fib.insert(&mut tree, &name("/a")).unwrap();
        assert!(fib.find_longest_prefix_match(&tree, &name("/b")).is_none());
    }

    #[test]
    fn test_lpm_from_other_table_node() {
        let (mut tree, mut fib) = setup();
        fib.insert(&mut tree, &name("/a")).unwrap();
        let pit_node = tree.lookup(&name("/a/b/c"));
        let entry = fib.find_longest_prefix_match_from(&tree, pit_node).unwrap();
        assert_eq!(entry.prefix(), &name("/a"));
    }

    #[test]
    fn test_erase_keeps_shared_nodes() {
        let (mut tree, mut fib) = setup();
        fib.insert(&mut tree, &name("/a")).unwrap();
        fib.insert(&mut tree, &name("/a/b")).unwrap();
        assert!(fib.erase(&mut tree, &name("/a")));
        assert!(!fib.erase(&mut tree, &name("/a")));
        assert!(tree.find_exact_match(&name("/a")).is_some());
        assert!(fib.erase(&mut tree, &name("/a/b")));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_iter_and_face_cleanup() {
        let (mut tree, mut fib) = setup();
        let (a, _) = fib.insert(&mut tree, &name("/a")).unwrap();
        let (b, _) = fib.insert(&mut tree, &name("/b")).unwrap();
        fib.add_or_update_next_hop(&mut tree, a, FaceId(1), 1);
        fib.add_or_update_next_hop(&mut tree, a, FaceId(2), 1);
        fib.add_or_update_next_hop(&mut tree, b, FaceId(1), 1);
        assert_eq!(fib.iter(&tree).count(), 2);

        assert_eq!(fib.remove_next_hop_from_all_entries(&mut tree, FaceId(1)), 2);
        assert_eq!(fib.len(), 1);
        assert!(tree[b].fib_entry().is_none());
        assert_eq!(tree[a].fib_entry().unwrap().next_hops().len(), 1);
    }
}
