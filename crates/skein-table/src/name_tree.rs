//! Shared name tree
//!
//! The [`NameTree`] maps every name prefix referenced by any table to one
//! [`Entry`]. An entry exists only while it has a table entry attached or
//! has children, and the parent chain from any entry up to the root `/` is
//! always complete.
//!
//! Names deeper than the tree's maximum depth are folded onto their
//! max-depth prefix.

use std::ops::{Index, IndexMut};

use skein_core::{Name, NameError};
use tracing::trace;

use crate::fib;
use crate::hashtable::{compute_hashes, Hashtable, HashtableOptions, NodeId};
use crate::measurements;
use crate::pit::PitId;
use crate::strategy_choice;

/// Default maximum depth of the name tree
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// A name tree entry
///
/// Holds at most one FIB, measurements, and strategy choice entry, and any
/// number of PIT entries.
#[derive(Debug)]
pub struct Entry {
    name: Name,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    fib_entry: Option<fib::Entry>,
    pit_entries: Vec<PitId>,
    measurements_entry: Option<measurements::Entry>,
    strategy_choice_entry: Option<strategy_choice::Entry>,
}

impl Entry {
    pub(crate) fn new(name: Name) -> Self {
        Self {
            name,
            parent: None,
            children: Vec::new(),
            fib_entry: None,
            pit_entries: Vec::new(),
            measurements_entry: None,
            strategy_choice_entry: None,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Check if any table has an entry attached here
    pub fn has_table_entries(&self) -> bool {
        self.fib_entry.is_some()
            || !self.pit_entries.is_empty()
            || self.measurements_entry.is_some()
            || self.strategy_choice_entry.is_some()
    }

    /// An empty entry is garbage and may be erased
    pub fn is_empty(&self) -> bool {
        !self.has_children() && !self.has_table_entries()
    }

    pub fn fib_entry(&self) -> Option<&fib::Entry> {
        self.fib_entry.as_ref()
    }

    pub fn fib_entry_mut(&mut self) -> Option<&mut fib::Entry> {
        self.fib_entry.as_mut()
    }

    /// Attach a FIB entry
    ///
    /// # Panics
    ///
    /// Panics if a FIB entry is already attached.
    pub fn set_fib_entry(&mut self, entry: fib::Entry) {
        assert!(self.fib_entry.is_none(), "FIB entry already attached to {}", self.name);
        self.fib_entry = Some(entry);
    }

    pub fn take_fib_entry(&mut self) -> Option<fib::Entry> {
        self.fib_entry.take()
    }

    pub fn pit_entries(&self) -> &[PitId] {
        &self.pit_entries
    }

    pub fn has_pit_entries(&self) -> bool {
        !self.pit_entries.is_empty()
    }

    /// Attach a PIT entry
    ///
    /// # Panics
    ///
    /// Panics if the PIT entry is already attached.
    pub fn insert_pit_entry(&mut self, id: PitId) {
        assert!(!self.pit_entries.contains(&id), "PIT entry {id} already attached");
        self.pit_entries.push(id);
    }

    /// Detach a PIT entry
    ///
    /// # Panics
    ///
    /// Panics if the PIT entry is not attached here.
    pub fn erase_pit_entry(&mut self, id: PitId) {
        let pos = self.pit_entries.iter().position(|p| *p == id);
        match pos {
            Some(pos) => {
                self.pit_entries.swap_remove(pos);
            }
            None => panic!("PIT entry {id} not attached to {}", self.name),
        }
    }

    pub fn measurements_entry(&self) -> Option<&measurements::Entry> {
        self.measurements_entry.as_ref()
    }

    pub fn measurements_entry_mut(&mut self) -> Option<&mut measurements::Entry> {
        self.measurements_entry.as_mut()
    }

    /// Attach a measurements entry
    ///
    /// # Panics
    ///
    /// Panics if a measurements entry is already attached.
    pub fn set_measurements_entry(&mut self, entry: measurements::Entry) {
        assert!(
            self.measurements_entry.is_none(),
            "measurements entry already attached to {}",
            self.name
        );
        self.measurements_entry = Some(entry);
    }

    pub fn take_measurements_entry(&mut self) -> Option<measurements::Entry> {
        self.measurements_entry.take()
    }

    pub fn strategy_choice_entry(&self) -> Option<&strategy_choice::Entry> {
        self.strategy_choice_entry.as_ref()
    }

    pub fn strategy_choice_entry_mut(&mut self) -> Option<&mut strategy_choice::Entry> {
        self.strategy_choice_entry.as_mut()
    }

    /// Attach a strategy choice entry
    ///
    /// # Panics
    ///
    /// Panics if a strategy choice entry is already attached.
    pub fn set_strategy_choice_entry(&mut self, entry: strategy_choice::Entry) {
        assert!(
            self.strategy_choice_entry.is_none(),
            "strategy choice entry already attached to {}",
            self.name
        );
        self.strategy_choice_entry = Some(entry);
    }

    pub fn take_strategy_choice_entry(&mut self) -> Option<strategy_choice::Entry> {
        self.strategy_choice_entry.take()
    }
}

/// Prefix-indexed tree shared by all tables
#[derive(Debug)]
pub struct NameTree {
    ht: Hashtable,
    max_depth: usize,
}

impl NameTree {
    pub fn new(max_depth: usize, options: HashtableOptions) -> Self {
        Self {
            ht: Hashtable::new(options),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.ht.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ht.is_empty()
    }

    /// Number of hashtable buckets
    pub fn n_buckets(&self) -> usize {
        self.ht.n_buckets()
    }

    /// Fail if `name` is deeper than the tree allows
    pub fn check_depth(&self, name: &Name) -> Result<(), NameError> {
        if name.len() > self.max_depth {
            return Err(NameError::DepthExceeded {
                depth: name.len(),
                max: self.max_depth,
            });
        }
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> Option<&Entry> {
        self.ht.get(id).map(|node| &node.entry)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        self.ht.get_mut(id).map(|node| &mut node.entry)
    }

    /// Get or create the entry for `name`, along with every missing ancestor
    ///
    /// Names deeper than the maximum depth are truncated.
    pub fn lookup(&mut self, name: &Name) -> NodeId {
        self.lookup_prefix(name, name.len().min(self.max_depth))
    }

    /// Get or create the entry for the first `prefix_len` components
    ///
    /// # Panics
    ///
    /// Panics if `prefix_len` exceeds the name length or the maximum depth.
    pub fn lookup_prefix(&mut self, name: &Name, prefix_len: usize) -> NodeId {
        assert!(prefix_len <= name.len() && prefix_len <= self.max_depth);
        let hashes = compute_hashes(name, prefix_len);

        let mut parent: Option<NodeId> = None;
        for i in 0..=prefix_len {
            let (id, is_new) = self.ht.insert(name, i, &hashes);
            if is_new && let Some(parent) = parent {
                self.set_parent(id, parent);
            }
            parent = Some(id);
        }
        match parent {
            Some(id) => id,
            None => unreachable!("loop runs at least once"),
        }
    }

    /// Erase `id` if it is empty; if `can_erase_ancestors`, keep erasing
    /// parents that become empty. Returns the number of erased entries.
    pub fn erase_if_empty(&mut self, id: NodeId, can_erase_ancestors: bool) -> usize {
        let mut erased = 0;
        let mut cur = Some(id);
        while let Some(id) = cur {
            let Some(entry) = self.get(id) else { break };
            if !entry.is_empty() {
                break;
            }
            let parent = entry.parent();
            if parent.is_some() {
                self.unset_parent(id);
            }
            trace!(name = %self[id].name(), "Name tree entry erased");
            self.ht.erase(id);
            erased += 1;
            if !can_erase_ancestors {
                break;
            }
            cur = parent;
        }
        erased
    }

    /// Exact match on the full name
    pub fn find_exact_match(&self, name: &Name) -> Option<NodeId> {
        self.find_exact_match_prefix(name, name.len())
    }

    /// Exact match on the first `prefix_len` components
    pub fn find_exact_match_prefix(&self, name: &Name, prefix_len: usize) -> Option<NodeId> {
        if prefix_len > self.max_depth || prefix_len > name.len() {
            return None;
        }
        self.ht.find(name, prefix_len)
    }

    /// Longest prefix of `name` whose entry satisfies `pred`
    pub fn find_longest_prefix_match(
        &self,
        name: &Name,
        pred: impl Fn(&Entry) -> bool,
    ) -> Option<NodeId> {
        let depth = name.len().min(self.max_depth);
        let hashes = compute_hashes(name, depth);
        (0..=depth).rev().find_map(|i| {
            self.ht
                .find_with_hashes(name, i, &hashes)
                .filter(|id| pred(&self[*id]))
        })
    }

    /// Longest prefix match starting from an existing entry
    ///
    /// Walks the parent chain, so no hashing is needed.
    pub fn find_longest_prefix_match_from(
        &self,
        id: NodeId,
        pred: impl Fn(&Entry) -> bool,
    ) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(id) = cur {
            let entry = self.get(id)?;
            if pred(entry) {
                return Some(id);
            }
            cur = entry.parent();
        }
        None
    }

    /// Every prefix of `name` whose entry satisfies `pred`, longest first
    pub fn find_all_matches(&self, name: &Name, pred: impl Fn(&Entry) -> bool) -> Vec<NodeId> {
        let mut matches = Vec::new();
        let mut cur = self.find_longest_prefix_match(name, &pred);
        while let Some(id) = cur {
            let entry = &self[id];
            if pred(entry) {
                matches.push(id);
            }
            cur = entry.parent();
        }
        matches
    }

    /// Every entry satisfying `pred`, in unspecified order
    pub fn full_enumerate(&self, pred: impl Fn(&Entry) -> bool) -> Vec<NodeId> {
        self.ht
            .iter()
            .filter(|(_, node)| pred(node.entry()))
            .map(|(id, _)| id)
            .collect()
    }

    /// Entries at or below `prefix`, visited depth-first
    ///
    /// `visitor` returns `(visit, descend)`: whether to yield the entry and
    /// whether to walk into its children.
    pub fn partial_enumerate(
        &self,
        prefix: &Name,
        mut visitor: impl FnMut(&Entry) -> (bool, bool),
    ) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(start) = self.find_exact_match(prefix) else {
            return out;
        };
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let entry = &self[id];
            let (visit, descend) = visitor(entry);
            if visit {
                out.push(id);
            }
            if descend {
                stack.extend(entry.children().iter().rev().copied());
            }
        }
        out
    }

    /// Iterate over every entry
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Entry)> + '_ {
        self.ht.iter().map(|(id, node)| (id, node.entry()))
    }

    fn set_parent(&mut self, child: NodeId, parent: NodeId) {
        let entry = &mut self[child];
        assert!(entry.parent.is_none(), "{} already has a parent", entry.name);
        entry.parent = Some(parent);
        self[parent].children.push(child);
    }

    fn unset_parent(&mut self, child: NodeId) {
        let parent = match self[child].parent.take() {
            Some(parent) => parent,
            None => panic!("{} has no parent", self[child].name),
        };
        let children = &mut self[parent].children;
        let pos = children.iter().position(|c| *c == child);
        match pos {
            Some(pos) => {
                children.swap_remove(pos);
            }
            None => panic!("child missing from its parent's child list"),
        }
    }
}

impl Default for NameTree {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH, HashtableOptions::default())
    }
}

impl Index<NodeId> for NameTree {
    type Output = Entry;

    fn index(&self, id: NodeId) -> &Entry {
        match self.get(id) {
            Some(entry) => entry,
            None => panic!("stale name tree handle {id:?}"),
        }
    }
}

impl IndexMut<NodeId> for NameTree {
    fn index_mut(&mut self, id: NodeId) -> &mut Entry {
        match self.get_mut(id) {
            Some(entry) => entry,
            None => panic!("stale name tree handle {id:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn with_fib(tree: &mut NameTree, s: &str) -> NodeId {
        let id = tree.lookup(&name(s));
        tree[id].set_fib_entry(fib::Entry::new(name(s)));
        id
    }

    #[test]
    fn test_lookup_creates_ancestors() {
        let mut tree = NameTree::default();
        let abc = tree.lookup(&name("/a/b/c"));
        assert_eq!(tree.len(), 4);

        let ab = tree[abc].parent().unwrap();
        assert_eq!(tree[ab].name(), &name("/a/b"));
        let a = tree[ab].parent().unwrap();
        let root = tree[a].parent().unwrap();
        assert!(tree[root].name().is_empty());
        assert!(tree[root].parent().is_none());
        assert_eq!(tree[root].children(), &[a]);

        assert_eq!(tree.lookup(&name("/a/b/c")), abc);
        assert_eq!(tree.len(), 4);

        tree.lookup(&name("/a/x"));
        assert_eq!(tree.len(), 5);
        assert_eq!(tree[a].children().len(), 2);
    }

    #[test]
    fn test_lookup_truncates_at_max_depth() {
        let mut tree = NameTree::new(2, HashtableOptions::default());
        let id = tree.lookup(&name("/a/b/c/d"));
        assert_eq!(tree[id].name(), &name("/a/b"));
        assert_eq!(tree.find_exact_match(&name("/a/b/c")), None);
        assert!(tree.check_depth(&name("/a/b/c")).is_err());
        assert!(tree.check_depth(&name("/a/b")).is_ok());
    }

    #[test]
    fn test_erase_if_empty_ascends() {
        let mut tree = NameTree::default();
        let abc = tree.lookup(&name("/a/b/c"));
        assert_eq!(tree.erase_if_empty(abc, true), 4);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_erase_if_empty_stops_at_used_ancestor() {
        let mut tree = NameTree::default();
        with_fib(&mut tree, "/a");
        let abc = tree.lookup(&name("/a/b/c"));
        assert_eq!(tree.erase_if_empty(abc, true), 2);
        assert_eq!(tree.len(), 2);
        assert!(tree.find_exact_match(&name("/a")).is_some());
    }

    #[test]
    fn test_erase_if_empty_non_recursive() {
        let mut tree = NameTree::default();
        let abc = tree.lookup(&name("/a/b/c"));
        assert_eq!(tree.erase_if_empty(abc, false), 1);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_entry_with_children_not_erased() {
        let mut tree = NameTree::default();
        tree.lookup(&name("/a/b"));
        let a = tree.find_exact_match(&name("/a")).unwrap();
        assert_eq!(tree.erase_if_empty(a, true), 0);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_longest_prefix_match() {
        let mut tree = NameTree::default();
        let a = with_fib(&mut tree, "/a");
        let abc = with_fib(&mut tree, "/a/b/c");
        let has_fib = |e: &Entry| e.fib_entry().is_some();

        assert_eq!(tree.find_longest_prefix_match(&name("/a/b/c/d"), has_fib), Some(abc));
        assert_eq!(tree.find_longest_prefix_match(&name("/a/b"), has_fib), Some(a));
        assert_eq!(tree.find_longest_prefix_match(&name("/z"), has_fib), None);

        let ab = tree.find_exact_match(&name("/a/b")).unwrap();
        assert_eq!(tree.find_longest_prefix_match_from(ab, has_fib), Some(a));
        assert_eq!(tree.find_longest_prefix_match_from(abc, has_fib), Some(abc));
    }

    #[test]
    fn test_find_all_matches() {
        let mut tree = NameTree::default();
        let a = with_fib(&mut tree, "/a");
        let abc = with_fib(&mut tree, "/a/b/c");
        let has_fib = |e: &Entry| e.fib_entry().is_some();
        assert_eq!(tree.find_all_matches(&name("/a/b/c/d"), has_fib), vec![abc, a]);
        assert!(tree.find_all_matches(&name("/q"), has_fib).is_empty());
    }

    #[test]
    fn test_full_enumerate() {
        let mut tree = NameTree::default();
        with_fib(&mut tree, "/a");
        with_fib(&mut tree, "/b/c");
        let fibs = tree.full_enumerate(|e| e.fib_entry().is_some());
        assert_eq!(fibs.len(), 2);
        assert_eq!(tree.full_enumerate(|_| true).len(), 5);
    }

    #[test]
    fn test_partial_enumerate_respects_visitor() {
        let mut tree = NameTree::default();
        tree.lookup(&name("/a/b/c"));
        tree.lookup(&name("/a/d"));
        with_fib(&mut tree, "/a/x");
        tree.lookup(&name("/a/x/y"));

        let prefix = name("/a");
        let visited = tree.partial_enumerate(&prefix, |e| {
            if e.name() != &prefix && e.fib_entry().is_some() {
                return (false, false);
            }
            (true, true)
        });
        let names: Vec<String> = visited.iter().map(|id| tree[*id].name().to_string()).collect();
        assert_eq!(names.len(), 4);
        assert!(names.contains(&"/a".to_string()));
        assert!(names.contains(&"/a/b/c".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("/a/x")));

        assert!(tree.partial_enumerate(&name("/missing"), |_| (true, true)).is_empty());
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn test_double_fib_attach_panics() {
        let mut tree = NameTree::default();
        let id = with_fib(&mut tree, "/a");
        tree[id].set_fib_entry(fib::Entry::new(name("/a")));
    }

    #[test]
    fn test_pit_attach_detach() {
        let mut tree = NameTree::default();
        let id = tree.lookup(&name("/p"));
        tree[id].insert_pit_entry(PitId::from_raw(1));
        assert!(tree[id].has_table_entries());
        tree[id].erase_pit_entry(PitId::from_raw(1));
        assert!(tree[id].is_empty());
    }
}
