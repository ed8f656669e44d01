//! Measurements table
//!
//! Per-prefix scratch space for strategies. Entries are created on demand,
//! live for a limited time that strategies may extend, and are erased by a
//! cleanup task the forwarder schedules when an entry is created.

use std::time::{Duration, Instant};

use skein_core::{Name, TimerId};
use tracing::debug;

use crate::hashtable::NodeId;
use crate::name_tree::{self, NameTree};
use crate::strategy_info::StrategyInfoHost;

/// Default lifetime of a measurements entry
pub const DEFAULT_MEASUREMENTS_LIFETIME: Duration = Duration::from_secs(4);

/// A measurements entry
#[derive(Debug)]
pub struct Entry {
    name: Name,
    expiry: Instant,
    strategy_info: StrategyInfoHost,
    /// Timer that runs [`Measurements::cleanup`] for this entry
    pub cleanup_timer: Option<TimerId>,
}

impl Entry {
    fn new(name: Name, expiry: Instant) -> Self {
        Self {
            name,
            expiry,
            strategy_info: StrategyInfoHost::new(),
            cleanup_timer: None,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn expiry(&self) -> Instant {
        self.expiry
    }

    pub fn strategy_info(&self) -> &StrategyInfoHost {
        &self.strategy_info
    }

    pub fn strategy_info_mut(&mut self) -> &mut StrategyInfoHost {
        &mut self.strategy_info
    }
}

/// Measurements table
#[derive(Debug)]
pub struct Measurements {
    lifetime: Duration,
    n_items: usize,
}

impl Measurements {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            n_items: 0,
        }
    }

    /// Lifetime given to new entries
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn len(&self) -> usize {
        self.n_items
    }

    pub fn is_empty(&self) -> bool {
        self.n_items == 0
    }

    /// Get or create the entry for `name`, returning whether it is new
    ///
    /// Names deeper than the tree allows use their max-depth prefix.
    pub fn get(&mut self, tree: &mut NameTree, name: &Name, now: Instant) -> (NodeId, bool) {
        let node = tree.lookup(name);
        self.get_from_node(tree, node, now)
    }

    /// Get or create the entry on an existing name tree entry
    ///
    /// This is how a strategy reaches the measurements entry for a FIB or
    /// PIT entry without rehashing its name.
    pub fn get_from_node(&mut self, tree: &mut NameTree, node: NodeId, now: Instant) -> (NodeId, bool) {
        let entry = &mut tree[node];
        if entry.measurements_entry().is_some() {
            return (node, false);
        }
        let name = entry.name().clone();
        debug!(name = %name, "Measurements entry created");
        entry.set_measurements_entry(Entry::new(name, now + self.lifetime));
        self.n_items += 1;
        (node, true)
    }

    /// Get or create the entry one level above `node`
    ///
    /// Returns `None` at the root.
    pub fn get_parent(
        &mut self,
        tree: &mut NameTree,
        node: NodeId,
        now: Instant,
    ) -> Option<(NodeId, bool)> {
        let parent = tree[node].parent()?;
        Some(self.get_from_node(tree, parent, now))
    }

    /// Longest prefix of `name` with an entry satisfying `pred`
    pub fn find_longest_prefix_match(
        &self,
        tree: &NameTree,
        name: &Name,
        pred: impl Fn(&Entry) -> bool,
    ) -> Option<NodeId> {
        tree.find_longest_prefix_match(name, |e| e.measurements_entry().is_some_and(&pred))
    }

    pub fn find_exact_match<'t>(&self, tree: &'t NameTree, name: &Name) -> Option<&'t Entry> {
        tree.find_exact_match(name)
            .and_then(|node| tree[node].measurements_entry())
    }

    /// Keep the entry at `node` alive for at least `lifetime` from now
    ///
    /// Never shortens the current lifetime.
    pub fn extend_lifetime(&self, tree: &mut NameTree, node: NodeId, lifetime: Duration, now: Instant) {
        if let Some(entry) = tree[node].measurements_entry_mut() {
            entry.expiry = entry.expiry.max(now + lifetime);
        }
    }

    /// Erase the entry at `node` if it has expired
    ///
    /// Returns the new expiry when the entry is still alive so the caller
    /// can reschedule, or `None` once it is gone.
    pub fn cleanup(&mut self, tree: &mut NameTree, node: NodeId, now: Instant) -> Option<Instant> {
        let entry = tree.get_mut(node)?;
        let expiry = entry.measurements_entry()?.expiry;
        if expiry > now {
            return Some(expiry);
        }
        if let Some(erased) = entry.take_measurements_entry() {
            self.n_items -= 1;
            debug!(name = %erased.name, "Measurements entry expired");
        }
        tree.erase_if_empty(node, true);
        None
    }

    /// Iterate over every measurements entry
    pub fn iter<'t>(&self, tree: &'t NameTree) -> impl Iterator<Item = &'t Entry> + 't {
        tree.iter().filter_map(|(_, entry)| entry.measurements_entry())
    }
}

impl Default for Measurements {
    fn default() -> Self {
        Self::new(DEFAULT_MEASUREMENTS_LIFETIME)
    }
}

/// Predicate matching name tree entries that carry a measurements entry
pub fn has_measurements_entry(entry: &name_tree::Entry) -> bool {
    entry.measurements_entry().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn test_get_is_idempotent() {
        let now = Instant::now();
        let mut tree = NameTree::default();
        let mut m = Measurements::default();

        let (a, is_new) = m.get(&mut tree, &name("/a/b"), now);
        assert!(is_new);
        let (b, is_new) = m.get(&mut tree, &name("/a/b"), now);
        assert!(!is_new);
        assert_eq!(a, b);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_get_parent() {
        let now = Instant::now();
        let mut tree = NameTree::default();
        let mut m = Measurements::default();

        let (node, _) = m.get(&mut tree, &name("/a/b"), now);
        let (parent, is_new) = m.get_parent(&mut tree, node, now).unwrap();
        assert!(is_new);
        assert_eq!(tree[parent].name(), &name("/a"));

        let root = tree.find_exact_match(&Name::new()).unwrap();
        m.get_from_node(&mut tree, root, now);
        assert!(m.get_parent(&mut tree, root, now).is_none());
    }

    #[test]
    fn test_longest_prefix_match() {
        let now = Instant::now();
        let mut tree = NameTree::default();
        let mut m = Measurements::default();
        m.get(&mut tree, &name("/a"), now);
        m.get(&mut tree, &name("/a/b/c"), now);

        let node = m
            .find_longest_prefix_match(&tree, &name("/a/b/x"), |_| true)
            .unwrap();
        assert_eq!(tree[node].name(), &name("/a"));
        assert!(m.find_longest_prefix_match(&tree, &name("/z"), |_| true).is_none());
    }

    #[test]
    fn test_cleanup_honours_extended_lifetime() {
        let now = Instant::now();
        let mut tree = NameTree::default();
        let mut m = Measurements::new(Duration::from_millis(100));
        let (node, _) = m.get(&mut tree, &name("/a/b"), now);

        m.extend_lifetime(&mut tree, node, Duration::from_millis(300), now);
        let expiry = m.cleanup(&mut tree, node, now + Duration::from_millis(150));
        assert_eq!(expiry, Some(now + Duration::from_millis(300)));

        // extending by less than remains is a no-op
        m.extend_lifetime(&mut tree, node, Duration::from_millis(10), now);
        assert_eq!(m.find_exact_match(&tree, &name("/a/b")).unwrap().expiry(), now + Duration::from_millis(300));

        assert_eq!(m.cleanup(&mut tree, node, now + Duration::from_millis(300)), None);
        assert!(m.is_empty());
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn test_cleanup_keeps_shared_node() {
        let now = Instant::now();
        let mut tree = NameTree::default();
        let mut fib = crate::Fib::new();
        let mut m = Measurements::new(Duration::from_millis(100));
        let (fib_node, _) = fib.insert(&mut tree, &name("/a")).unwrap();
        let (node, _) = m.get_from_node(&mut tree, fib_node, now);

        assert_eq!(m.cleanup(&mut tree, node, now + Duration::from_secs(1)), None);
        assert!(tree[fib_node].fib_entry().is_some());
        assert!(tree[fib_node].measurements_entry().is_none());
    }
}
