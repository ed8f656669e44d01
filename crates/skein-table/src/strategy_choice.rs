//! Strategy choice table
//!
//! Binds name prefixes to strategy instance names. The effective strategy
//! for a name is the choice at its longest bound prefix; the root always
//! carries one once a default strategy has been set.
//!
//! This table stores instance names only. Instantiating strategies is the
//! forwarder's concern.

use skein_core::{Name, NameError};
use tracing::debug;

use crate::hashtable::NodeId;
use crate::measurements;
use crate::name_tree::{self, NameTree};
use crate::pit::Pit;

/// A strategy choice entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    prefix: Name,
    instance_name: Name,
}

impl Entry {
    pub fn new(prefix: Name, instance_name: Name) -> Self {
        Self {
            prefix,
            instance_name,
        }
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    /// Instance name of the chosen strategy
    pub fn instance_name(&self) -> &Name {
        &self.instance_name
    }
}

/// Strategy choice table
#[derive(Debug, Default)]
pub struct StrategyChoice {
    n_items: usize,
}

impl StrategyChoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.n_items
    }

    pub fn is_empty(&self) -> bool {
        self.n_items == 0
    }

    /// Set the strategy bound to the root prefix
    pub fn set_default_strategy(&mut self, tree: &mut NameTree, instance_name: Name) {
        let root = tree.lookup(&Name::new());
        let entry = &mut tree[root];
        match entry.strategy_choice_entry_mut() {
            Some(existing) => existing.instance_name = instance_name,
            None => {
                entry.set_strategy_choice_entry(Entry::new(Name::new(), instance_name));
                self.n_items += 1;
            }
        }
        debug!(strategy = %self.default_name(tree), "Default strategy set");
    }

    /// Bind `prefix` to a strategy
    ///
    /// When the effective strategy of any name under `prefix` changes,
    /// strategy info on the affected PIT and measurements entries is
    /// cleared, since it belonged to the previous strategy.
    pub fn insert(
        &mut self,
        tree: &mut NameTree,
        pit: &mut Pit,
        prefix: &Name,
        instance_name: Name,
    ) -> Result<(), NameError> {
        tree.check_depth(prefix)?;
        let node = tree.lookup(prefix);
        let old = self.find_effective_strategy_from(tree, node).cloned();

        let entry = &mut tree[node];
        match entry.strategy_choice_entry_mut() {
            Some(existing) => existing.instance_name = instance_name.clone(),
            None => {
                entry.set_strategy_choice_entry(Entry::new(prefix.clone(), instance_name.clone()));
                self.n_items += 1;
            }
        }
        debug!(prefix = %prefix, strategy = %instance_name, "Strategy choice set");

        if old.as_ref() != Some(&instance_name) {
            clear_strategy_info(tree, pit, node);
        }
        Ok(())
    }

    /// Unbind `prefix`, returning whether a choice was removed
    ///
    /// The root choice cannot be erased.
    pub fn erase(&mut self, tree: &mut NameTree, pit: &mut Pit, prefix: &Name) -> bool {
        if prefix.is_empty() {
            return false;
        }
        let Some(node) = tree.find_exact_match(prefix) else {
            return false;
        };
        let Some(old) = tree[node].strategy_choice_entry().map(|e| e.instance_name.clone()) else {
            return false;
        };
        let parent_choice = tree[node]
            .parent()
            .and_then(|parent| self.find_effective_strategy_from(tree, parent))
            .cloned();
        if parent_choice.as_ref() != Some(&old) {
            clear_strategy_info(tree, pit, node);
        }

        tree[node].take_strategy_choice_entry();
        self.n_items -= 1;
        debug!(prefix = %prefix, "Strategy choice erased");
        tree.erase_if_empty(node, true);
        true
    }

    /// Strategy bound exactly at `prefix`
    pub fn get<'t>(&self, tree: &'t NameTree, prefix: &Name) -> Option<&'t Name> {
        tree.find_exact_match(prefix)
            .and_then(|node| tree[node].strategy_choice_entry())
            .map(Entry::instance_name)
    }

    /// Strategy governing `name`
    pub fn find_effective_strategy<'t>(&self, tree: &'t NameTree, name: &Name) -> Option<&'t Name> {
        tree.find_longest_prefix_match(name, has_strategy_choice_entry)
            .and_then(|node| tree[node].strategy_choice_entry())
            .map(Entry::instance_name)
    }

    /// Strategy governing the entry at `node`
    ///
    /// Used for PIT and measurements entries, which already know their
    /// place in the tree.
    pub fn find_effective_strategy_from<'t>(&self, tree: &'t NameTree, node: NodeId) -> Option<&'t Name> {
        tree.find_longest_prefix_match_from(node, has_strategy_choice_entry)
            .and_then(|node| tree[node].strategy_choice_entry())
            .map(Entry::instance_name)
    }

    /// Iterate over every strategy choice entry
    pub fn iter<'t>(&self, tree: &'t NameTree) -> impl Iterator<Item = &'t Entry> + 't {
        tree.iter().filter_map(|(_, entry)| entry.strategy_choice_entry())
    }

    fn default_name(&self, tree: &NameTree) -> String {
        self.get(tree, &Name::new())
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

fn has_strategy_choice_entry(entry: &name_tree::Entry) -> bool {
    entry.strategy_choice_entry().is_some()
}

/// Clear strategy info below `node`, stopping at prefixes that carry their
/// own strategy choice
fn clear_strategy_info(tree: &mut NameTree, pit: &mut Pit, node: NodeId) {
    let prefix = tree[node].name().clone();
    let nodes = tree.partial_enumerate(&prefix, |entry| {
        if entry.name() != &prefix && has_strategy_choice_entry(entry) {
            return (false, false);
        }
        let visit = entry.has_pit_entries() || measurements::has_measurements_entry(entry);
        (visit, true)
    });

    for node in nodes {
        for id in tree[node].pit_entries().to_vec() {
            if let Some(entry) = pit.get_mut(id) {
                entry.clear_strategy_info();
            }
        }
        if let Some(entry) = tree[node].measurements_entry_mut() {
            entry.strategy_info_mut().clear_strategy_info();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::Interest;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    struct Marker;

    fn setup() -> (NameTree, Pit, StrategyChoice) {
        let mut tree = NameTree::default();
        let mut sc = StrategyChoice::new();
        sc.set_default_strategy(&mut tree, name("/strategy/default"));
        (tree, Pit::new(), sc)
    }

    #[test]
    fn test_effective_strategy() {
        let (mut tree, mut pit, mut sc) = setup();
        sc.insert(&mut tree, &mut pit, &name("/a"), name("/strategy/A")).unwrap();
        sc.insert(&mut tree, &mut pit, &name("/a/b/c"), name("/strategy/C")).unwrap();

        assert_eq!(sc.find_effective_strategy(&tree, &name("/a/b")), Some(&name("/strategy/A")));
        assert_eq!(sc.find_effective_strategy(&tree, &name("/a/b/c/d")), Some(&name("/strategy/C")));
        assert_eq!(sc.find_effective_strategy(&tree, &name("/z")), Some(&name("/strategy/default")));
        assert_eq!(sc.get(&tree, &name("/a/b")), None);
        assert_eq!(sc.len(), 3);
    }

    #[test]
    fn test_insert_replaces() {
        let (mut tree, mut pit, mut sc) = setup();
        sc.insert(&mut tree, &mut pit, &name("/a"), name("/strategy/A")).unwrap();
        sc.insert(&mut tree, &mut pit, &name("/a"), name("/strategy/B")).unwrap();
        assert_eq!(sc.get(&tree, &name("/a")), Some(&name("/strategy/B")));
        assert_eq!(sc.len(), 2);
    }

    #[test]
    fn test_insert_too_deep() {
        let mut tree = NameTree::new(2, Default::default());
        let mut pit = Pit::new();
        let mut sc = StrategyChoice::new();
        assert!(sc.insert(&mut tree, &mut pit, &name("/a/b/c"), name("/s")).is_err());
        assert!(sc.is_empty());
    }

    #[test]
    fn test_erase() {
        let (mut tree, mut pit, mut sc) = setup();
        sc.insert(&mut tree, &mut pit, &name("/a/b"), name("/strategy/A")).unwrap();
        let before = tree.len();

        assert!(sc.erase(&mut tree, &mut pit, &name("/a/b")));
        assert!(!sc.erase(&mut tree, &mut pit, &name("/a/b")));
        assert_eq!(tree.len(), before - 2);
        assert_eq!(sc.find_effective_strategy(&tree, &name("/a/b")), Some(&name("/strategy/default")));
    }

    #[test]
    fn test_root_cannot_be_erased() {
        let (mut tree, mut pit, mut sc) = setup();
        assert!(!sc.erase(&mut tree, &mut pit, &Name::new()));
        assert_eq!(sc.get(&tree, &Name::new()), Some(&name("/strategy/default")));
    }

    #[test]
    fn test_change_clears_strategy_info_below() {
        let (mut tree, mut pit, mut sc) = setup();
        sc.insert(&mut tree, &mut pit, &name("/a/x"), name("/strategy/X")).unwrap();

        let (under_a, _) = pit.insert(&mut tree, &Interest::new(name("/a/b")));
        let (under_x, _) = pit.insert(&mut tree, &Interest::new(name("/a/x/1")));
        for id in [under_a, under_x] {
            pit.get_mut(id).unwrap().strategy_info_mut().insert_strategy_info(|| Marker);
        }

        sc.insert(&mut tree, &mut pit, &name("/a"), name("/strategy/A")).unwrap();
        assert!(pit.get(under_a).unwrap().strategy_info().get::<Marker>().is_none());
        assert!(pit.get(under_x).unwrap().strategy_info().get::<Marker>().is_some());
    }

    #[test]
    fn test_same_strategy_keeps_strategy_info() {
        let (mut tree, mut pit, mut sc) = setup();
        let (id, _) = pit.insert(&mut tree, &Interest::new(name("/a/b")));
        pit.get_mut(id).unwrap().strategy_info_mut().insert_strategy_info(|| Marker);

        sc.insert(&mut tree, &mut pit, &name("/a"), name("/strategy/default")).unwrap();
        assert!(pit.get(id).unwrap().strategy_info().get::<Marker>().is_some());
    }
}
