//! Per-strategy scratch state attached to table entries
//!
//! Strategies keep their own bookkeeping (suppression intervals, RTT
//! samples, ...) on PIT entries, out-records, and measurements entries
//! through a [`StrategyInfoHost`], keyed by the Rust type of the info.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Type-keyed storage for strategy info
#[derive(Default)]
pub struct StrategyInfoHost {
    items: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl StrategyInfoHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the info of type `T`
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.items
            .get(&TypeId::of::<T>())
            .and_then(|item| item.downcast_ref())
    }

    /// Get the info of type `T` mutably
    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.items
            .get_mut(&TypeId::of::<T>())
            .and_then(|item| item.downcast_mut())
    }

    /// Get the info of type `T`, creating it with `init` if absent
    ///
    /// Returns whether it was newly created.
    pub fn insert_strategy_info<T: Any + Send + Sync>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> (&mut T, bool) {
        let mut is_new = false;
        let item = self.items.entry(TypeId::of::<T>()).or_insert_with(|| {
            is_new = true;
            Box::new(init())
        });
        match item.downcast_mut() {
            Some(info) => (info, is_new),
            None => unreachable!("strategy info stored under a foreign TypeId"),
        }
    }

    /// Remove the info of type `T`
    pub fn erase_strategy_info<T: Any + Send + Sync>(&mut self) -> bool {
        self.items.remove(&TypeId::of::<T>()).is_some()
    }

    /// Remove all info
    pub fn clear_strategy_info(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Debug for StrategyInfoHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyInfoHost")
            .field("items", &self.items.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    #[derive(Debug, PartialEq)]
    struct Label(&'static str);

    #[test]
    fn test_insert_once() {
        let mut host = StrategyInfoHost::new();
        let (c, is_new) = host.insert_strategy_info(|| Counter(1));
        assert!(is_new);
        c.0 += 1;

        let (c, is_new) = host.insert_strategy_info(|| Counter(100));
        assert!(!is_new);
        assert_eq!(c.0, 2);
    }

    #[test]
    fn test_types_are_independent() {
        let mut host = StrategyInfoHost::new();
        host.insert_strategy_info(|| Counter(7));
        host.insert_strategy_info(|| Label("x"));

        assert_eq!(host.get::<Counter>(), Some(&Counter(7)));
        assert_eq!(host.get::<Label>(), Some(&Label("x")));

        assert!(host.erase_strategy_info::<Counter>());
        assert!(host.get::<Counter>().is_none());
        assert!(host.get::<Label>().is_some());

        host.clear_strategy_info();
        assert!(host.is_empty());
    }
}
