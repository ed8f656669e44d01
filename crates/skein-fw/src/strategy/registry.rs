//! Strategy registry
//!
//! Maps versioned strategy names to factories. Instance names may omit the
//! version, in which case the highest registered version is used, and may
//! carry parameter components after the version.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use skein_core::{Name, StrategyError};
use tracing::debug;

use super::{BestRouteStrategy, MulticastStrategy, Strategy};
use crate::config::ForwarderConfig;

/// Builds a strategy from its instance name
pub type StrategyFactory =
    Box<dyn Fn(&Name, &ForwarderConfig) -> Result<Arc<dyn Strategy>, StrategyError> + Send + Sync>;

/// An instance name split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstanceName {
    /// Strategy name, including the version component if present
    pub strategy_name: Name,
    pub version: Option<u64>,
    /// Components after the version
    pub parameters: Name,
}

/// Split an instance name at its last version component
///
/// A version in the first position is not recognised, so a name is never
/// split into an empty strategy name.
pub fn parse_instance_name(input: &Name) -> ParsedInstanceName {
    for i in (1..input.len()).rev() {
        if let Some(version) = input[i].to_version() {
            return ParsedInstanceName {
                strategy_name: input.get_prefix(i + 1),
                version: Some(version),
                parameters: input.sub_name(i + 1, input.len()),
            };
        }
    }
    ParsedInstanceName {
        strategy_name: input.clone(),
        version: None,
        parameters: Name::new(),
    }
}

/// Give `input` the version of `strategy_name` unless it already has one
pub fn make_instance_name(input: &Name, strategy_name: &Name) -> Name {
    if input.components().any(|c| c.is_version()) {
        return input.clone();
    }
    match strategy_name.last() {
        Some(version) => input.clone().append(version.clone()),
        None => input.clone(),
    }
}

/// Registry of strategy factories
pub struct StrategyRegistry {
    factories: BTreeMap<Name, StrategyFactory>,
}

impl StrategyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Create a registry holding the built-in strategies
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(BestRouteStrategy::strategy_name(), |name, config| {
            Ok(Arc::new(BestRouteStrategy::new(name, config)?))
        });
        registry.register(MulticastStrategy::strategy_name(), |name, config| {
            Ok(Arc::new(MulticastStrategy::new(name, config)?))
        });
        registry
    }

    /// Register a factory under a versioned strategy name
    ///
    /// # Panics
    ///
    /// Panics if the name has no version or is already registered.
    pub fn register<F>(&mut self, strategy_name: Name, factory: F)
    where
        F: Fn(&Name, &ForwarderConfig) -> Result<Arc<dyn Strategy>, StrategyError> + Send + Sync + 'static,
    {
        assert!(
            parse_instance_name(&strategy_name).version.is_some(),
            "strategy name {strategy_name} has no version"
        );
        assert!(
            !self.factories.contains_key(&strategy_name),
            "strategy {strategy_name} registered twice"
        );
        debug!(strategy = %strategy_name, "Strategy registered");
        self.factories.insert(strategy_name, Box::new(factory));
    }

    /// Check whether some factory can serve `instance_name`
    pub fn can_create(&self, instance_name: &Name) -> bool {
        self.find(instance_name).is_some()
    }

    /// Instantiate the strategy named by `instance_name`
    pub fn create(
        &self,
        instance_name: &Name,
        config: &ForwarderConfig,
    ) -> Result<Arc<dyn Strategy>, StrategyError> {
        let Some((key, factory)) = self.find(instance_name) else {
            return Err(StrategyError::NotRegistered(instance_name.clone()));
        };
        let strategy = factory(instance_name, config)?;
        debug!(strategy = %key, instance = %strategy.instance_name(), "Strategy created");
        Ok(strategy)
    }

    /// Registered strategy names in canonical order
    pub fn list(&self) -> Vec<Name> {
        self.factories.keys().cloned().collect()
    }

    /// A versioned name resolves to that version or the next higher one
    /// of the same strategy; an unversioned name to the highest version.
    ///
    /// A registered key matches only when it is the strategy name plus
    /// exactly one version component.
    fn find(&self, instance_name: &Name) -> Option<(&Name, &StrategyFactory)> {
        let parsed = parse_instance_name(instance_name);
        if parsed.version.is_some() {
            let family = parsed.strategy_name.get_prefix_back(1);
            return self
                .factories
                .range(parsed.strategy_name.clone()..)
                .take_while(|(key, _)| family.is_prefix_of(key))
                .find(|(key, _)| key.len() == parsed.strategy_name.len());
        }
        if parsed.strategy_name.is_empty() {
            return None;
        }
        self.factories
            .range(parsed.strategy_name.clone()..)
            .take_while(|(key, _)| parsed.strategy_name.is_prefix_of(key))
            .filter(|(key, _)| key.len() == parsed.strategy_name.len() + 1)
            .last()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
