//! Forwarder configuration
//!
//! [`ForwarderConfig`] gathers every tunable of the forwarder and its
//! tables. It can be built in code from one of the presets, or loaded from
//! TOML where all durations are written in milliseconds:
//!
//! ```toml
//! node_id = "edge-1"
//! max_depth = 32
//! cs_capacity = 500
//! default_strategy = "/localhost/skein/strategy/best-route"
//! unsolicited_policy = "admit-local"
//!
//! [hashtable]
//! initial_size = 1024
//! min_size = 1024
//!
//! [retx_suppression]
//! initial_interval = 10
//! multiplier = 2.0
//! max_interval = 250
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skein_core::{DEFAULT_INTEREST_LIFETIME, Name};
use skein_table::HashtableOptions;
use skein_table::cs::DEFAULT_CS_CAPACITY;
use skein_table::dead_nonce_list;
use skein_table::measurements::DEFAULT_MEASUREMENTS_LIFETIME;
use skein_table::name_tree::DEFAULT_MAX_DEPTH;

use crate::error::ConfigError;
use crate::retx_suppression::RetxSuppressionConfig;
use crate::strategy::BestRouteStrategy;
use crate::unsolicited::UnsolicitedDataPolicy;

/// Configuration of a forwarder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Tags this forwarder's log lines
    pub node_id: String,
    /// Name tree hashtable sizing
    pub hashtable: HashtableOptions,
    /// Deepest prefix the name tree indexes
    pub max_depth: usize,
    /// Lifetime given to Interests that applications create
    #[serde(with = "duration_ms")]
    pub default_interest_lifetime: Duration,
    /// Content store capacity in packets
    pub cs_capacity: usize,
    /// How long a retired nonce is remembered
    #[serde(with = "duration_ms")]
    pub dead_nonce_lifetime: Duration,
    /// Maximum number of remembered nonces
    pub dead_nonce_capacity: usize,
    /// Initial lifetime of a measurements entry
    #[serde(with = "duration_ms")]
    pub measurements_lifetime: Duration,
    /// Retransmission suppression parameters used by built-in strategies
    pub retx_suppression: RetxSuppressionConfig,
    /// Strategy bound to the root prefix
    pub default_strategy: Name,
    /// What to do with Data nobody asked for
    pub unsolicited_policy: UnsolicitedDataPolicy,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            node_id: "skein".to_string(),
            hashtable: HashtableOptions::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            default_interest_lifetime: DEFAULT_INTEREST_LIFETIME,
            cs_capacity: DEFAULT_CS_CAPACITY,
            dead_nonce_lifetime: dead_nonce_list::DEFAULT_LIFETIME,
            dead_nonce_capacity: dead_nonce_list::DEFAULT_CAPACITY,
            measurements_lifetime: DEFAULT_MEASUREMENTS_LIFETIME,
            retx_suppression: RetxSuppressionConfig::default(),
            default_strategy: BestRouteStrategy::strategy_name(),
            unsolicited_policy: UnsolicitedDataPolicy::default(),
        }
    }
}

impl ForwarderConfig {
    /// Create a config for small or embedded nodes
    ///
    /// Keeps tables small and forgets state sooner.
    pub fn low_memory() -> Self {
        Self {
            hashtable: HashtableOptions::with_size(16),
            cs_capacity: 50,
            dead_nonce_capacity: 4096,
            measurements_lifetime: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Create a config for busy core nodes
    ///
    /// Starts with a large hashtable so it rarely resizes, and caches more.
    pub fn high_throughput() -> Self {
        Self {
            hashtable: HashtableOptions::with_size(1 << 16),
            cs_capacity: 1 << 16,
            dead_nonce_capacity: 1 << 20,
            ..Self::default()
        }
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn with_cs_capacity(mut self, capacity: usize) -> Self {
        self.cs_capacity = capacity;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_hashtable(mut self, options: HashtableOptions) -> Self {
        self.hashtable = options;
        self
    }

    pub fn with_default_strategy(mut self, strategy: Name) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn with_unsolicited_policy(mut self, policy: UnsolicitedDataPolicy) -> Self {
        self.unsolicited_policy = policy;
        self
    }

    pub fn with_retx_suppression(mut self, retx: RetxSuppressionConfig) -> Self {
        self.retx_suppression = retx;
        self
    }

    /// Parse a config from TOML text
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration invariants
    ///
    /// Returns a list of problems; an empty list means the configuration is
    /// valid. Fatal problems make [`Forwarder::new`](crate::Forwarder::new)
    /// fail.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !self.hashtable.is_valid() {
            warnings.push(ConfigWarning::InvalidHashtableOptions);
        }
        if self.max_depth == 0 {
            warnings.push(ConfigWarning::ZeroMaxDepth);
        }
        if !self.retx_suppression.is_valid() {
            warnings.push(ConfigWarning::InvalidRetxSuppression);
        }
        if self.dead_nonce_lifetime.is_zero() {
            warnings.push(ConfigWarning::ZeroDeadNonceLifetime);
        }
        if self.measurements_lifetime.is_zero() {
            warnings.push(ConfigWarning::ZeroMeasurementsLifetime);
        }

        // Non-fatal
        if self.cs_capacity == 0 {
            warnings.push(ConfigWarning::ContentStoreDisabled);
        }
        if self.dead_nonce_lifetime < self.default_interest_lifetime {
            warnings.push(ConfigWarning::DeadNonceLifetimeShort);
        }

        warnings
    }

    /// Check if the configuration has no problems at all
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Fail on the first fatal problem
    pub fn check(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().find(ConfigWarning::is_fatal) {
            Some(warning) => Err(ConfigError::Invalid {
                field: warning.field(),
                reason: warning.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Configuration warnings and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Hashtable options violate their invariants
    InvalidHashtableOptions,
    /// Name tree cannot hold any prefix but the root
    ZeroMaxDepth,
    /// Suppression interval or multiplier is out of range
    InvalidRetxSuppression,
    /// Dead nonce list would forget nonces immediately
    ZeroDeadNonceLifetime,
    /// Measurements entries would expire immediately
    ZeroMeasurementsLifetime,
    /// Content store capacity is zero
    ContentStoreDisabled,
    /// Nonces are forgotten before a default Interest expires
    DeadNonceLifetimeShort,
}

impl ConfigWarning {
    /// Whether the forwarder refuses to start with this problem
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ConfigWarning::ContentStoreDisabled | ConfigWarning::DeadNonceLifetimeShort
        )
    }

    /// Config field the problem concerns
    pub fn field(&self) -> &'static str {
        match self {
            ConfigWarning::InvalidHashtableOptions => "hashtable",
            ConfigWarning::ZeroMaxDepth => "max_depth",
            ConfigWarning::InvalidRetxSuppression => "retx_suppression",
            ConfigWarning::ZeroDeadNonceLifetime => "dead_nonce_lifetime",
            ConfigWarning::ZeroMeasurementsLifetime => "measurements_lifetime",
            ConfigWarning::ContentStoreDisabled => "cs_capacity",
            ConfigWarning::DeadNonceLifetimeShort => "dead_nonce_lifetime",
        }
    }
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::InvalidHashtableOptions => {
                write!(f, "hashtable options are inconsistent")
            }
            ConfigWarning::ZeroMaxDepth => write!(f, "max_depth must be at least 1"),
            ConfigWarning::InvalidRetxSuppression => {
                write!(f, "retx_suppression needs initial > 0, multiplier >= 1, max >= initial")
            }
            ConfigWarning::ZeroDeadNonceLifetime => write!(f, "dead_nonce_lifetime is zero"),
            ConfigWarning::ZeroMeasurementsLifetime => write!(f, "measurements_lifetime is zero"),
            ConfigWarning::ContentStoreDisabled => write!(f, "cs_capacity is zero, caching disabled"),
            ConfigWarning::DeadNonceLifetimeShort => {
                write!(f, "dead_nonce_lifetime is shorter than default_interest_lifetime")
            }
        }
    }
}

/// Serde adapter writing a [`Duration`] as whole milliseconds
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
