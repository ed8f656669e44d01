//! # Skein Forwarder
//!
//! Packet pipelines, forwarding strategies, and the host runtime.
//!
//! ## Core Components
//!
//! - [`Forwarder`]: owns the tables from `skein-table` and runs the Interest,
//!   Data, and Nack pipelines
//! - [`Strategy`]: forwarding decisions, resolved per name through the
//!   strategy choice table; [`BestRouteStrategy`] and [`MulticastStrategy`]
//!   are built in
//! - [`StrategyRegistry`]: versioned strategy names to factories
//! - [`RetxSuppressionExponential`]: throttles consumer retransmissions
//! - [`ForwarderConfig`]: table sizes, lifetimes, and policies, loadable from TOML
//! - [`ForwarderRuntime`]: tokio event loop feeding packets and timers to a
//!   forwarder
//! - [`app`]: a producer and an RTT-driven consumer
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skein_core::{Interest, ManualClock, MockFace, FaceId};
//! use skein_fw::{Forwarder, ForwarderConfig};
//!
//! let mut forwarder = Forwarder::new(ForwarderConfig::default(), Arc::new(ManualClock::new()))?;
//! forwarder.add_face(Arc::new(MockFace::new(FaceId(256))))?;
//! forwarder.add_face(Arc::new(MockFace::new(FaceId(257))))?;
//! forwarder.add_next_hop(&"/a".parse()?, FaceId(257), 10)?;
//!
//! forwarder.receive(FaceId(256), Interest::new("/a/b".parse()?).into())?;
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod retx_suppression;
pub mod runtime;
pub mod strategy;
pub mod unsolicited;

// Re-export main types
pub use config::{ConfigWarning, ForwarderConfig};
pub use error::{ConfigError, FwError, FwResult};
pub use forwarder::{Forwarder, ForwarderCounters, ForwarderSignals, InsertResult};
pub use retx_suppression::{RetxSuppressionConfig, RetxSuppressionExponential, RetxSuppressionResult};
pub use runtime::{FaceHandle, ForwarderRuntime};
pub use strategy::{BestRouteStrategy, MulticastStrategy, Strategy, StrategyRegistry};
pub use unsolicited::{UnsolicitedDataDecision, UnsolicitedDataPolicy};
