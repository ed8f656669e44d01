//! # Skein Tables
//!
//! The name tree and every forwarding table built on it.
//!
//! All per-prefix state hangs off nodes of a single shared [`NameTree`],
//! which is backed by an arena [`Hashtable`] keyed by incremental name
//! hashes. Tables never own tree nodes; they attach their entries to nodes
//! and ask the tree to erase a node once nothing is attached to it.
//!
//! ## Tables
//!
//! - [`Fib`]: prefix to ordered next hops
//! - [`Pit`]: pending Interests with in-records and out-records
//! - [`Cs`]: content store of recently seen Data
//! - [`Measurements`]: per-prefix strategy measurements with a lifetime
//! - [`StrategyChoice`]: which strategy governs each prefix
//! - [`DeadNonceList`]: recently seen (name, nonce) pairs
//!
//! Table methods that touch the tree take it as an explicit `&mut NameTree`
//! argument, so a forwarder can hold the tree and every table side by side.

pub mod cs;
pub mod dead_nonce_list;
pub mod fib;
pub mod hashtable;
pub mod measurements;
pub mod name_tree;
pub mod pit;
pub mod strategy_choice;
pub mod strategy_info;

pub use cs::Cs;
pub use dead_nonce_list::DeadNonceList;
pub use fib::{Fib, NextHop, RemoveNextHopResult};
pub use hashtable::{Hashtable, HashtableOptions, NodeId};
pub use measurements::Measurements;
pub use name_tree::{NameTree, DEFAULT_MAX_DEPTH};
pub use pit::{Pit, PitId};
pub use strategy_choice::StrategyChoice;
pub use strategy_info::StrategyInfoHost;
