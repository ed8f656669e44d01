//! # Skein Core
//!
//! Core types, traits, and errors for the Skein name-based forwarder.
//!
//! Everything here is independent of the forwarding tables: the table and
//! pipeline crates build on these abstractions so the same engine can be
//! driven by in-memory test faces or by a real host event loop.
//!
//! ## Key Traits
//!
//! - [`Face`]: A network-facing endpoint the forwarder sends packets through
//! - [`Clock`]: Time abstraction for testability
//!
//! ## Key Types
//!
//! - [`Name`]: Hierarchical, prefix-comparable packet name
//! - [`Interest`], [`Data`], [`Nack`]: The three packet kinds
//! - [`FaceTable`]: Registry of attached faces
//! - [`Scheduler`]: Cancellable delayed-task queue
//! - [`Signal`]: Observation point with connectable handlers

pub mod clock;
pub mod error;
pub mod event;
pub mod face;
pub mod mock_face;
pub mod name;
pub mod packet;
pub mod scheduler;

// Re-export main types
pub use clock::*;
pub use error::*;
pub use event::*;
pub use face::*;
pub use mock_face::*;
pub use name::*;
pub use packet::*;
pub use scheduler::*;
