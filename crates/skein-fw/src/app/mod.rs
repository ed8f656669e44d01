//! Applications that run on top of a [`ForwarderRuntime`](crate::runtime::ForwarderRuntime)
//!
//! - [`Producer`]: answers Interests under a prefix
//! - [`Consumer`]: requests sequence-numbered Data and retransmits on timeout
//! - [`RttEstimator`]: retransmission timeout from measured round trips

mod consumer;
mod producer;
mod rtt;

pub use consumer::{Consumer, ConsumerStats, Retrieval};
pub use producer::Producer;
pub use rtt::RttEstimator;
