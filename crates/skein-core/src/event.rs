//! Observation signals
//!
//! A [`Signal`] is an observation point: handlers connected to it are
//! called synchronously every time it is emitted. Signals have no side
//! effects on forwarding and are safe to leave unconnected.

use std::fmt;

use crate::face::FaceId;
use crate::packet::{Data, Interest};

/// Handle returned by [`Signal::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

type Handler<T> = Box<dyn FnMut(&T) + Send>;

/// Observation point with connectable handlers
pub struct Signal<T> {
    handlers: Vec<(ConnectionId, Handler<T>)>,
    next_id: u64,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }

    /// Connect a handler
    pub fn connect(&mut self, handler: impl FnMut(&T) + Send + 'static) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Disconnect a handler
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    /// Check if any handler is connected
    pub fn is_connected(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// Call every connected handler
    pub fn emit(&mut self, value: &T) {
        for (_, handler) in &mut self.handlers {
            handler(value);
        }
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// A pending Interest is about to be satisfied by Data
#[derive(Debug, Clone)]
pub struct SatisfyEvent {
    pub interest: Interest,
    pub ingress: FaceId,
    pub data: Data,
}

/// A pending Interest is about to expire unsatisfied
#[derive(Debug, Clone)]
pub struct ExpireEvent {
    pub interest: Interest,
}

/// An Interest was answered from the content store
#[derive(Debug, Clone)]
pub struct CsHitEvent {
    pub interest: Interest,
    pub data: Data,
}

/// An Interest found nothing in the content store
#[derive(Debug, Clone)]
pub struct CsMissEvent {
    pub interest: Interest,
}
