//! Mock face implementation for testing
//!
//! [`MockFace`] records every packet the forwarder sends through it, so
//! pipeline tests can assert on exactly what went out and where.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use skein_core::{FaceId, MockFace};
//!
//! let face = Arc::new(MockFace::new(FaceId(1)));
//! forwarder.add_face(face.clone())?;
//! forwarder.receive(FaceId(2), interest.into())?;
//! assert_eq!(face.sent_interests().len(), 1);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::FaceError;
use crate::face::{Face, FaceId, FaceScope, LinkType};
use crate::packet::{Data, Interest, Nack, Packet};

/// A face that records sent packets in memory
#[derive(Debug)]
pub struct MockFace {
    id: FaceId,
    scope: FaceScope,
    link_type: LinkType,
    up: AtomicBool,
    sent: Mutex<Vec<Packet>>,
}

impl MockFace {
    /// Create a non-local point-to-point face
    pub fn new(id: FaceId) -> Self {
        Self {
            id,
            scope: FaceScope::NonLocal,
            link_type: LinkType::PointToPoint,
            up: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Set the face scope
    pub fn with_scope(mut self, scope: FaceScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the link type
    pub fn with_link_type(mut self, link_type: LinkType) -> Self {
        self.link_type = link_type;
        self
    }

    /// Bring the face up or down
    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    /// All packets sent so far
    pub fn sent_packets(&self) -> Vec<Packet> {
        self.sent.lock().clone()
    }

    /// Interests sent so far
    pub fn sent_interests(&self) -> Vec<Interest> {
        self.sent
            .lock()
            .iter()
            .filter_map(|p| match p {
                Packet::Interest(i) => Some(i.clone()),
                _ => None,
            })
            .collect()
    }

    /// Data sent so far
    pub fn sent_data(&self) -> Vec<Data> {
        self.sent
            .lock()
            .iter()
            .filter_map(|p| match p {
                Packet::Data(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    /// Nacks sent so far
    pub fn sent_nacks(&self) -> Vec<Nack> {
        self.sent
            .lock()
            .iter()
            .filter_map(|p| match p {
                Packet::Nack(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    /// Drain the record of sent packets
    pub fn take_sent(&self) -> Vec<Packet> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Face for MockFace {
    fn id(&self) -> FaceId {
        self.id
    }

    fn scope(&self) -> FaceScope {
        self.scope
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    fn send(&self, packet: Packet) -> Result<(), FaceError> {
        if !self.is_up() {
            return Err(FaceError::FaceDown(self.id));
        }
        self.sent.lock().push(packet);
        Ok(())
    }
}
