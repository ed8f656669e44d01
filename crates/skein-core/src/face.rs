//! Faces and the face table
//!
//! A [`Face`] is the forwarder's view of a network-facing endpoint. Faces
//! are owned by the [`FaceTable`]; routing and pending-Interest state only
//! refer to them by [`FaceId`], so removing a face must be preceded by a
//! cleanup of every table that mentions its id.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FaceError;
use crate::packet::Packet;

/// Identifier of a face
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("{_0}")]
pub struct FaceId(pub u64);

impl FaceId {
    /// Never assigned to a real face
    pub const INVALID: FaceId = FaceId(0);
    /// Pseudo-face that Data served from the content store arrives on
    pub const CONTENT_STORE: FaceId = FaceId(254);
    /// First id handed out by [`FaceTable::allocate_id`]
    pub const FIRST_ASSIGNABLE: FaceId = FaceId(256);

    /// Check if this id is reserved
    pub fn is_reserved(&self) -> bool {
        *self == Self::INVALID || *self == Self::CONTENT_STORE
    }
}

/// Whether a face reaches applications on this host or other nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceScope {
    Local,
    NonLocal,
}

/// Link type of a face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    /// Exactly one remote peer
    PointToPoint,
    /// Broadcast medium shared by several peers
    MultiAccess,
    /// Wireless ad hoc link where a packet may go back out its ingress face
    AdHoc,
}

/// A network-facing endpoint
///
/// `send` must not call back into the forwarder; packets produced in
/// response are fed back through the host event loop.
pub trait Face: Send + Sync + fmt::Debug {
    /// Face identifier
    fn id(&self) -> FaceId;

    /// Face scope
    fn scope(&self) -> FaceScope;

    /// Link type
    fn link_type(&self) -> LinkType;

    /// Check whether the face can currently transmit
    fn is_up(&self) -> bool {
        true
    }

    /// Transmit a packet
    fn send(&self, packet: Packet) -> Result<(), FaceError>;
}

/// Registry of attached faces
#[derive(Debug)]
pub struct FaceTable {
    faces: BTreeMap<FaceId, Arc<dyn Face>>,
    next_id: u64,
}

impl FaceTable {
    pub fn new() -> Self {
        Self {
            faces: BTreeMap::new(),
            next_id: FaceId::FIRST_ASSIGNABLE.0,
        }
    }

    /// Reserve a fresh id for a face about to be created
    pub fn allocate_id(&mut self) -> FaceId {
        let id = FaceId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Attach a face
    pub fn add(&mut self, face: Arc<dyn Face>) -> Result<FaceId, FaceError> {
        let id = face.id();
        if id.is_reserved() {
            return Err(FaceError::ReservedId(id));
        }
        if self.faces.contains_key(&id) {
            return Err(FaceError::DuplicateId(id));
        }
        if id.0 >= self.next_id {
            self.next_id = id.0 + 1;
        }
        debug!(face = %id, scope = ?face.scope(), link = ?face.link_type(), "Face added");
        self.faces.insert(id, face);
        Ok(id)
    }

    /// Look up a face
    pub fn get(&self, id: FaceId) -> Option<&Arc<dyn Face>> {
        self.faces.get(&id)
    }

    /// Detach a face
    pub fn remove(&mut self, id: FaceId) -> Option<Arc<dyn Face>> {
        let removed = self.faces.remove(&id);
        if removed.is_some() {
            debug!(face = %id, "Face removed");
        }
        removed
    }

    pub fn contains(&self, id: FaceId) -> bool {
        self.faces.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Iterate over faces in id order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Face>> {
        self.faces.values()
    }
}

impl Default for FaceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_face::MockFace;

    #[test]
    fn test_add_and_get() {
        let mut table = FaceTable::new();
        let id = table.allocate_id();
        assert_eq!(id, FaceId::FIRST_ASSIGNABLE);

        table.add(Arc::new(MockFace::new(id))).unwrap();
        assert!(table.contains(id));
        assert_eq!(table.get(id).unwrap().id(), id);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_duplicate_and_reserved_ids_rejected() {
        let mut table = FaceTable::new();
        table.add(Arc::new(MockFace::new(FaceId(1)))).unwrap();

        assert_eq!(
            table.add(Arc::new(MockFace::new(FaceId(1)))).unwrap_err(),
            FaceError::DuplicateId(FaceId(1))
        );
        assert_eq!(
            table.add(Arc::new(MockFace::new(FaceId::INVALID))).unwrap_err(),
            FaceError::ReservedId(FaceId::INVALID)
        );
        assert_eq!(
            table
                .add(Arc::new(MockFace::new(FaceId::CONTENT_STORE)))
                .unwrap_err(),
            FaceError::ReservedId(FaceId::CONTENT_STORE)
        );
    }

    #[test]
    fn test_allocate_skips_manual_ids() {
        let mut table = FaceTable::new();
        table.add(Arc::new(MockFace::new(FaceId(300)))).unwrap();
        assert_eq!(table.allocate_id(), FaceId(301));
    }

    #[test]
    fn test_remove() {
        let mut table = FaceTable::new();
        table.add(Arc::new(MockFace::new(FaceId(7)))).unwrap();
        assert!(table.remove(FaceId(7)).is_some());
        assert!(table.remove(FaceId(7)).is_none());
        assert!(table.is_empty());
    }
}
