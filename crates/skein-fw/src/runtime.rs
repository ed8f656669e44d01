//! Async host runtime
//!
//! [`ForwarderRuntime`] owns a [`Forwarder`] and drives it from a single
//! tokio task. Faces created through [`ForwarderRuntime::add_face`] are
//! backed by bounded channels: packets an application sends through its
//! [`FaceHandle`] queue on the runtime's inbound channel, and packets the
//! forwarder emits land on the handle's receive queue.
//!
//! The loop handles one event at a time, so pipelines never interleave:
//!
//! ```text
//! select! {
//!     shutdown changed   ─▶ stop, hand the Forwarder back
//!     inbound (face, pkt) ─▶ Forwarder::receive
//!     next timer deadline ─▶ Forwarder::process_timers
//! }
//! ```
//!
//! The loop runs inside a `node` span carrying the forwarder's
//! [`node_id`](crate::ForwarderConfig::node_id), so the log lines of several
//! forwarders in one process can be told apart.

use std::sync::Arc;

use skein_core::{Face, FaceError, FaceId, FaceScope, LinkType, Packet};
use skein_logging::NodeContextGuard;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, trace, warn};

use crate::error::{FwError, FwResult};
use crate::forwarder::Forwarder;

/// Capacity of the shared channel carrying packets into the forwarder
pub const INBOUND_QUEUE_CAPACITY: usize = 1024;

/// Capacity of each face's outgoing queue
pub const FACE_QUEUE_CAPACITY: usize = 256;

/// Drives a [`Forwarder`] from packet channels and its timer queue
pub struct ForwarderRuntime {
    forwarder: Forwarder,
    inbound_tx: mpsc::Sender<(FaceId, Packet)>,
    inbound_rx: mpsc::Receiver<(FaceId, Packet)>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ForwarderRuntime {
    /// Wrap `forwarder`; the loop stops once `true` is sent on the shutdown channel
    pub fn new(forwarder: Forwarder, shutdown_rx: watch::Receiver<bool>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        Self {
            forwarder,
            inbound_tx,
            inbound_rx,
            shutdown_rx,
        }
    }

    /// Sender for injecting packets as if they arrived on a face
    pub fn inbound(&self) -> mpsc::Sender<(FaceId, Packet)> {
        self.inbound_tx.clone()
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Access the forwarder before the loop starts, e.g. to install routes
    pub fn forwarder_mut(&mut self) -> &mut Forwarder {
        &mut self.forwarder
    }

    /// Create a channel-backed face and register it with the forwarder
    pub fn add_face(&mut self, scope: FaceScope, link_type: LinkType) -> FwResult<FaceHandle> {
        let id = self.forwarder.allocate_face_id();
        let (tx, rx) = mpsc::channel(FACE_QUEUE_CAPACITY);
        let face = ChannelFace {
            id,
            scope,
            link_type,
            tx,
        };
        self.forwarder.add_face(Arc::new(face))?;
        debug!(face = %id, ?scope, ?link_type, "Channel face added");
        Ok(FaceHandle {
            id,
            inbound: self.inbound_tx.clone(),
            rx,
        })
    }

    /// Spawn the loop as a background task
    ///
    /// The task returns the forwarder when it stops, so callers can inspect
    /// its tables and counters.
    pub fn spawn(self) -> JoinHandle<Forwarder> {
        tokio::spawn(self.run())
    }

    /// Run until shutdown is signalled or every inbound sender is gone
    pub async fn run(self) -> Forwarder {
        let span = {
            let _context = NodeContextGuard::new(&self.forwarder.config().node_id);
            NodeContextGuard::span()
        };
        self.run_loop().instrument(span).await
    }

    async fn run_loop(mut self) -> Forwarder {
        info!(faces = self.forwarder.faces().len(), "Forwarder runtime started");
        // The runtime's own sender would keep the channel open forever.
        drop(self.inbound_tx);

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }
            let deadline = self.forwarder.next_timer_deadline();
            let timer = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break;
                    }
                }
                received = self.inbound_rx.recv() => {
                    let Some((face, packet)) = received else {
                        debug!("All inbound senders dropped");
                        break;
                    };
                    trace!(face = %face, name = %packet.name(), "Packet received");
                    if let Err(e) = self.forwarder.receive(face, packet) {
                        warn!(face = %face, error = %e, "Failed to process packet");
                    }
                }
                _ = timer => {
                    let fired = self.forwarder.process_timers();
                    trace!(fired, "Timers processed");
                }
            }
        }

        info!("Forwarder runtime shutting down");
        self.forwarder
    }
}

impl std::fmt::Debug for ForwarderRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwarderRuntime")
            .field("forwarder", &self.forwarder)
            .finish_non_exhaustive()
    }
}

/// A face whose outgoing packets go to an mpsc channel
#[derive(Debug)]
struct ChannelFace {
    id: FaceId,
    scope: FaceScope,
    link_type: LinkType,
    tx: mpsc::Sender<Packet>,
}

impl Face for ChannelFace {
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
        !self.tx.is_closed()
    }

    fn send(&self, packet: Packet) -> Result<(), FaceError> {
        self.tx.try_send(packet).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => FaceError::QueueFull(self.id),
            mpsc::error::TrySendError::Closed(_) => FaceError::Closed(self.id),
        })
    }
}

/// Application end of a channel-backed face
///
/// Dropping the handle takes the face down; the forwarder then drops
/// packets addressed to it.
#[derive(Debug)]
pub struct FaceHandle {
    id: FaceId,
    inbound: mpsc::Sender<(FaceId, Packet)>,
    rx: mpsc::Receiver<Packet>,
}

impl FaceHandle {
    pub fn id(&self) -> FaceId {
        self.id
    }

    /// Hand a packet to the forwarder as arriving on this face
    pub async fn send(&self, packet: impl Into<Packet>) -> FwResult<()> {
        self.inbound
            .send((self.id, packet.into()))
            .await
            .map_err(|_| FwError::ChannelClosed)
    }

    /// Next packet the forwarder sent out of this face
    ///
    /// Returns `None` once the forwarder has stopped and the queue is drained.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Take a queued packet without waiting
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.rx.try_recv().ok()
    }
}
