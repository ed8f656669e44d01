//! Data producer

use std::time::Duration;

use bytes::Bytes;
use skein_core::{Data, Interest, Name, Packet};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::FwResult;
use crate::runtime::FaceHandle;

const DEFAULT_PAYLOAD_SIZE: usize = 1024;

/// Answers every Interest under its prefix with zero-filled content
#[derive(Debug, Clone)]
pub struct Producer {
    prefix: Name,
    payload_size: usize,
    freshness: Duration,
}

impl Producer {
    pub fn new(prefix: Name) -> Self {
        Self {
            prefix,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            freshness: Duration::ZERO,
        }
    }

    pub fn with_payload_size(mut self, payload_size: usize) -> Self {
        self.payload_size = payload_size;
        self
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    /// Build the Data answering `interest`, named exactly as requested
    ///
    /// Returns `None` for names outside the prefix.
    pub fn make_data(&self, interest: &Interest) -> Option<Data> {
        if !self.prefix.is_prefix_of(&interest.name) {
            return None;
        }
        let content = Bytes::from(vec![0u8; self.payload_size]);
        Some(Data::new(interest.name.clone(), content).with_freshness_period(self.freshness))
    }

    /// Serve Interests arriving on `face` until shutdown
    ///
    /// Returns the number of Data packets sent.
    pub async fn run(&self, mut face: FaceHandle, mut shutdown: watch::Receiver<bool>) -> FwResult<u64> {
        info!(prefix = %self.prefix, face = %face.id(), "Producer started");
        let mut served = 0;
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                packet = face.recv() => {
                    let Some(packet) = packet else {
                        break;
                    };
                    let Packet::Interest(interest) = packet else {
                        continue;
                    };
                    match self.make_data(&interest) {
                        Some(data) => {
                            debug!(name = %data.name, "Producer answering");
                            face.send(data).await?;
                            served += 1;
                        }
                        None => debug!(interest = %interest, "Interest outside producer prefix"),
                    }
                }
            }
        }
        info!(prefix = %self.prefix, served, "Producer stopped");
        Ok(served)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_data() {
        let producer = Producer::new("/p".parse().unwrap())
            .with_payload_size(16)
            .with_freshness(Duration::from_secs(1));
        let interest = Interest::new("/p/x/1".parse().unwrap());
        let data = producer.make_data(&interest).unwrap();
        assert_eq!(data.name, interest.name);
        assert_eq!(data.content.len(), 16);
        assert!(data.content.iter().all(|b| *b == 0));
        assert_eq!(data.freshness_period, Duration::from_secs(1));
    }

    #[test]
    fn test_outside_prefix_ignored() {
        let producer = Producer::new("/p".parse().unwrap());
        assert!(producer.make_data(&Interest::new("/q/1".parse().unwrap())).is_none());
    }

    #[test]
    fn test_default_payload() {
        let producer = Producer::new("/p".parse().unwrap());
        let data = producer.make_data(&Interest::new("/p".parse().unwrap())).unwrap();
        assert_eq!(data.content.len(), 1024);
    }
}
