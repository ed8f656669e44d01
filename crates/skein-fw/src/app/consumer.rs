//! Sequence-numbered Data consumer
//!
//! The consumer appends a sequence number to its prefix for every Interest.
//! Outstanding sequence numbers are checked against the RTT estimator's
//! timeout; an expired one is queued for retransmission with a fresh nonce
//! and the timeout backs off. Samples from retransmitted sequence numbers
//! are not fed to the estimator, since their Data cannot be attributed to
//! one transmission.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use serde::Serialize;
use skein_core::{Data, Interest, Nack, Name, Packet};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use super::RttEstimator;
use crate::error::FwResult;
use crate::runtime::FaceHandle;

const DEFAULT_LIFETIME: Duration = Duration::from_secs(2);
/// How often `run` checks for expired sequence numbers
const RETX_CHECK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
struct Outstanding {
    first_sent: Instant,
    last_sent: Instant,
    retx_count: u32,
}

/// One completed retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Retrieval {
    pub seq: u64,
    /// From the first transmission to the Data
    pub full_delay: Duration,
    /// From the last transmission to the Data
    pub last_delay: Duration,
    pub retx_count: u32,
    /// Forwarders the Data passed through
    pub hop_count: u32,
}

/// Consumer counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub interests_sent: u64,
    pub retransmissions: u64,
    pub data_received: u64,
    pub nacks_received: u64,
    pub timeouts: u64,
}

/// Requests `/prefix/<seq>` for increasing sequence numbers
#[derive(Debug)]
pub struct Consumer {
    prefix: Name,
    lifetime: Duration,
    next_seq: u64,
    max_seq: Option<u64>,
    retx_queue: BTreeSet<u64>,
    outstanding: BTreeMap<u64, Outstanding>,
    rtt: RttEstimator,
    retrievals: Vec<Retrieval>,
    stats: ConsumerStats,
}

impl Consumer {
    pub fn new(prefix: Name) -> Self {
        Self {
            prefix,
            lifetime: DEFAULT_LIFETIME,
            next_seq: 0,
            max_seq: None,
            retx_queue: BTreeSet::new(),
            outstanding: BTreeMap::new(),
            rtt: RttEstimator::new(),
            retrievals: Vec::new(),
            stats: ConsumerStats::default(),
        }
    }

    /// Interest lifetime to request
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_start_seq(mut self, seq: u64) -> Self {
        self.next_seq = seq;
        self
    }

    /// Stop issuing new sequence numbers at `max_seq` (exclusive)
    pub fn with_max_seq(mut self, max_seq: u64) -> Self {
        self.max_seq = Some(max_seq);
        self
    }

    pub fn with_rtt_estimator(mut self, rtt: RttEstimator) -> Self {
        self.rtt = rtt;
        self
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Completed retrievals in arrival order
    pub fn retrievals(&self) -> &[Retrieval] {
        &self.retrievals
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Every sequence number was issued and answered
    pub fn is_done(&self) -> bool {
        self.max_seq.is_some_and(|max| self.next_seq >= max)
            && self.outstanding.is_empty()
            && self.retx_queue.is_empty()
    }

    /// Next Interest to send: a pending retransmission first, then a new
    /// sequence number
    pub fn next_interest(&mut self, now: Instant) -> Option<Interest> {
        let seq = match self.retx_queue.pop_first() {
            Some(seq) => {
                self.stats.retransmissions += 1;
                seq
            }
            None => {
                if self.max_seq.is_some_and(|max| self.next_seq >= max) {
                    return None;
                }
                let seq = self.next_seq;
                self.next_seq += 1;
                seq
            }
        };

        let record = self.outstanding.entry(seq).or_insert(Outstanding {
            first_sent: now,
            last_sent: now,
            retx_count: 0,
        });
        record.last_sent = now;
        self.stats.interests_sent += 1;

        let interest = Interest::new(self.prefix.clone().append_sequence_number(seq))
            .with_lifetime(self.lifetime)
            .with_can_be_prefix(false);
        trace!(seq, nonce = interest.nonce, "Consumer sending Interest");
        Some(interest)
    }

    /// Record Data; returns the retrieval when it answers an outstanding
    /// sequence number
    pub fn on_data(&mut self, data: &Data, now: Instant) -> Option<Retrieval> {
        let seq = self.seq_of(&data.name)?;
        let Some(record) = self.outstanding.remove(&seq) else {
            debug!(seq, "Data for a sequence number not outstanding");
            return None;
        };
        self.retx_queue.remove(&seq);
        self.stats.data_received += 1;

        let last_delay = now.saturating_duration_since(record.last_sent);
        if record.retx_count == 0 {
            self.rtt.add_measurement(last_delay);
        }
        let retrieval = Retrieval {
            seq,
            full_delay: now.saturating_duration_since(record.first_sent),
            last_delay,
            retx_count: record.retx_count,
            hop_count: data.hop_count,
        };
        debug!(
            seq,
            delay_ms = last_delay.as_millis() as u64,
            retx = record.retx_count,
            hops = data.hop_count,
            "Consumer received Data"
        );
        self.retrievals.push(retrieval);
        Some(retrieval)
    }

    /// Record a Nack; the sequence number stays outstanding until it times out
    pub fn on_nack(&mut self, nack: &Nack) {
        self.stats.nacks_received += 1;
        debug!(interest = %nack.interest, reason = %nack.reason(), "Consumer received Nack");
    }

    /// Queue every sequence number whose timeout passed for retransmission
    ///
    /// Returns how many timed out.
    pub fn check_timeouts(&mut self, now: Instant) -> usize {
        let rto = self.rtt.retransmit_timeout();
        let expired: Vec<u64> = self
            .outstanding
            .iter()
            .filter(|(seq, record)| record.last_sent + rto <= now && !self.retx_queue.contains(*seq))
            .map(|(seq, _)| *seq)
            .collect();

        for seq in &expired {
            if let Some(record) = self.outstanding.get_mut(seq) {
                record.retx_count += 1;
            }
            self.retx_queue.insert(*seq);
            self.rtt.backoff();
            self.stats.timeouts += 1;
            debug!(seq, rto_ms = rto.as_millis() as u64, "Consumer timeout");
        }
        expired.len()
    }

    /// When the earliest outstanding sequence number times out
    pub fn next_timeout(&self) -> Option<Instant> {
        let rto = self.rtt.retransmit_timeout();
        self.outstanding
            .iter()
            .filter(|(seq, _)| !self.retx_queue.contains(*seq))
            .map(|(_, record)| record.last_sent + rto)
            .min()
    }

    /// Send Interests every `interval` over `face` until shutdown or until
    /// every sequence number was retrieved
    pub async fn run(
        &mut self,
        mut face: FaceHandle,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> FwResult<()> {
        info!(prefix = %self.prefix, face = %face.id(), "Consumer started");
        let mut send_tick = tokio::time::interval(interval);
        let mut retx_tick = tokio::time::interval(RETX_CHECK_INTERVAL);

        while !self.is_done() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = send_tick.tick() => {
                    if let Some(interest) = self.next_interest(Instant::now()) {
                        face.send(interest).await?;
                    }
                }
                _ = retx_tick.tick() => {
                    self.check_timeouts(Instant::now());
                }
                packet = face.recv() => {
                    match packet {
                        Some(Packet::Data(data)) => {
                            self.on_data(&data, Instant::now());
                        }
                        Some(Packet::Nack(nack)) => self.on_nack(&nack),
                        Some(Packet::Interest(interest)) => {
                            trace!(interest = %interest, "Consumer ignoring Interest");
                        }
                        None => break,
                    }
                }
            }
        }
        info!(
            prefix = %self.prefix,
            retrieved = self.retrievals.len(),
            timeouts = self.stats.timeouts,
            "Consumer stopped"
        );
        Ok(())
    }

    fn seq_of(&self, name: &Name) -> Option<u64> {
        if name.len() != self.prefix.len() + 1 || !self.prefix.is_prefix_of(name) {
            return None;
        }
        name.last()?.to_sequence_number()
    }
}
