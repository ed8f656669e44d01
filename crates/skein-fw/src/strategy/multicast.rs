//! Multicast strategy
//!
//! Sends every Interest to all eligible next hops. Retransmissions are
//! throttled per upstream, so a slow upstream does not hold back the rest.

use skein_core::{FaceId, Interest, LinkType, NackHeader, NackReason, Name, StrategyError};
use skein_table::{NextHop, PitId};
use tracing::debug;

use super::registry::{make_instance_name, parse_instance_name};
use super::{Strategy, is_next_hop_eligible, validate_instance_name, would_violate_scope};
use crate::config::ForwarderConfig;
use crate::forwarder::Forwarder;
use crate::retx_suppression::{RetxSuppressionExponential, RetxSuppressionResult};

const VERSION: u64 = 3;

#[derive(Debug)]
pub struct MulticastStrategy {
    instance_name: Name,
    retx_suppression: RetxSuppressionExponential,
}

impl MulticastStrategy {
    /// Versioned name this strategy is registered under
    pub fn strategy_name() -> Name {
        Name::new()
            .append("localhost")
            .append("skein")
            .append("strategy")
            .append("multicast")
            .append_version(VERSION)
    }

    /// # Panics
    ///
    /// Panics if the config's retransmission suppression is invalid.
    pub fn new(instance_name: &Name, config: &ForwarderConfig) -> Result<Self, StrategyError> {
        validate_instance_name(&parse_instance_name(instance_name), VERSION)?;
        Ok(Self {
            instance_name: make_instance_name(instance_name, &Self::strategy_name()),
            retx_suppression: RetxSuppressionExponential::new(&config.retx_suppression),
        })
    }
}

impl Strategy for MulticastStrategy {
    fn instance_name(&self) -> &Name {
        &self.instance_name
    }

    fn after_receive_interest(&self, fw: &mut Forwarder, ingress: FaceId, interest: &Interest, pit: PitId) {
        let now = fw.now();
        let next_hops = fw
            .lookup_fib(pit)
            .map(|fib_entry| fib_entry.next_hops().to_vec())
            .unwrap_or_default();
        let ingress_scope = fw.face(ingress).map(|face| face.scope());

        let mut n_eligible = 0;
        let mut is_suppressed = false;
        for hop in &next_hops {
            let Some(egress) = fw.face(hop.face) else {
                continue;
            };
            let Some(entry) = fw.pit_entry_mut(pit) else {
                return;
            };
            let decision = self.retx_suppression.decide_per_upstream(entry, hop.face, now);
            if decision == RetxSuppressionResult::Suppress {
                debug!(pit = %pit, egress = %hop.face, "Retransmission suppressed");
                is_suppressed = true;
                continue;
            }

            if hop.face == ingress && egress.link_type() != LinkType::AdHoc {
                continue;
            }
            if let Some(scope) = ingress_scope
                && would_violate_scope(scope, interest, egress.scope())
            {
                continue;
            }

            fw.send_interest(pit, hop.face, interest);
            if decision == RetxSuppressionResult::Forward
                && let Some(record) = fw.pit_entry_mut(pit).and_then(|e| e.out_record_mut(hop.face))
            {
                self.retx_suppression.increment_interval_for_out_record(record);
            }
            n_eligible += 1;
        }

        if n_eligible == 0 && !is_suppressed {
            debug!(pit = %pit, ingress = %ingress, "No eligible next hop");
            fw.send_nack(pit, ingress, NackHeader::new(NackReason::NoRoute));
            fw.reject_pending_interest(pit);
        }
    }

    fn after_new_next_hop(&self, fw: &mut Forwarder, next_hop: &NextHop, pit: PitId) {
        let now = fw.now();
        let Some(entry) = fw.pit_entry(pit) else {
            return;
        };
        let interest = entry.interest().clone();
        let downstreams: Vec<FaceId> = entry.in_records().iter().map(|r| r.face()).collect();

        let reachable = downstreams
            .into_iter()
            .any(|ingress| is_next_hop_eligible(fw, ingress, &interest, next_hop, pit, false, now));
        if reachable {
            debug!(pit = %pit, egress = %next_hop.face, "Interest sent to new next hop");
            fw.send_interest(pit, next_hop.face, &interest);
        }
    }

    fn wants_new_next_hop_trigger(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_name() {
        assert_eq!(
            MulticastStrategy::strategy_name().to_string(),
            "/localhost/skein/strategy/multicast/%FD%03"
        );
    }

    #[test]
    fn test_wants_new_next_hop_trigger() {
        let strategy = MulticastStrategy::new(&MulticastStrategy::strategy_name(), &ForwarderConfig::default()).unwrap();
        assert!(strategy.wants_new_next_hop_trigger());
    }
}
