//! Best-route strategy
//!
//! Sends an Interest to the lowest-cost eligible next hop. A consumer
//! retransmission goes to the lowest-cost next hop not tried yet, or, when
//! every next hop has been tried, to the one tried longest ago.
//! Retransmissions are throttled per PIT entry.

use skein_core::{FaceId, Interest, Nack, NackHeader, NackReason, Name, StrategyError};
use skein_table::PitId;
use tracing::debug;

use super::registry::{make_instance_name, parse_instance_name};
use super::{
    Strategy, find_eligible_next_hop_with_earliest_out_record, is_next_hop_eligible, process_nack,
    validate_instance_name,
};
use crate::config::ForwarderConfig;
use crate::forwarder::Forwarder;
use crate::retx_suppression::{RetxSuppressionExponential, RetxSuppressionResult};

const VERSION: u64 = 5;

#[derive(Debug)]
pub struct BestRouteStrategy {
    instance_name: Name,
    retx_suppression: RetxSuppressionExponential,
}

impl BestRouteStrategy {
    /// Versioned name this strategy is registered under
    pub fn strategy_name() -> Name {
        Name::new()
            .append("localhost")
            .append("skein")
            .append("strategy")
            .append("best-route")
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

impl Strategy for BestRouteStrategy {
    fn instance_name(&self) -> &Name {
        &self.instance_name
    }

    fn after_receive_interest(&self, fw: &mut Forwarder, ingress: FaceId, interest: &Interest, pit: PitId) {
        let now = fw.now();
        let Some(entry) = fw.pit_entry_mut(pit) else {
            return;
        };
        let suppression = self.retx_suppression.decide_per_pit_entry(entry, now);
        if suppression == RetxSuppressionResult::Suppress {
            debug!(pit = %pit, interest = %interest, "Retransmission suppressed");
            return;
        }

        let next_hops = fw
            .lookup_fib(pit)
            .map(|fib_entry| fib_entry.next_hops().to_vec())
            .unwrap_or_default();

        if suppression == RetxSuppressionResult::New {
            let found = next_hops
                .iter()
                .find(|hop| is_next_hop_eligible(fw, ingress, interest, hop, pit, false, now));
            match found {
                Some(hop) => {
                    let egress = hop.face;
                    debug!(pit = %pit, ingress = %ingress, egress = %egress, "New Interest forwarded");
                    fw.send_interest(pit, egress, interest);
                }
                None => {
                    debug!(pit = %pit, ingress = %ingress, "No eligible next hop");
                    fw.send_nack(pit, ingress, NackHeader::new(NackReason::NoRoute));
                    fw.reject_pending_interest(pit);
                }
            }
            return;
        }

        let unused = next_hops
            .iter()
            .find(|hop| is_next_hop_eligible(fw, ingress, interest, hop, pit, true, now))
            .map(|hop| hop.face);
        if let Some(egress) = unused {
            debug!(pit = %pit, egress = %egress, "Retransmission to unused next hop");
            fw.send_interest(pit, egress, interest);
            return;
        }

        match find_eligible_next_hop_with_earliest_out_record(fw, ingress, interest, &next_hops, pit, now) {
            Some(hop) => {
                debug!(pit = %pit, egress = %hop.face, "Retransmission to earliest used next hop");
                fw.send_interest(pit, hop.face, interest);
            }
            None => debug!(pit = %pit, "Retransmission has no next hop"),
        }
    }

    fn after_receive_nack(&self, fw: &mut Forwarder, _ingress: FaceId, nack: &Nack, pit: PitId) {
        process_nack(fw, nack, pit);
    }
}
