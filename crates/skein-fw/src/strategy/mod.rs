//! Forwarding strategies
//!
//! A [`Strategy`] makes the forwarding decisions for the names it governs.
//! The forwarder resolves the effective strategy of a PIT entry through the
//! strategy choice table and invokes exactly one trigger per event.
//!
//! ## Re-entrancy
//!
//! Triggers receive `&mut Forwarder` and call back into it synchronously
//! (`send_interest`, `send_nack`, `reject_pending_interest`, ...). Every
//! table is structurally valid whenever a trigger runs, and a trigger may
//! perform further lookups and mutations. Strategies themselves are shared
//! (`Arc`) and take `&self`; per-entry state belongs in the strategy info
//! of PIT or measurements entries.

mod best_route;
mod multicast;
mod registry;

use std::fmt;
use std::time::Instant;

use skein_core::{Data, FaceId, FaceScope, Interest, LinkType, Nack, NackHeader, NackReason, Name, scope_prefix};
use skein_table::{NextHop, PitId};
use tracing::debug;

use crate::forwarder::Forwarder;

pub use best_route::BestRouteStrategy;
pub use multicast::MulticastStrategy;
pub use registry::{ParsedInstanceName, StrategyFactory, StrategyRegistry};

/// A forwarding strategy
pub trait Strategy: Send + Sync + fmt::Debug {
    /// Full instance name, including version and parameters
    fn instance_name(&self) -> &Name;

    /// An Interest was accepted into the PIT and needs forwarding
    fn after_receive_interest(&self, fw: &mut Forwarder, ingress: FaceId, interest: &Interest, pit: PitId);

    /// An Interest was detected as looping
    fn after_receive_looped_interest(
        &self,
        _fw: &mut Forwarder,
        ingress: FaceId,
        interest: &Interest,
        _pit: PitId,
    ) {
        debug!(face = %ingress, interest = %interest, "Looped Interest ignored by strategy");
    }

    /// Data is about to satisfy the entry
    fn before_satisfy_interest(&self, _fw: &mut Forwarder, _ingress: FaceId, _data: &Data, _pit: PitId) {}

    /// The entry is about to expire unsatisfied
    fn before_expire_pending_interest(&self, _fw: &mut Forwarder, _pit: PitId) {}

    /// An upstream Nacked the entry's Interest
    fn after_receive_nack(&self, _fw: &mut Forwarder, ingress: FaceId, nack: &Nack, _pit: PitId) {
        debug!(face = %ingress, reason = %nack.reason(), "Nack ignored by strategy");
    }

    /// A next hop was added to the FIB entry governing the pending entry
    ///
    /// Only called when [`wants_new_next_hop_trigger`](Self::wants_new_next_hop_trigger)
    /// returns `true`.
    fn after_new_next_hop(&self, _fw: &mut Forwarder, _next_hop: &NextHop, _pit: PitId) {}

    fn wants_new_next_hop_trigger(&self) -> bool {
        false
    }
}

/// Check whether forwarding `interest` from `ingress_scope` to
/// `egress_scope` would break `/localhost` or `/localhop` scope
pub fn would_violate_scope(ingress_scope: FaceScope, interest: &Interest, egress_scope: FaceScope) -> bool {
    if egress_scope == FaceScope::Local {
        return false;
    }
    if scope_prefix::is_localhost(&interest.name) {
        return true;
    }
    if scope_prefix::is_localhop(&interest.name) {
        return ingress_scope != FaceScope::Local;
    }
    false
}

/// Check whether `next_hop` may receive `interest` arriving on `ingress`
///
/// With `want_unused`, a next hop already holding an unexpired out-record
/// is ineligible.
pub fn is_next_hop_eligible(
    fw: &Forwarder,
    ingress: FaceId,
    interest: &Interest,
    next_hop: &NextHop,
    pit: PitId,
    want_unused: bool,
    now: Instant,
) -> bool {
    let Some(egress) = fw.face(next_hop.face) else {
        return false;
    };
    if next_hop.face == ingress && egress.link_type() != LinkType::AdHoc {
        return false;
    }
    let ingress_scope = fw
        .face(ingress)
        .map_or(FaceScope::NonLocal, |face| face.scope());
    if would_violate_scope(ingress_scope, interest, egress.scope()) {
        return false;
    }
    if want_unused
        && let Some(record) = fw.pit_entry(pit).and_then(|e| e.out_record(next_hop.face))
        && record.expiry() > now
    {
        return false;
    }
    true
}

/// Among eligible next hops, pick the one whose out-record was renewed
/// longest ago
pub fn find_eligible_next_hop_with_earliest_out_record(
    fw: &Forwarder,
    ingress: FaceId,
    interest: &Interest,
    next_hops: &[NextHop],
    pit: PitId,
    now: Instant,
) -> Option<NextHop> {
    let entry = fw.pit_entry(pit)?;
    next_hops
        .iter()
        .filter(|hop| is_next_hop_eligible(fw, ingress, interest, hop, pit, false, now))
        .filter_map(|hop| entry.out_record(hop.face).map(|r| (*hop, r.last_renewed())))
        .min_by_key(|(_, renewed)| *renewed)
        .map(|(hop, _)| hop)
}

/// Shared Nack handling
///
/// While some upstream has not Nacked yet, nothing is sent, except when
/// the only such upstream is also a downstream: it would never answer, so
/// it gets the Nack directly. Once every upstream has Nacked, downstreams
/// receive a Nack with the least severe reason seen.
pub fn process_nack(fw: &mut Forwarder, nack: &Nack, pit: PitId) {
    let Some(entry) = fw.pit_entry(pit) else {
        return;
    };

    let mut n_not_nacked = 0;
    let mut last_not_nacked = None;
    let mut least_severe = NackReason::None;
    for record in entry.out_records() {
        match record.incoming_nack() {
            None => {
                n_not_nacked += 1;
                last_not_nacked = Some(record.face());
            }
            Some(header) => {
                if header.reason.is_less_severe(least_severe) {
                    least_severe = header.reason;
                }
            }
        }
    }

    if n_not_nacked == 1
        && let Some(face) = last_not_nacked
        && entry.in_record(face).is_some()
    {
        debug!(pit = %pit, face = %face, "Nack to the only pending upstream, which is also downstream");
        fw.send_nack(pit, face, nack.header);
        return;
    }
    if n_not_nacked > 0 {
        debug!(pit = %pit, pending = n_not_nacked, "Waiting for other upstreams");
        return;
    }

    debug!(pit = %pit, reason = %least_severe, "All upstreams Nacked");
    fw.send_nacks(pit, NackHeader::new(least_severe));
}

/// Refuse parameters and any version other than `version`
pub(crate) fn validate_instance_name(
    parsed: &ParsedInstanceName,
    version: u64,
) -> Result<(), skein_core::StrategyError> {
    if !parsed.parameters.is_empty() {
        return Err(skein_core::StrategyError::ParametersNotAccepted(parsed.strategy_name.clone()));
    }
    if let Some(requested) = parsed.version
        && requested != version
    {
        return Err(skein_core::StrategyError::UnsupportedVersion {
            strategy: parsed.strategy_name.clone(),
            version: requested,
        });
    }
    Ok(())
}
