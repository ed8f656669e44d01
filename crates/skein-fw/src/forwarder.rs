//! The forwarding engine
//!
//! [`Forwarder`] owns every table and runs the packet pipelines:
//!
//! ```text
//! Interest ─▶ scope check ─▶ dead nonce check ─▶ PIT insert ─▶ loop check
//!              ─▶ CS lookup ─┬─ hit  ─▶ Data to downstream ─▶ finalize
//!                            └─ miss ─▶ in-record ─▶ strategy
//! Data     ─▶ scope check ─▶ PIT match ─┬─ none ─▶ unsolicited policy
//!                                       └─ some ─▶ CS insert ─▶ satisfy
//!                                                  ─▶ downstreams ─▶ finalize
//! Nack     ─▶ out-record check ─▶ record Nack ─▶ strategy
//! ```
//!
//! The engine is synchronous and single-threaded. Every pipeline runs to
//! completion, including the strategy callbacks it triggers, before the
//! next packet or timer is handled. Timers live in a [`Scheduler`] that the
//! host drains with [`Forwarder::process_timers`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use skein_core::{
    Clock, CsHitEvent, CsMissEvent, Data, ExpireEvent, Face, FaceError, FaceId, FaceScope, FaceTable,
    Interest, LinkType, Nack, NackHeader, Name, Packet, SatisfyEvent, Scheduler, Signal, StrategyError,
    TimerId, scope_prefix,
};
use skein_table::{
    Cs, DeadNonceList, Fib, Measurements, NameTree, NextHop, NodeId, Pit, PitId, RemoveNextHopResult,
    StrategyChoice, fib, measurements, pit,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::ForwarderConfig;
use crate::error::FwResult;
use crate::strategy::{Strategy, StrategyRegistry};
use crate::unsolicited::{UnsolicitedDataDecision, UnsolicitedDataPolicy};

/// Packet and outcome counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForwarderCounters {
    pub in_interests: u64,
    pub out_interests: u64,
    pub in_data: u64,
    pub out_data: u64,
    pub in_nacks: u64,
    pub out_nacks: u64,
    pub cs_hits: u64,
    pub cs_misses: u64,
    pub satisfied_interests: u64,
    pub unsatisfied_interests: u64,
    /// Interests dropped as looping
    pub loops: u64,
    /// Interests that could not be sent or were dropped by scope control
    pub dropped_interests: u64,
    pub unsolicited_data: u64,
}

/// Observation points
///
/// Handlers run synchronously inside the pipeline and must not expect to
/// influence forwarding.
#[derive(Debug, Default)]
pub struct ForwarderSignals {
    pub before_satisfy_interest: Signal<SatisfyEvent>,
    pub before_expire_pending_interest: Signal<ExpireEvent>,
    pub after_cs_hit: Signal<CsHitEvent>,
    pub after_cs_miss: Signal<CsMissEvent>,
}

/// Outcome of [`Forwarder::set_strategy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    Ok,
    /// No registered strategy matches the name
    NotRegistered,
    /// The strategy refused its instance name
    Exception(String),
    /// The prefix is deeper than the name tree allows
    DepthExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerTask {
    PitExpiry(PitId),
    DeadNonceSweep,
    MeasurementsCleanup(NodeId),
}

/// The forwarding engine
pub struct Forwarder {
    config: ForwarderConfig,
    clock: Arc<dyn Clock>,
    faces: FaceTable,
    name_tree: NameTree,
    fib: Fib,
    pit: Pit,
    cs: Cs,
    measurements: Measurements,
    strategy_choice: StrategyChoice,
    dead_nonce_list: DeadNonceList,
    registry: StrategyRegistry,
    /// Instantiated strategies by instance name
    strategies: HashMap<Name, Arc<dyn Strategy>>,
    default_strategy: Arc<dyn Strategy>,
    scheduler: Scheduler<TimerTask>,
    unsolicited_policy: UnsolicitedDataPolicy,
    counters: ForwarderCounters,
    signals: ForwarderSignals,
}

impl Forwarder {
    /// Create a forwarder
    ///
    /// Fails if the config has a fatal problem or names a default strategy
    /// that cannot be created.
    pub fn new(config: ForwarderConfig, clock: Arc<dyn Clock>) -> FwResult<Self> {
        config.check()?;
        for warning in config.validate() {
            warn!(field = warning.field(), "{warning}");
        }

        let registry = StrategyRegistry::with_builtin();
        let default_strategy = registry.create(&config.default_strategy, &config)?;
        let dead_nonce_list = DeadNonceList::new(config.dead_nonce_lifetime, config.dead_nonce_capacity);

        let mut scheduler = Scheduler::new();
        scheduler.schedule(clock.now() + dead_nonce_list.sweep_interval(), TimerTask::DeadNonceSweep);

        let mut fw = Self {
            faces: FaceTable::new(),
            name_tree: NameTree::new(config.max_depth, config.hashtable.clone()),
            fib: Fib::new(),
            pit: Pit::new(),
            cs: Cs::new(config.cs_capacity),
            measurements: Measurements::new(config.measurements_lifetime),
            strategy_choice: StrategyChoice::new(),
            dead_nonce_list,
            registry,
            strategies: HashMap::new(),
            default_strategy: default_strategy.clone(),
            scheduler,
            unsolicited_policy: config.unsolicited_policy,
            counters: ForwarderCounters::default(),
            signals: ForwarderSignals::default(),
            config,
            clock,
        };

        let instance_name = default_strategy.instance_name().clone();
        fw.strategies.insert(instance_name.clone(), default_strategy);
        fw.strategy_choice.set_default_strategy(&mut fw.name_tree, instance_name.clone());

        info!(
            default_strategy = %instance_name,
            cs_capacity = fw.config.cs_capacity,
            unsolicited_policy = %fw.unsolicited_policy,
            "Forwarder created"
        );
        Ok(fw)
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn counters(&self) -> &ForwarderCounters {
        &self.counters
    }

    pub fn signals_mut(&mut self) -> &mut ForwarderSignals {
        &mut self.signals
    }

    /// Current time on the forwarder's clock
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn name_tree(&self) -> &NameTree {
        &self.name_tree
    }

    pub fn fib(&self) -> &Fib {
        &self.fib
    }

    pub fn pit(&self) -> &Pit {
        &self.pit
    }

    pub fn cs(&self) -> &Cs {
        &self.cs
    }

    pub fn cs_mut(&mut self) -> &mut Cs {
        &mut self.cs
    }

    pub fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    pub fn strategy_choice(&self) -> &StrategyChoice {
        &self.strategy_choice
    }

    pub fn dead_nonce_list(&self) -> &DeadNonceList {
        &self.dead_nonce_list
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Registry to add custom strategies to
    pub fn registry_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.registry
    }

    pub fn unsolicited_policy(&self) -> UnsolicitedDataPolicy {
        self.unsolicited_policy
    }

    pub fn set_unsolicited_policy(&mut self, policy: UnsolicitedDataPolicy) {
        debug!(policy = %policy, "Unsolicited data policy set");
        self.unsolicited_policy = policy;
    }

    // ---- faces ----

    /// Attach a face
    pub fn add_face(&mut self, face: Arc<dyn Face>) -> FwResult<FaceId> {
        Ok(self.faces.add(face)?)
    }

    /// Reserve an id for a face about to be created
    pub fn allocate_face_id(&mut self) -> FaceId {
        self.faces.allocate_id()
    }

    pub fn face(&self, id: FaceId) -> Option<Arc<dyn Face>> {
        self.faces.get(id).cloned()
    }

    pub fn faces(&self) -> &FaceTable {
        &self.faces
    }

    /// Detach a face after purging every reference to it
    ///
    /// The face is removed from all FIB entries and all PIT in-records and
    /// out-records. Name tree entries left empty are erased.
    pub fn remove_face(&mut self, id: FaceId) -> FwResult<Arc<dyn Face>> {
        if !self.faces.contains(id) {
            return Err(FaceError::UnknownFace(id).into());
        }

        let routes = self.fib.remove_next_hop_from_all_entries(&mut self.name_tree, id);
        let pending: Vec<PitId> = self.pit.iter().map(pit::Entry::id).collect();
        for pit in &pending {
            self.pit.delete_in_out_records(*pit, id);
        }

        let mut erased = 0;
        for node in self.name_tree.full_enumerate(|entry| entry.is_empty()) {
            erased += self.name_tree.erase_if_empty(node, true);
        }

        debug!(face = %id, routes, pit_entries = pending.len(), erased, "Face references purged");
        self.faces
            .remove(id)
            .ok_or_else(|| FaceError::UnknownFace(id).into())
    }

    // ---- routes ----

    /// Add a route, or update its cost
    ///
    /// A face that was not yet a next hop of `prefix` triggers the
    /// new-next-hop notification for pending Interests under the prefix.
    pub fn add_next_hop(&mut self, prefix: &Name, face: FaceId, cost: u64) -> FwResult<()> {
        if !self.faces.contains(face) {
            return Err(FaceError::UnknownFace(face).into());
        }
        let (node, _) = self.fib.insert(&mut self.name_tree, prefix)?;
        let is_new = self.fib.add_or_update_next_hop(&mut self.name_tree, node, face, cost);
        debug!(prefix = %prefix, face = %face, cost, is_new, "Route set");
        if is_new {
            self.on_new_next_hop(prefix, NextHop::new(face, cost));
        }
        Ok(())
    }

    /// Remove a route
    pub fn remove_next_hop(&mut self, prefix: &Name, face: FaceId) -> RemoveNextHopResult {
        let node = self
            .name_tree
            .find_exact_match(prefix)
            .filter(|node| self.name_tree[*node].fib_entry().is_some());
        let Some(node) = node else {
            return RemoveNextHopResult::NoSuchNextHop;
        };
        let result = self.fib.remove_next_hop(&mut self.name_tree, node, face);
        debug!(prefix = %prefix, face = %face, ?result, "Route removed");
        result
    }

    pub fn fib_entry(&self, prefix: &Name) -> Option<&fib::Entry> {
        self.fib.find_exact_match(&self.name_tree, prefix)
    }

    // ---- strategy choice ----

    /// Bind `prefix` to the strategy named `strategy_name`
    pub fn set_strategy(&mut self, prefix: &Name, strategy_name: &Name) -> InsertResult {
        if prefix.len() > self.name_tree.max_depth() {
            return InsertResult::DepthExceeded;
        }
        let strategy = match self.registry.create(strategy_name, &self.config) {
            Ok(strategy) => strategy,
            Err(StrategyError::NotRegistered(_)) => return InsertResult::NotRegistered,
            Err(e) => return InsertResult::Exception(e.to_string()),
        };

        let instance_name = strategy.instance_name().clone();
        let strategy = self
            .strategies
            .entry(instance_name.clone())
            .or_insert(strategy)
            .clone();
        match self
            .strategy_choice
            .insert(&mut self.name_tree, &mut self.pit, prefix, instance_name)
        {
            Ok(()) => {
                if prefix.is_empty() {
                    self.default_strategy = strategy;
                }
                InsertResult::Ok
            }
            Err(_) => InsertResult::DepthExceeded,
        }
    }

    /// Remove the strategy bound to `prefix`; the root cannot be unset
    pub fn unset_strategy(&mut self, prefix: &Name) -> bool {
        self.strategy_choice
            .erase(&mut self.name_tree, &mut self.pit, prefix)
    }

    /// Instance name of the strategy governing `name`
    pub fn effective_strategy(&self, name: &Name) -> Option<&Name> {
        self.strategy_choice
            .find_effective_strategy(&self.name_tree, name)
    }

    // ---- event entry points ----

    /// Handle a packet arriving on `face`
    pub fn receive(&mut self, face: FaceId, packet: Packet) -> FwResult<()> {
        let Some(ingress) = self.faces.get(face).cloned() else {
            return Err(FaceError::UnknownFace(face).into());
        };
        match packet {
            Packet::Interest(interest) => self.on_incoming_interest(&ingress, interest),
            Packet::Data(data) => self.on_incoming_data(&ingress, data),
            Packet::Nack(nack) => self.on_incoming_nack(&ingress, nack),
        }
        Ok(())
    }

    /// Run every timer that is due, returning how many fired
    pub fn process_timers(&mut self) -> usize {
        let now = self.now();
        let mut fired = 0;
        while let Some((timer, task)) = self.scheduler.pop_due(now) {
            fired += 1;
            trace!(?task, "Timer fired");
            match task {
                TimerTask::PitExpiry(pit) => {
                    if let Some(entry) = self.pit.get_mut(pit)
                        && entry.expiry_timer == Some(timer)
                    {
                        entry.expiry_timer = None;
                        self.on_interest_finalize(pit);
                    }
                }
                TimerTask::DeadNonceSweep => {
                    let evicted = self.dead_nonce_list.evict_stale(now);
                    if evicted > 0 {
                        debug!(evicted, remaining = self.dead_nonce_list.len(), "Dead nonce list swept");
                    }
                    self.scheduler
                        .schedule(now + self.dead_nonce_list.sweep_interval(), TimerTask::DeadNonceSweep);
                }
                TimerTask::MeasurementsCleanup(node) => self.on_measurements_cleanup(timer, node, now),
            }
        }
        fired
    }

    /// When the next timer is due
    pub fn next_timer_deadline(&mut self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    // ---- strategy-facing actions ----

    pub fn pit_entry(&self, pit: PitId) -> Option<&pit::Entry> {
        self.pit.get(pit)
    }

    pub fn pit_entry_mut(&mut self, pit: PitId) -> Option<&mut pit::Entry> {
        self.pit.get_mut(pit)
    }

    /// FIB entry governing a PIT entry
    pub fn lookup_fib(&self, pit: PitId) -> Option<fib::Entry> {
        let entry = self.pit.get(pit)?;
        self.fib
            .find_longest_prefix_match_from(&self.name_tree, entry.node())
            .cloned()
    }

    /// Forward `interest` to `egress` on behalf of the PIT entry
    ///
    /// Returns `false` when the Interest was dropped because the face is
    /// gone, down, or refused it.
    pub fn send_interest(&mut self, pit: PitId, egress: FaceId, interest: &Interest) -> bool {
        let face = match self.faces.get(egress) {
            Some(face) if face.is_up() => face.clone(),
            _ => {
                debug!(pit = %pit, face = %egress, "Interest dropped, face unusable");
                self.counters.dropped_interests += 1;
                return false;
            }
        };
        let now = self.now();
        let Some(entry) = self.pit.get_mut(pit) else {
            return false;
        };
        entry.insert_or_update_out_record(egress, interest, now);

        match face.send(Packet::Interest(interest.clone())) {
            Ok(()) => {
                trace!(pit = %pit, face = %egress, interest = %interest, "Interest sent");
                self.counters.out_interests += 1;
                true
            }
            Err(e) => {
                warn!(pit = %pit, face = %egress, error = %e, "Interest send failed");
                self.counters.dropped_interests += 1;
                false
            }
        }
    }

    /// Send Data to one downstream of the PIT entry
    pub fn send_data(&mut self, pit: PitId, egress: FaceId, data: &Data) {
        if let Some(entry) = self.pit.get_mut(pit) {
            entry.delete_in_record(egress);
        }
        self.on_outgoing_data(data, egress);
    }

    /// Send Data to every downstream of the PIT entry except `ingress`
    /// (unless `ingress` is ad hoc)
    pub fn send_data_to_all(&mut self, pit: PitId, ingress: FaceId, data: &Data) {
        let now = self.now();
        let Some(entry) = self.pit.get(pit) else {
            return;
        };
        let ingress_is_ad_hoc = self
            .faces
            .get(ingress)
            .is_some_and(|face| face.link_type() == LinkType::AdHoc);
        let downstreams: BTreeSet<FaceId> = entry
            .in_records()
            .iter()
            .filter(|r| r.expiry() > now)
            .map(|r| r.face())
            .filter(|face| *face != ingress || ingress_is_ad_hoc)
            .collect();
        for egress in downstreams {
            self.send_data(pit, egress, data);
        }
    }

    /// Nack the Interest a downstream sent
    ///
    /// Only point-to-point faces holding an in-record receive a Nack; the
    /// in-record is consumed.
    pub fn send_nack(&mut self, pit: PitId, egress: FaceId, header: NackHeader) {
        let Some(face) = self.faces.get(egress).cloned() else {
            warn!(pit = %pit, face = %egress, "Nack to unknown face");
            return;
        };
        let Some(entry) = self.pit.get_mut(pit) else {
            return;
        };
        let Some(interest) = entry.in_record(egress).map(|r| r.interest().clone()) else {
            debug!(pit = %pit, face = %egress, "Nack dropped, no in-record");
            return;
        };
        if face.link_type() != LinkType::PointToPoint {
            debug!(pit = %pit, face = %egress, "Nack dropped, face not point-to-point");
            return;
        }
        entry.delete_in_record(egress);

        let nack = Nack { interest, header };
        match face.send(Packet::Nack(nack)) {
            Ok(()) => {
                trace!(pit = %pit, face = %egress, reason = %header.reason, "Nack sent");
                self.counters.out_nacks += 1;
            }
            Err(e) => warn!(pit = %pit, face = %egress, error = %e, "Nack send failed"),
        }
    }

    /// Nack every downstream of the PIT entry
    pub fn send_nacks(&mut self, pit: PitId, header: NackHeader) {
        let Some(entry) = self.pit.get(pit) else {
            return;
        };
        let downstreams: Vec<FaceId> = entry.in_records().iter().map(|r| r.face()).collect();
        for egress in downstreams {
            self.send_nack(pit, egress, header);
        }
    }

    /// Give up on the PIT entry; it is finalized at the next timer run
    pub fn reject_pending_interest(&mut self, pit: PitId) {
        debug!(pit = %pit, "Pending Interest rejected");
        let now = self.now();
        self.set_expiry_timer(pit, now);
    }

    /// Get or create the measurements entry for `name`
    ///
    /// Returns `None` when `strategy` does not govern `name`, so a strategy
    /// only ever sees its own measurements.
    pub fn measurements_entry(&mut self, strategy: &dyn Strategy, name: &Name) -> Option<&mut measurements::Entry> {
        if self.effective_strategy(name) != Some(strategy.instance_name()) {
            return None;
        }
        let now = self.now();
        let (node, is_new) = self.measurements.get(&mut self.name_tree, name, now);
        if is_new {
            let expiry = now + self.measurements.lifetime();
            self.schedule_measurements_cleanup(node, expiry);
        }
        self.name_tree[node].measurements_entry_mut()
    }

    /// Measurements entry for the name of a PIT entry
    pub fn measurements_entry_for_pit(
        &mut self,
        strategy: &dyn Strategy,
        pit: PitId,
    ) -> Option<&mut measurements::Entry> {
        let name = self.pit.get(pit)?.name().clone();
        self.measurements_entry(strategy, &name)
    }

    /// Keep the measurements entry for `name` alive for at least `lifetime`
    pub fn extend_measurements_lifetime(
        &mut self,
        strategy: &dyn Strategy,
        name: &Name,
        lifetime: std::time::Duration,
    ) -> bool {
        if self.effective_strategy(name) != Some(strategy.instance_name()) {
            return false;
        }
        let Some(node) = self
            .name_tree
            .find_exact_match(name)
            .filter(|node| self.name_tree[*node].measurements_entry().is_some())
        else {
            return false;
        };
        let now = self.now();
        self.measurements
            .extend_lifetime(&mut self.name_tree, node, lifetime, now);
        true
    }

    // ---- pipelines ----

    #[instrument(skip_all, fields(face = %ingress.id(), name = %interest.name))]
    fn on_incoming_interest(&mut self, ingress: &Arc<dyn Face>, mut interest: Interest) {
        interest.hop_count = interest.hop_count.saturating_add(1);
        self.counters.in_interests += 1;
        let ingress_id = ingress.id();

        if ingress.scope() == FaceScope::NonLocal && scope_prefix::is_localhost(&interest.name) {
            debug!("Interest for /localhost from non-local face dropped");
            self.counters.dropped_interests += 1;
            return;
        }

        if self.dead_nonce_list.has(&interest.name, interest.nonce) {
            debug!(nonce = interest.nonce, "Nonce in dead nonce list");
            self.on_interest_loop(ingress, &interest);
            return;
        }

        let (pit, is_new) = self.pit.insert(&mut self.name_tree, &interest);
        if !is_new
            && let Some(entry) = self.pit.get(pit)
            && is_looping(entry, interest.nonce, ingress_id, ingress.link_type())
        {
            debug!(pit = %pit, nonce = interest.nonce, "Duplicate nonce in PIT entry");
            self.on_interest_loop(ingress, &interest);
            let strategy = self.strategy_for_pit(pit);
            strategy.after_receive_looped_interest(self, ingress_id, &interest, pit);
            return;
        }

        let is_pending = self.pit.get(pit).is_some_and(pit::Entry::has_in_records);
        if !is_pending {
            let now = self.now();
            if let Some(data) = self.cs.find(&interest, now).cloned() {
                self.on_content_store_hit(ingress_id, &interest, pit, data);
                return;
            }
        }
        self.on_content_store_miss(ingress_id, &interest, pit);
    }

    fn on_interest_loop(&mut self, ingress: &Arc<dyn Face>, interest: &Interest) {
        self.counters.loops += 1;
        if ingress.link_type() != LinkType::PointToPoint {
            return;
        }
        let nack = Nack::new(interest.clone(), skein_core::NackReason::Duplicate);
        match ingress.send(Packet::Nack(nack)) {
            Ok(()) => self.counters.out_nacks += 1,
            Err(e) => warn!(face = %ingress.id(), error = %e, "Duplicate Nack send failed"),
        }
    }

    fn on_content_store_hit(&mut self, ingress: FaceId, interest: &Interest, pit: PitId, data: Data) {
        debug!(pit = %pit, data = %data.name, "Content store hit");
        self.counters.cs_hits += 1;
        self.signals.after_cs_hit.emit(&CsHitEvent {
            interest: interest.clone(),
            data: data.clone(),
        });

        if let Some(entry) = self.pit.get_mut(pit) {
            entry.is_satisfied = true;
            entry.data_freshness_period = data.freshness_period;
        }
        self.signals.before_satisfy_interest.emit(&SatisfyEvent {
            interest: interest.clone(),
            ingress: FaceId::CONTENT_STORE,
            data: data.clone(),
        });
        let strategy = self.strategy_for_pit(pit);
        strategy.before_satisfy_interest(self, FaceId::CONTENT_STORE, &data, pit);

        self.on_outgoing_data(&data, ingress);
        self.on_interest_finalize(pit);
    }

    fn on_content_store_miss(&mut self, ingress: FaceId, interest: &Interest, pit: PitId) {
        trace!(pit = %pit, "Content store miss");
        self.counters.cs_misses += 1;
        self.signals.after_cs_miss.emit(&CsMissEvent {
            interest: interest.clone(),
        });

        let now = self.now();
        let Some(entry) = self.pit.get_mut(pit) else {
            return;
        };
        entry.insert_or_update_in_record(ingress, interest, now);
        let Some(last_expiry) = entry.in_records().iter().map(pit::InRecord::expiry).max() else {
            return;
        };
        self.set_expiry_timer(pit, last_expiry);

        let strategy = self.strategy_for_pit(pit);
        strategy.after_receive_interest(self, ingress, interest, pit);
    }

    fn on_interest_finalize(&mut self, pit: PitId) {
        let Some(entry) = self.pit.get(pit) else {
            return;
        };
        let is_satisfied = entry.is_satisfied;
        debug!(pit = %pit, name = %entry.name(), is_satisfied, "Interest finalized");

        if !is_satisfied {
            let event = ExpireEvent {
                interest: entry.interest().clone(),
            };
            self.signals.before_expire_pending_interest.emit(&event);
            let strategy = self.strategy_for_pit(pit);
            strategy.before_expire_pending_interest(self, pit);
        }

        self.insert_dead_nonces(pit, None);
        if is_satisfied {
            self.counters.satisfied_interests += 1;
        } else {
            self.counters.unsatisfied_interests += 1;
        }

        if let Some(timer) = self.pit.get_mut(pit).and_then(|e| e.expiry_timer.take()) {
            self.scheduler.cancel(timer);
        }
        self.pit.erase(&mut self.name_tree, pit);
    }

    #[instrument(skip_all, fields(face = %ingress.id(), name = %data.name))]
    fn on_incoming_data(&mut self, ingress: &Arc<dyn Face>, mut data: Data) {
        data.hop_count = data.hop_count.saturating_add(1);
        self.counters.in_data += 1;
        let ingress_id = ingress.id();

        if ingress.scope() == FaceScope::NonLocal && scope_prefix::is_localhost(&data.name) {
            debug!("Data for /localhost from non-local face dropped");
            return;
        }

        let matches = self.pit.find_all_data_matches(&self.name_tree, &data);
        if matches.is_empty() {
            self.on_data_unsolicited(ingress, data);
            return;
        }

        let now = self.now();
        self.cs.insert(data.clone(), false, now);

        let mut downstreams = BTreeSet::new();
        for &pit in &matches {
            let Some(entry) = self.pit.get(pit) else {
                continue;
            };
            downstreams.extend(
                entry
                    .in_records()
                    .iter()
                    .filter(|r| r.expiry() > now)
                    .map(|r| r.face()),
            );

            self.signals.before_satisfy_interest.emit(&SatisfyEvent {
                interest: entry.interest().clone(),
                ingress: ingress_id,
                data: data.clone(),
            });
            let strategy = self.strategy_for_pit(pit);
            strategy.before_satisfy_interest(self, ingress_id, &data, pit);

            if let Some(entry) = self.pit.get_mut(pit) {
                entry.is_satisfied = true;
                entry.data_freshness_period = data.freshness_period;
            }
            self.insert_dead_nonces(pit, Some(ingress_id));
            if let Some(entry) = self.pit.get_mut(pit) {
                entry.clear_in_records();
                entry.delete_out_record(ingress_id);
            }
        }
        debug!(matches = matches.len(), downstreams = downstreams.len(), "Data satisfies pending Interests");

        let ingress_is_ad_hoc = ingress.link_type() == LinkType::AdHoc;
        for egress in downstreams {
            if egress == ingress_id && !ingress_is_ad_hoc {
                continue;
            }
            self.on_outgoing_data(&data, egress);
        }

        for pit in matches {
            self.on_interest_finalize(pit);
        }
    }

    fn on_data_unsolicited(&mut self, ingress: &Arc<dyn Face>, data: Data) {
        self.counters.unsolicited_data += 1;
        let decision = self.unsolicited_policy.decide(ingress.scope(), &data);
        debug!(policy = %self.unsolicited_policy, ?decision, "Unsolicited Data");
        if decision == UnsolicitedDataDecision::Cache {
            let now = self.now();
            self.cs.insert(data, true, now);
        }
    }

    fn on_outgoing_data(&mut self, data: &Data, egress: FaceId) {
        if egress == FaceId::INVALID {
            warn!(data = %data.name, "Data to invalid face");
            return;
        }
        let Some(face) = self.faces.get(egress).cloned() else {
            debug!(face = %egress, data = %data.name, "Data to unknown face dropped");
            return;
        };
        if face.scope() == FaceScope::NonLocal && scope_prefix::is_localhost(&data.name) {
            debug!(face = %egress, data = %data.name, "Data for /localhost to non-local face dropped");
            return;
        }
        match face.send(Packet::Data(data.clone())) {
            Ok(()) => {
                trace!(face = %egress, data = %data.name, "Data sent");
                self.counters.out_data += 1;
            }
            Err(e) => warn!(face = %egress, error = %e, "Data send failed"),
        }
    }

    #[instrument(skip_all, fields(face = %ingress.id(), name = %nack.interest.name, reason = %nack.reason()))]
    fn on_incoming_nack(&mut self, ingress: &Arc<dyn Face>, nack: Nack) {
        self.counters.in_nacks += 1;
        let ingress_id = ingress.id();

        if ingress.link_type() != LinkType::PointToPoint {
            debug!("Nack on non point-to-point face dropped");
            return;
        }
        let Some(pit) = self.pit.find(&self.name_tree, &nack.interest) else {
            debug!("Nack without PIT entry dropped");
            return;
        };
        let now = self.now();
        let Some(entry) = self.pit.get_mut(pit) else {
            return;
        };
        let Some(record) = entry.out_record_mut(ingress_id) else {
            debug!(pit = %pit, "Nack without out-record dropped");
            return;
        };
        if !record.set_incoming_nack(&nack) {
            debug!(pit = %pit, nonce = nack.interest.nonce, "Nack for stale nonce dropped");
            return;
        }
        if !entry.has_pending_out_records(now) {
            self.set_expiry_timer(pit, now);
        }

        let strategy = self.strategy_for_pit(pit);
        strategy.after_receive_nack(self, ingress_id, &nack, pit);
    }

    fn on_new_next_hop(&mut self, prefix: &Name, next_hop: NextHop) {
        let depth = prefix.len();
        let nodes = self.name_tree.partial_enumerate(prefix, |entry| {
            // a more specific route shadows the new next hop
            if entry.name().len() > depth && entry.fib_entry().is_some() {
                return (false, false);
            }
            (entry.has_pit_entries(), true)
        });
        let pending: Vec<PitId> = nodes
            .iter()
            .flat_map(|node| self.name_tree[*node].pit_entries().iter().copied())
            .collect();

        for pit in pending {
            if self.pit.get(pit).is_none() {
                continue;
            }
            let strategy = self.strategy_for_pit(pit);
            if strategy.wants_new_next_hop_trigger() {
                strategy.after_new_next_hop(self, &next_hop, pit);
            }
        }
    }

    // ---- helpers ----

    fn strategy_for_pit(&self, pit: PitId) -> Arc<dyn Strategy> {
        self.pit
            .get(pit)
            .and_then(|entry| {
                self.strategy_choice
                    .find_effective_strategy_from(&self.name_tree, entry.node())
            })
            .and_then(|name| self.strategies.get(name))
            .cloned()
            .unwrap_or_else(|| self.default_strategy.clone())
    }

    fn set_expiry_timer(&mut self, pit: PitId, at: Instant) {
        let Some(entry) = self.pit.get_mut(pit) else {
            return;
        };
        if let Some(old) = entry.expiry_timer.take() {
            self.scheduler.cancel(old);
        }
        entry.expiry_timer = Some(self.scheduler.schedule(at, TimerTask::PitExpiry(pit)));
    }

    /// Record retired nonces of the PIT entry
    ///
    /// Satisfied entries only need this when the Data may go stale before
    /// the nonces would expire from the list. With `upstream`, only that
    /// upstream's nonce is recorded.
    fn insert_dead_nonces(&mut self, pit: PitId, upstream: Option<FaceId>) {
        let Some(entry) = self.pit.get(pit) else {
            return;
        };
        if entry.is_satisfied
            && !(entry.interest().must_be_fresh
                && entry.data_freshness_period < self.dead_nonce_list.lifetime())
        {
            return;
        }
        let now = self.now();
        let nonces: Vec<u32> = match upstream {
            None => entry.out_records().iter().map(pit::OutRecord::last_nonce).collect(),
            Some(face) => entry.out_record(face).map(pit::OutRecord::last_nonce).into_iter().collect(),
        };
        for nonce in nonces {
            self.dead_nonce_list.add(entry.name(), nonce, now);
        }
    }

    fn schedule_measurements_cleanup(&mut self, node: NodeId, at: Instant) {
        let timer = self.scheduler.schedule(at, TimerTask::MeasurementsCleanup(node));
        if let Some(entry) = self
            .name_tree
            .get_mut(node)
            .and_then(|e| e.measurements_entry_mut())
        {
            entry.cleanup_timer = Some(timer);
        }
    }

    fn on_measurements_cleanup(&mut self, timer: TimerId, node: NodeId, now: Instant) {
        let is_current = self
            .name_tree
            .get(node)
            .and_then(|e| e.measurements_entry())
            .is_some_and(|m| m.cleanup_timer == Some(timer));
        if !is_current {
            return;
        }
        if let Some(expiry) = self.measurements.cleanup(&mut self.name_tree, node, now) {
            self.schedule_measurements_cleanup(node, expiry);
        }
    }
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("faces", &self.faces.len())
            .field("fib", &self.fib.len())
            .field("pit", &self.pit.len())
            .field("cs", &self.cs.len())
            .field("measurements", &self.measurements.len())
            .field("strategy_choice", &self.strategy_choice.len())
            .field("counters", &self.counters)
            .finish()
    }
}

/// Check whether a nonce seen again on a PIT entry means a loop
///
/// A nonce already forwarded upstream, or received from another
/// downstream, is a loop. On a point-to-point face the same downstream
/// repeating its own nonce is a retransmission, not a loop.
fn is_looping(entry: &pit::Entry, nonce: u32, ingress: FaceId, link_type: LinkType) -> bool {
    if entry.out_records().iter().any(|r| r.last_nonce() == nonce) {
        return true;
    }
    entry
        .in_records()
        .iter()
        .filter(|r| r.last_nonce() == nonce)
        .any(|r| r.face() != ingress || link_type != LinkType::PointToPoint)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use skein_core::{ManualClock, MockFace, NackReason};

    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn setup() -> (Forwarder, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let fw = Forwarder::new(ForwarderConfig::default(), clock.clone()).unwrap();
        (fw, clock)
    }

    fn add_face(fw: &mut Forwarder, id: u64) -> Arc<MockFace> {
        let face = Arc::new(MockFace::new(FaceId(id)));
        fw.add_face(face.clone()).unwrap();
        face
    }

    #[test]
    fn test_new_rejects_fatal_config() {
        let clock = Arc::new(ManualClock::new());
        let config = ForwarderConfig::default().with_max_depth(0);
        assert!(matches!(
            Forwarder::new(config, clock),
            Err(crate::FwError::Config(_))
        ));
    }

    #[test]
    fn test_new_rejects_unknown_default_strategy() {
        let clock = Arc::new(ManualClock::new());
        let config = ForwarderConfig::default().with_default_strategy(name("/localhost/skein/strategy/none"));
        assert!(matches!(
            Forwarder::new(config, clock),
            Err(crate::FwError::Strategy(StrategyError::NotRegistered(_)))
        ));
    }

    #[test]
    fn test_receive_on_unknown_face() {
        let (mut fw, _) = setup();
        let err = fw.receive(FaceId(999), Interest::new(name("/a")).into());
        assert!(matches!(err, Err(crate::FwError::Face(FaceError::UnknownFace(_)))));
    }

    #[test]
    fn test_no_route_nacks_and_finalizes() {
        let (mut fw, _) = setup();
        let consumer = add_face(&mut fw, 300);

        fw.receive(FaceId(300), Interest::new(name("/nowhere")).into()).unwrap();
        let nacks = consumer.sent_nacks();
        assert_eq!(nacks.len(), 1);
        assert_eq!(nacks[0].reason(), NackReason::NoRoute);

        assert_eq!(fw.process_timers(), 1);
        assert!(fw.pit().is_empty());
        assert_eq!(fw.counters().unsatisfied_interests, 1);
    }

    #[test]
    fn test_localhost_interest_from_network_dropped() {
        let (mut fw, _) = setup();
        add_face(&mut fw, 300);
        fw.receive(FaceId(300), Interest::new(name("/localhost/x")).into()).unwrap();
        assert!(fw.pit().is_empty());
        assert_eq!(fw.counters().dropped_interests, 1);
    }

    #[test]
    fn test_interest_expires_and_records_nonce() {
        let (mut fw, clock) = setup();
        add_face(&mut fw, 300);
        let upstream = add_face(&mut fw, 301);
        fw.add_next_hop(&name("/a"), FaceId(301), 1).unwrap();

        let interest = Interest::new(name("/a/x")).with_nonce(7).with_lifetime(Duration::from_millis(100));
        fw.receive(FaceId(300), interest.clone().into()).unwrap();
        assert_eq!(upstream.sent_interests().len(), 1);

        clock.advance(Duration::from_millis(100));
        fw.process_timers();
        assert!(fw.pit().is_empty());
        assert!(fw.dead_nonce_list().has(&interest.name, 7));

        // a late copy is now caught by the dead nonce list
        fw.receive(FaceId(300), interest.into()).unwrap();
        assert_eq!(fw.counters().loops, 1);
        assert_eq!(upstream.sent_interests().len(), 1);
    }

    #[test]
    fn test_cs_hit_answers_without_forwarding() {
        let (mut fw, _) = setup();
        let consumer = add_face(&mut fw, 300);
        let upstream = add_face(&mut fw, 301);
        fw.add_next_hop(&name("/a"), FaceId(301), 1).unwrap();
        let now = fw.now();
        fw.cs_mut().insert(Data::new(name("/a/x"), "cached"), false, now);

        let hits = Arc::new(parking_lot::Mutex::new(0));
        let counter = hits.clone();
        fw.signals_mut().after_cs_hit.connect(move |_| *counter.lock() += 1);

        fw.receive(FaceId(300), Interest::new(name("/a/x")).into()).unwrap();
        assert_eq!(consumer.sent_data().len(), 1);
        assert!(upstream.sent_interests().is_empty());
        assert_eq!(*hits.lock(), 1);
        assert_eq!(fw.counters().cs_hits, 1);
        assert_eq!(fw.counters().satisfied_interests, 1);
        assert!(fw.pit().is_empty());
    }

    #[test]
    fn test_unsolicited_data_policy() {
        let (mut fw, _) = setup();
        add_face(&mut fw, 300);

        fw.receive(FaceId(300), Data::new(name("/u/1"), "x").into()).unwrap();
        assert!(fw.cs().is_empty());

        fw.set_unsolicited_policy(UnsolicitedDataPolicy::AdmitAll);
        fw.receive(FaceId(300), Data::new(name("/u/2"), "x").into()).unwrap();
        assert_eq!(fw.cs().len(), 1);
        assert_eq!(fw.counters().unsolicited_data, 2);
    }

    #[test]
    fn test_set_strategy_results() {
        let (mut fw, _) = setup();
        let multicast = crate::strategy::MulticastStrategy::strategy_name();

        assert_eq!(fw.set_strategy(&name("/m"), &multicast), InsertResult::Ok);
        assert_eq!(fw.effective_strategy(&name("/m/x")), Some(&multicast));
        assert_eq!(
            fw.set_strategy(&name("/m"), &name("/localhost/skein/strategy/none")),
            InsertResult::NotRegistered
        );
        for partial in ["/localhost", "/localhost/skein/strategy"] {
            assert_eq!(fw.set_strategy(&name("/x"), &name(partial)), InsertResult::NotRegistered);
        }
        assert_eq!(
            fw.effective_strategy(&name("/x")),
            Some(&crate::strategy::BestRouteStrategy::strategy_name())
        );
        assert!(matches!(
            fw.set_strategy(&name("/m"), &multicast.clone().append("param")),
            InsertResult::Exception(_)
        ));

        let deep = Name::from_components((0..40).map(|i| skein_core::Component::from(format!("c{i}").as_str())));
        assert_eq!(fw.set_strategy(&deep, &multicast), InsertResult::DepthExceeded);

        assert!(fw.unset_strategy(&name("/m")));
        assert!(!fw.unset_strategy(&Name::new()));
        assert_eq!(
            fw.effective_strategy(&name("/m/x")),
            Some(&crate::strategy::BestRouteStrategy::strategy_name())
        );
    }

    #[test]
    fn test_add_next_hop_requires_face() {
        let (mut fw, _) = setup();
        assert!(fw.add_next_hop(&name("/a"), FaceId(300), 1).is_err());
        assert!(fw.fib().is_empty());
    }

    #[test]
    fn test_remove_next_hop() {
        let (mut fw, _) = setup();
        add_face(&mut fw, 300);
        fw.add_next_hop(&name("/a"), FaceId(300), 1).unwrap();

        assert_eq!(fw.remove_next_hop(&name("/a"), FaceId(301)), RemoveNextHopResult::NoSuchNextHop);
        assert_eq!(fw.remove_next_hop(&name("/a"), FaceId(300)), RemoveNextHopResult::FibEntryRemoved);
        assert!(fw.fib_entry(&name("/a")).is_none());
        assert_eq!(fw.remove_next_hop(&name("/a"), FaceId(300)), RemoveNextHopResult::NoSuchNextHop);
    }

    #[test]
    fn test_dead_nonce_sweep_reschedules() {
        let (mut fw, clock) = setup();
        let first = fw.next_timer_deadline().unwrap();
        clock.advance(fw.dead_nonce_list().sweep_interval());
        assert_eq!(fw.process_timers(), 1);
        assert!(fw.next_timer_deadline().unwrap() > first);
    }

    #[test]
    fn test_short_dead_nonce_lifetime_does_not_spin() {
        let clock = Arc::new(ManualClock::new());
        let mut config = ForwarderConfig::default();
        config.dead_nonce_lifetime = Duration::from_nanos(3);
        let mut fw = Forwarder::new(config, clock.clone()).unwrap();

        clock.advance(Duration::from_millis(1));
        assert_eq!(fw.process_timers(), 1);
        assert!(fw.next_timer_deadline().unwrap() > fw.now());
    }

    #[test]
    fn test_measurements_lifetime_and_cleanup() {
        let (mut fw, clock) = setup();
        let best_route = crate::strategy::BestRouteStrategy::new(
            &crate::strategy::BestRouteStrategy::strategy_name(),
            fw.config(),
        )
        .unwrap();
        let multicast = crate::strategy::MulticastStrategy::new(
            &crate::strategy::MulticastStrategy::strategy_name(),
            fw.config(),
        )
        .unwrap();
        let prefix = name("/meas/p");

        // only the governing strategy may touch the entry
        assert!(fw.measurements_entry(&multicast, &prefix).is_none());
        assert!(!fw.extend_measurements_lifetime(&multicast, &prefix, Duration::from_secs(10)));
        assert!(fw.measurements().is_empty());

        let entry = fw.measurements_entry(&best_route, &prefix).unwrap();
        assert_eq!(entry.name(), &prefix);
        assert_eq!(fw.measurements().len(), 1);
        assert!(fw.extend_measurements_lifetime(&best_route, &prefix, Duration::from_secs(10)));

        // first cleanup at the default lifetime finds the entry extended
        clock.advance(Duration::from_secs(4));
        fw.process_timers();
        assert_eq!(fw.measurements().len(), 1);
        assert!(fw.name_tree().find_exact_match(&prefix).is_some());

        clock.advance(Duration::from_secs(6));
        fw.process_timers();
        assert!(fw.measurements().is_empty());
        assert!(fw.name_tree().find_exact_match(&prefix).is_none());
        assert_eq!(fw.name_tree().len(), 1);
    }

    #[test]
    fn test_measurements_entry_for_pit() {
        let (mut fw, _) = setup();
        add_face(&mut fw, 300);
        let best_route = crate::strategy::BestRouteStrategy::new(
            &crate::strategy::BestRouteStrategy::strategy_name(),
            fw.config(),
        )
        .unwrap();
        let multicast = crate::strategy::MulticastStrategy::new(
            &crate::strategy::MulticastStrategy::strategy_name(),
            fw.config(),
        )
        .unwrap();
        fw.receive(FaceId(300), Interest::new(name("/nr/x")).into()).unwrap();

        // rejected for lack of a route, but finalized only on the next timer run
        let pit = fw.pit().iter().next().unwrap().id();
        assert!(fw.measurements_entry_for_pit(&multicast, pit).is_none());
        let entry = fw.measurements_entry_for_pit(&best_route, pit).unwrap();
        assert_eq!(entry.name(), &name("/nr/x"));
    }

    #[test]
    fn test_is_looping_rules() {
        let mut tree = NameTree::default();
        let mut table = Pit::new();
        let interest = Interest::new(name("/a")).with_nonce(1);
        let (id, _) = table.insert(&mut tree, &interest);
        let entry = table.get_mut(id).unwrap();
        let now = Instant::now();
        entry.insert_or_update_in_record(FaceId(300), &interest, now);

        assert!(!is_looping(entry, 1, FaceId(300), LinkType::PointToPoint));
        assert!(is_looping(entry, 1, FaceId(300), LinkType::MultiAccess));
        assert!(is_looping(entry, 1, FaceId(301), LinkType::PointToPoint));
        assert!(!is_looping(entry, 2, FaceId(301), LinkType::PointToPoint));

        entry.insert_or_update_out_record(FaceId(302), &interest, now);
        assert!(is_looping(entry, 1, FaceId(300), LinkType::PointToPoint));
    }
}
