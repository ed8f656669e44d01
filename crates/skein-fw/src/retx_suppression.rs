//! Exponential retransmission suppression
//!
//! Decides whether a retransmitted Interest should go out again. The
//! interval between retransmissions starts small and grows by a multiplier
//! up to a cap, so a consumer hammering the network is slowed down without
//! delaying the first retransmission.
//!
//! Intervals are tracked per PIT entry for strategies that pick one
//! upstream per Interest, and per out-record for strategies that send to
//! many upstreams, so a lossy upstream never throttles the others.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use skein_core::FaceId;
use skein_table::pit;

use crate::config::duration_ms;

/// Default first suppression interval
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(10);
/// Default interval multiplier
pub const DEFAULT_MULTIPLIER: f32 = 2.0;
/// Default interval cap
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_millis(250);

/// Suppression parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetxSuppressionConfig {
    /// First suppression interval (milliseconds)
    #[serde(with = "duration_ms")]
    pub initial_interval: Duration,
    /// Growth factor applied after each permitted retransmission
    pub multiplier: f32,
    /// Upper bound on the interval (milliseconds)
    #[serde(with = "duration_ms")]
    pub max_interval: Duration,
}

impl Default for RetxSuppressionConfig {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }
}

impl RetxSuppressionConfig {
    /// Check the invariants the suppression logic relies on
    pub fn is_valid(&self) -> bool {
        self.initial_interval > Duration::ZERO
            && self.multiplier >= 1.0
            && self.max_interval >= self.initial_interval
    }
}

/// Outcome of a suppression decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetxSuppressionResult {
    /// Not a retransmission; always forward
    New,
    /// A retransmission outside the suppression interval
    Forward,
    /// A retransmission inside the suppression interval
    Suppress,
}

/// Suppression interval stored on PIT entries and out-records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitInfo {
    pub suppression_interval: Duration,
}

/// Exponential backoff retransmission suppression
#[derive(Debug, Clone)]
pub struct RetxSuppressionExponential {
    initial_interval: Duration,
    multiplier: f32,
    max_interval: Duration,
}

impl RetxSuppressionExponential {
    /// # Panics
    ///
    /// Panics if the config is invalid.
    pub fn new(config: &RetxSuppressionConfig) -> Self {
        assert!(config.is_valid(), "invalid retransmission suppression config: {config:?}");
        Self {
            initial_interval: config.initial_interval,
            multiplier: config.multiplier,
            max_interval: config.max_interval,
        }
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Decide for the entry as a whole
    ///
    /// A permitted retransmission grows the entry's interval.
    pub fn decide_per_pit_entry(&self, entry: &mut pit::Entry, now: Instant) -> RetxSuppressionResult {
        if !entry.has_pending_out_records(now) {
            return RetxSuppressionResult::New;
        }
        let Some(last_outgoing) = entry.last_outgoing() else {
            return RetxSuppressionResult::New;
        };
        let since_last_outgoing = now.saturating_duration_since(last_outgoing);

        let initial = self.initial_interval;
        let (info, _) = entry
            .strategy_info_mut()
            .insert_strategy_info(|| PitInfo { suppression_interval: initial });
        if since_last_outgoing < info.suppression_interval {
            return RetxSuppressionResult::Suppress;
        }
        info.suppression_interval = self.next_interval(info.suppression_interval);
        RetxSuppressionResult::Forward
    }

    /// Decide for one upstream of the entry
    ///
    /// Does not grow the interval; call
    /// [`increment_interval_for_out_record`](Self::increment_interval_for_out_record)
    /// after actually forwarding.
    pub fn decide_per_upstream(
        &self,
        entry: &mut pit::Entry,
        upstream: FaceId,
        now: Instant,
    ) -> RetxSuppressionResult {
        let Some(record) = entry.out_record_mut(upstream) else {
            return RetxSuppressionResult::New;
        };
        let since_last_outgoing = now.saturating_duration_since(record.last_renewed());

        let initial = self.initial_interval;
        let (info, _) = record
            .strategy_info_mut()
            .insert_strategy_info(|| PitInfo { suppression_interval: initial });
        if since_last_outgoing < info.suppression_interval {
            RetxSuppressionResult::Suppress
        } else {
            RetxSuppressionResult::Forward
        }
    }

    /// Grow the interval of one upstream
    pub fn increment_interval_for_out_record(&self, record: &mut pit::OutRecord) {
        let initial = self.initial_interval;
        let (info, _) = record
            .strategy_info_mut()
            .insert_strategy_info(|| PitInfo { suppression_interval: initial });
        info.suppression_interval = self.next_interval(info.suppression_interval);
    }

    fn next_interval(&self, current: Duration) -> Duration {
        let nanos = current.as_nanos() as f64 * f64::from(self.multiplier);
        Duration::from_nanos(nanos as u64).min(self.max_interval)
    }
}

impl Default for RetxSuppressionExponential {
    fn default() -> Self {
        Self::new(&RetxSuppressionConfig::default())
    }
}
