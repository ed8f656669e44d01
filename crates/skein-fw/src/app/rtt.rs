//! Round-trip time estimation

use std::time::Duration;

const INITIAL_RTO: Duration = Duration::from_secs(1);
const MIN_RTO: Duration = Duration::from_millis(200);
const MAX_RTO: Duration = Duration::from_secs(60);
/// Weight of the deviation in the timeout
const K: u32 = 4;

/// Mean-deviation RTT estimator
///
/// Smoothed RTT uses gain 1/8 and the deviation gain 1/4. Every timeout
/// doubles the multiplier applied to the timeout; a fresh measurement
/// resets it.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: Option<Duration>,
    rttvar: Duration,
    multiplier: u32,
    min_rto: Duration,
    max_rto: Duration,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self::with_bounds(MIN_RTO, MAX_RTO)
    }

    /// # Panics
    ///
    /// Panics if `min_rto` exceeds `max_rto`.
    pub fn with_bounds(min_rto: Duration, max_rto: Duration) -> Self {
        assert!(min_rto <= max_rto, "min RTO {min_rto:?} exceeds max RTO {max_rto:?}");
        Self {
            srtt: None,
            rttvar: Duration::ZERO,
            multiplier: 1,
            min_rto,
            max_rto,
        }
    }

    /// Feed one round-trip sample
    pub fn add_measurement(&mut self, rtt: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(rtt);
                self.rttvar = rtt / 2;
            }
            Some(srtt) => {
                let deviation = if srtt > rtt { srtt - rtt } else { rtt - srtt };
                self.rttvar = self.rttvar * 3 / 4 + deviation / 4;
                self.srtt = Some(srtt * 7 / 8 + rtt / 8);
            }
        }
        self.multiplier = 1;
    }

    /// Double the timeout after a loss
    pub fn backoff(&mut self) {
        if self.retransmit_timeout() < self.max_rto {
            self.multiplier = self.multiplier.saturating_mul(2);
        }
    }

    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.srtt
    }

    pub fn rtt_variation(&self) -> Duration {
        self.rttvar
    }

    /// Current retransmission timeout
    pub fn retransmit_timeout(&self) -> Duration {
        let base = match self.srtt {
            Some(srtt) => srtt + self.rttvar * K,
            None => INITIAL_RTO,
        };
        base.saturating_mul(self.multiplier).clamp(self.min_rto, self.max_rto)
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_timeout() {
        let rtt = RttEstimator::new();
        assert_eq!(rtt.retransmit_timeout(), Duration::from_secs(1));
        assert!(rtt.smoothed_rtt().is_none());
    }

    #[test]
    fn test_measurements_smooth() {
        let mut rtt = RttEstimator::new();
        rtt.add_measurement(Duration::from_millis(100));
        assert_eq!(rtt.smoothed_rtt(), Some(Duration::from_millis(100)));
        assert_eq!(rtt.retransmit_timeout(), Duration::from_millis(300));

        rtt.add_measurement(Duration::from_millis(200));
        assert_eq!(rtt.smoothed_rtt(), Some(Duration::from_micros(112_500)));
        assert_eq!(rtt.rtt_variation(), Duration::from_micros(62_500));
        assert_eq!(rtt.retransmit_timeout(), Duration::from_micros(362_500));
    }

    #[test]
    fn test_timeout_clamped_to_min() {
        let mut rtt = RttEstimator::new();
        rtt.add_measurement(Duration::from_millis(10));
        assert_eq!(rtt.retransmit_timeout(), Duration::from_millis(200));
    }

    #[test]
    fn test_backoff_and_reset() {
        let mut rtt = RttEstimator::new();
        rtt.add_measurement(Duration::from_millis(100));
        rtt.backoff();
        assert_eq!(rtt.retransmit_timeout(), Duration::from_millis(600));
        rtt.backoff();
        assert_eq!(rtt.retransmit_timeout(), Duration::from_millis(1200));

        rtt.add_measurement(Duration::from_millis(100));
        assert!(rtt.retransmit_timeout() < Duration::from_millis(600));
    }

    #[test]
    fn test_backoff_capped() {
        let mut rtt = RttEstimator::with_bounds(Duration::from_millis(100), Duration::from_secs(2));
        for _ in 0..20 {
            rtt.backoff();
        }
        assert_eq!(rtt.retransmit_timeout(), Duration::from_secs(2));
    }
}
