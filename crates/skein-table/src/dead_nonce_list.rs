//! Dead nonce list
//!
//! Remembers (name, nonce) pairs of Interests whose PIT entries are gone,
//! so a looping Interest that arrives late is still recognized. Entries
//! expire after the configured lifetime; the list is also bounded in size.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use skein_core::Name;
use tracing::trace;

/// Default time a nonce is remembered
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(6);

/// Default maximum number of remembered nonces
pub const DEFAULT_CAPACITY: usize = 1 << 16;

/// Number of sweeps per lifetime
const SWEEPS_PER_LIFETIME: u32 = 5;

/// Sweeps never run closer together than this
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

type Key = u64;

/// Recently retired (name, nonce) pairs
#[derive(Debug)]
pub struct DeadNonceList {
    lifetime: Duration,
    capacity: usize,
    queue: VecDeque<(Key, Instant)>,
    index: HashMap<Key, usize>,
}

impl DeadNonceList {
    pub fn new(lifetime: Duration, capacity: usize) -> Self {
        Self {
            lifetime,
            capacity: capacity.max(1),
            queue: VecDeque::new(),
            index: HashMap::new(),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// How often [`evict_stale`](Self::evict_stale) should run
    ///
    /// Never shorter than 1ms, so a sweep always lands in the future.
    pub fn sweep_interval(&self) -> Duration {
        (self.lifetime / SWEEPS_PER_LIFETIME).max(MIN_SWEEP_INTERVAL)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remember a (name, nonce) pair
    pub fn add(&mut self, name: &Name, nonce: u32, now: Instant) {
        let key = make_key(name, nonce);
        self.queue.push_back((key, now));
        *self.index.entry(key).or_insert(0) += 1;
        trace!(name = %name, nonce, "Dead nonce recorded");
        while self.queue.len() > self.capacity {
            self.pop_front();
        }
    }

    /// Check whether a (name, nonce) pair is remembered
    pub fn has(&self, name: &Name, nonce: u32) -> bool {
        self.index.contains_key(&make_key(name, nonce))
    }

    /// Forget pairs older than the lifetime, returning how many went
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let mut evicted = 0;
        while let Some(&(_, inserted_at)) = self.queue.front() {
            if inserted_at + self.lifetime > now {
                break;
            }
            self.pop_front();
            evicted += 1;
        }
        evicted
    }

    fn pop_front(&mut self) {
        let Some((key, _)) = self.queue.pop_front() else {
            return;
        };
        if let Some(count) = self.index.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.index.remove(&key);
            }
        }
    }
}

impl Default for DeadNonceList {
    fn default() -> Self {
        Self::new(DEFAULT_LIFETIME, DEFAULT_CAPACITY)
    }
}

fn make_key(name: &Name, nonce: u32) -> Key {
    let mut hasher = blake3::Hasher::new();
    for component in name.components() {
        hasher.update(&(component.len() as u64).to_le_bytes());
        hasher.update(component.as_bytes());
    }
    hasher.update(&nonce.to_le_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
    u64::from_le_bytes(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn test_add_and_has() {
        let now = Instant::now();
        let mut dnl = DeadNonceList::default();
        dnl.add(&name("/a"), 1, now);
        assert!(dnl.has(&name("/a"), 1));
        assert!(!dnl.has(&name("/a"), 2));
        assert!(!dnl.has(&name("/b"), 1));
    }

    #[test]
    fn test_evict_stale() {
        let now = Instant::now();
        let mut dnl = DeadNonceList::new(Duration::from_millis(100), 100);
        dnl.add(&name("/a"), 1, now);
        dnl.add(&name("/b"), 2, now + Duration::from_millis(60));

        assert_eq!(dnl.evict_stale(now + Duration::from_millis(99)), 0);
        assert_eq!(dnl.evict_stale(now + Duration::from_millis(100)), 1);
        assert!(!dnl.has(&name("/a"), 1));
        assert!(dnl.has(&name("/b"), 2));
    }

    #[test]
    fn test_duplicates_counted() {
        let now = Instant::now();
        let mut dnl = DeadNonceList::new(Duration::from_millis(100), 100);
        dnl.add(&name("/a"), 1, now);
        dnl.add(&name("/a"), 1, now + Duration::from_millis(80));
        dnl.evict_stale(now + Duration::from_millis(120));
        assert!(dnl.has(&name("/a"), 1));
        assert_eq!(dnl.len(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let now = Instant::now();
        let mut dnl = DeadNonceList::new(Duration::from_secs(6), 3);
        for nonce in 0..5 {
            dnl.add(&name("/a"), nonce, now);
        }
        assert_eq!(dnl.len(), 3);
        assert!(!dnl.has(&name("/a"), 0));
        assert!(dnl.has(&name("/a"), 4));
    }

    #[test]
    fn test_sweep_interval() {
        let dnl = DeadNonceList::default();
        assert_eq!(dnl.sweep_interval(), Duration::from_millis(1200));
    }

    #[test]
    fn test_sweep_interval_floor() {
        let dnl = DeadNonceList::new(Duration::from_nanos(3), 10);
        assert_eq!(dnl.sweep_interval(), Duration::from_millis(1));
        let dnl = DeadNonceList::new(Duration::ZERO, 10);
        assert_eq!(dnl.sweep_interval(), Duration::from_millis(1));
    }
}
