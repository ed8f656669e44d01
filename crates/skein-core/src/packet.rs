//! Packet types
//!
//! Three packet kinds travel through the forwarder:
//!
//! - [`Interest`]: a request for named data
//! - [`Data`]: a named response that satisfies Interests
//! - [`Nack`]: a negative acknowledgment for an Interest
//!
//! Wire encoding is out of scope; packets are plain structs.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::name::Name;

/// Interest lifetime used when none is given
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_secs(4);

/// A request for named data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    /// Requested name
    pub name: Name,
    /// Random value for loop and duplicate detection
    pub nonce: u32,
    /// How long the Interest stays pending
    pub lifetime: Duration,
    /// Data whose name extends `name` may satisfy this Interest
    pub can_be_prefix: bool,
    /// Stale cached Data may not satisfy this Interest
    pub must_be_fresh: bool,
    /// Number of forwarders this packet has passed through
    pub hop_count: u32,
}

impl Interest {
    /// Create an Interest with a random nonce and the default lifetime
    pub fn new(name: Name) -> Self {
        Self {
            name,
            nonce: rand::random(),
            lifetime: DEFAULT_INTEREST_LIFETIME,
            can_be_prefix: false,
            must_be_fresh: false,
            hop_count: 0,
        }
    }

    /// Set the nonce
    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }

    /// Set the lifetime
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set the CanBePrefix selector
    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    /// Set the MustBeFresh selector
    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    /// Replace the nonce with a different random value
    pub fn refresh_nonce(&mut self) {
        let old = self.nonce;
        while self.nonce == old {
            self.nonce = rand::random();
        }
    }

    /// Check whether `data` satisfies this Interest
    pub fn matches_data(&self, data: &Data) -> bool {
        if self.can_be_prefix {
            self.name.is_prefix_of(&data.name)
        } else {
            self.name == data.name
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?nonce={:08x}", self.name, self.nonce)
    }
}

/// A named response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    /// Data name
    pub name: Name,
    /// Opaque payload
    pub content: Bytes,
    /// How long after arrival a cached copy stays fresh
    pub freshness_period: Duration,
    /// Number of forwarders this packet has passed through
    pub hop_count: u32,
}

impl Data {
    /// Create Data with zero freshness period
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            content: content.into(),
            freshness_period: Duration::ZERO,
            hop_count: 0,
        }
    }

    /// Set the freshness period
    pub fn with_freshness_period(mut self, freshness_period: Duration) -> Self {
        self.freshness_period = freshness_period;
        self
    }
}

/// Reason carried in a Nack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NackReason {
    /// No reason given
    #[default]
    None,
    /// Upstream is congested
    Congestion,
    /// Upstream saw a duplicate nonce
    Duplicate,
    /// Upstream has no route for the name
    NoRoute,
}

impl NackReason {
    /// Numeric reason code
    pub fn code(&self) -> u64 {
        match self {
            NackReason::None => 0,
            NackReason::Congestion => 50,
            NackReason::Duplicate => 100,
            NackReason::NoRoute => 150,
        }
    }

    /// Check whether this reason is less severe than `other`
    ///
    /// `None` is the most severe: any concrete reason is less severe than it.
    pub fn is_less_severe(&self, other: NackReason) -> bool {
        if *self == NackReason::None {
            return false;
        }
        if other == NackReason::None {
            return true;
        }
        self.code() < other.code()
    }
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NackReason::None => write!(f, "None"),
            NackReason::Congestion => write!(f, "Congestion"),
            NackReason::Duplicate => write!(f, "Duplicate"),
            NackReason::NoRoute => write!(f, "NoRoute"),
        }
    }
}

/// Nack header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NackHeader {
    pub reason: NackReason,
}

impl NackHeader {
    pub fn new(reason: NackReason) -> Self {
        Self { reason }
    }
}

/// A negative acknowledgment for an Interest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nack {
    /// The Nacked Interest, carrying the nonce being rejected
    pub interest: Interest,
    pub header: NackHeader,
}

impl Nack {
    pub fn new(interest: Interest, reason: NackReason) -> Self {
        Self {
            interest,
            header: NackHeader::new(reason),
        }
    }

    pub fn reason(&self) -> NackReason {
        self.header.reason
    }
}

/// Any packet the forwarder handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

impl Packet {
    /// Name of the packet (the Interest name for a Nack)
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(i) => &i.name,
            Packet::Data(d) => &d.name,
            Packet::Nack(n) => &n.interest.name,
        }
    }
}

impl From<Interest> for Packet {
    fn from(i: Interest) -> Self {
        Packet::Interest(i)
    }
}

impl From<Data> for Packet {
    fn from(d: Data) -> Self {
        Packet::Data(d)
    }
}

impl From<Nack> for Packet {
    fn from(n: Nack) -> Self {
        Packet::Nack(n)
    }
}
