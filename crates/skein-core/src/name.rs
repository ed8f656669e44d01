//! Hierarchical names
//!
//! A [`Name`] is an immutable ordered sequence of opaque binary
//! [`Component`]s. Names compare component-wise, and a name sorts before
//! every name it is a prefix of.
//!
//! The URI form is `/comp1/comp2/...`, where bytes outside the unreserved
//! set are percent-encoded and a component made only of periods is written
//! with three extra periods (`...` is the empty component).
//!
//! ## Naming conventions
//!
//! Some components carry a one-byte marker followed by a big-endian
//! non-negative integer of 1, 2, 4, or 8 bytes:
//!
//! - version (`0xFD`), e.g. `%FD%05`
//! - segment number (`0x00`)
//! - sequence number (`0xFE`)

use std::cmp::Ordering;
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::NameError;

/// Marker byte of a version component
pub const VERSION_MARKER: u8 = 0xFD;

/// Marker byte of a segment number component
pub const SEGMENT_MARKER: u8 = 0x00;

/// Marker byte of a sequence number component
pub const SEQUENCE_NUMBER_MARKER: u8 = 0xFE;

/// A single name component
///
/// Components are ordered canonically: a shorter component sorts first,
/// and components of equal length compare bytewise.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Component(Bytes);

impl Component {
    /// Create a component from raw bytes
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self(value.into())
    }

    /// Create a component holding `marker` followed by `number` in its
    /// shortest non-negative integer encoding
    pub fn from_number_with_marker(marker: u8, number: u64) -> Self {
        let mut buf = Vec::with_capacity(9);
        buf.push(marker);
        if number <= u8::MAX as u64 {
            buf.push(number as u8);
        } else if number <= u16::MAX as u64 {
            buf.extend_from_slice(&(number as u16).to_be_bytes());
        } else if number <= u32::MAX as u64 {
            buf.extend_from_slice(&(number as u32).to_be_bytes());
        } else {
            buf.extend_from_slice(&number.to_be_bytes());
        }
        Self(Bytes::from(buf))
    }

    /// Create a version component
    pub fn from_version(version: u64) -> Self {
        Self::from_number_with_marker(VERSION_MARKER, version)
    }

    /// Create a segment number component
    pub fn from_segment(segment: u64) -> Self {
        Self::from_number_with_marker(SEGMENT_MARKER, segment)
    }

    /// Create a sequence number component
    pub fn from_sequence_number(seq: u64) -> Self {
        Self::from_number_with_marker(SEQUENCE_NUMBER_MARKER, seq)
    }

    /// Raw component bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the component in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if this is the empty component
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode `marker` + non-negative integer, if the component has that shape
    pub fn to_number_with_marker(&self, marker: u8) -> Option<u64> {
        let (&first, rest) = self.0.split_first()?;
        if first != marker {
            return None;
        }
        match rest.len() {
            1 | 2 | 4 | 8 => Some(rest.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)),
            _ => None,
        }
    }

    /// Check if this component follows the version convention
    pub fn is_version(&self) -> bool {
        self.to_version().is_some()
    }

    /// Decode a version component
    pub fn to_version(&self) -> Option<u64> {
        self.to_number_with_marker(VERSION_MARKER)
    }

    /// Decode a segment number component
    pub fn to_segment(&self) -> Option<u64> {
        self.to_number_with_marker(SEGMENT_MARKER)
    }

    /// Decode a sequence number component
    pub fn to_sequence_number(&self) -> Option<u64> {
        self.to_number_with_marker(SEQUENCE_NUMBER_MARKER)
    }

    fn from_escaped(s: &str) -> Result<Self, NameError> {
        if !s.is_empty() && s.bytes().all(|b| b == b'.') {
            if s.len() < 3 {
                return Err(NameError::InvalidComponent(s.to_string()));
            }
            return Ok(Self(Bytes::from(s.as_bytes()[3..].to_vec())));
        }

        let input = s.as_bytes();
        let mut out = Vec::with_capacity(input.len());
        let mut i = 0;
        while i < input.len() {
            if input[i] == b'%' {
                let hex = input
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| NameError::InvalidPercentEncoding(s.to_string()))?;
                out.push(hex);
                i += 3;
            } else {
                out.push(input[i]);
                i += 1;
            }
        }
        Ok(Self(Bytes::from(out)))
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.as_ref().cmp(other.0.as_ref()))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Component {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| *b == b'.') {
            // includes the empty component
            f.write_str("...")?;
            for _ in 0..self.0.len() {
                f.write_str(".")?;
            }
            return Ok(());
        }
        for &b in self.0.iter() {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "%{:02X}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self)
    }
}

/// A hierarchical name
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    /// Create the empty name `/`
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a name from components
    pub fn from_components(components: impl IntoIterator<Item = Component>) -> Self {
        Self {
            components: components.into_iter().collect(),
        }
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if this is the empty name
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the component at `index`
    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    /// Last component, if any
    pub fn last(&self) -> Option<&Component> {
        self.components.last()
    }

    /// Iterate over components
    pub fn components(&self) -> impl DoubleEndedIterator<Item = &Component> + ExactSizeIterator {
        self.components.iter()
    }

    /// The first `n` components (the whole name if `n >= len`)
    pub fn get_prefix(&self, n: usize) -> Name {
        Self {
            components: self.components[..n.min(self.len())].to_vec(),
        }
    }

    /// The name with its last `k` components removed
    pub fn get_prefix_back(&self, k: usize) -> Name {
        self.get_prefix(self.len().saturating_sub(k))
    }

    /// Up to `count` components starting at `start`
    pub fn sub_name(&self, start: usize, count: usize) -> Name {
        let start = start.min(self.len());
        let end = start.saturating_add(count).min(self.len());
        Self {
            components: self.components[start..end].to_vec(),
        }
    }

    /// Append a component, consuming the name
    pub fn append(mut self, component: impl Into<Component>) -> Self {
        self.components.push(component.into());
        self
    }

    /// Append every component of another name
    pub fn append_name(mut self, other: &Name) -> Self {
        self.components.extend(other.components.iter().cloned());
        self
    }

    /// Append a version component
    pub fn append_version(self, version: u64) -> Self {
        self.append(Component::from_version(version))
    }

    /// Append a segment number component
    pub fn append_segment(self, segment: u64) -> Self {
        self.append(Component::from_segment(segment))
    }

    /// Append a sequence number component
    pub fn append_sequence_number(self, seq: u64) -> Self {
        self.append(Component::from_sequence_number(seq))
    }

    /// Push a component in place
    pub fn push(&mut self, component: impl Into<Component>) {
        self.components.push(component.into());
    }

    /// Check if this name is a prefix of (or equal to) `other`
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.len() <= other.len() && self.components[..] == other.components[..self.len()]
    }

    /// Compare the first `prefix_len` components of this name with `other`
    pub fn prefix_equals(&self, prefix_len: usize, other: &Name) -> bool {
        prefix_len <= self.len() && self.components[..prefix_len] == other.components[..]
    }
}

impl Index<usize> for Name {
    type Output = Component;

    fn index(&self, index: usize) -> &Component {
        &self.components[index]
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("ndn:").unwrap_or(s);
        let components = s
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(Component::from_escaped)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reserved scope prefixes
pub mod scope_prefix {
    use super::Name;

    /// `/localhost`: never leaves the local host
    pub fn is_localhost(name: &Name) -> bool {
        name.get(0).is_some_and(|c| c.as_bytes() == b"localhost")
    }

    /// `/localhop`: travels at most one hop from a local application
    pub fn is_localhop(name: &Name) -> bool {
        name.get(0).is_some_and(|c| c.as_bytes() == b"localhop")
    }
}
