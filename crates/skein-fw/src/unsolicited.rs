//! Unsolicited Data policy
//!
//! Data that matches no pending Interest is never forwarded. The policy
//! only decides whether it may be cached.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use skein_core::{Data, FaceScope};

/// What to do with one unsolicited Data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsolicitedDataDecision {
    Drop,
    Cache,
}

/// Admission policy for unsolicited Data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnsolicitedDataPolicy {
    /// Cache nothing
    #[default]
    DropAll,
    /// Cache Data arriving on local faces
    AdmitLocal,
    /// Cache Data arriving on non-local faces
    AdmitNetwork,
    /// Cache everything
    AdmitAll,
}

impl UnsolicitedDataPolicy {
    pub fn decide(&self, ingress_scope: FaceScope, _data: &Data) -> UnsolicitedDataDecision {
        let admit = match self {
            UnsolicitedDataPolicy::DropAll => false,
            UnsolicitedDataPolicy::AdmitLocal => ingress_scope == FaceScope::Local,
            UnsolicitedDataPolicy::AdmitNetwork => ingress_scope == FaceScope::NonLocal,
            UnsolicitedDataPolicy::AdmitAll => true,
        };
        if admit {
            UnsolicitedDataDecision::Cache
        } else {
            UnsolicitedDataDecision::Drop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnsolicitedDataPolicy::DropAll => "drop-all",
            UnsolicitedDataPolicy::AdmitLocal => "admit-local",
            UnsolicitedDataPolicy::AdmitNetwork => "admit-network",
            UnsolicitedDataPolicy::AdmitAll => "admit-all",
        }
    }
}

impl fmt::Display for UnsolicitedDataPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnsolicitedDataPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop-all" => Ok(UnsolicitedDataPolicy::DropAll),
            "admit-local" => Ok(UnsolicitedDataPolicy::AdmitLocal),
            "admit-network" => Ok(UnsolicitedDataPolicy::AdmitNetwork),
            "admit-all" => Ok(UnsolicitedDataPolicy::AdmitAll),
            other => Err(format!("unknown unsolicited data policy: {other}")),
        }
    }
}
