//! Oracle boundary.
//!
//! The core only dispatches status requests and applies resolutions. How
//! responders are selected and how they agree on a status code lives outside
//! this crate; a request carries a responder-group index so external
//! responders can decide whether it is addressed to them.

use serde::{Deserialize, Serialize};

use crate::store::Credit;
use crate::types::{FlightKey, FlightStatus, Identity};

/// Number of responder groups a request can be addressed to.
pub const RESPONDER_GROUPS: u8 = 10;

/// An open flight-status request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub key: FlightKey,
    pub index: u8,
    pub requester: Identity,
    pub requested_at: i64,
}

impl StatusRequest {
    pub fn new(key: FlightKey, requester: Identity, requested_at: i64, nonce: u64) -> Self {
        let index = responder_index(&key, &requester, requested_at, nonce);
        Self {
            key,
            index,
            requester,
            requested_at,
        }
    }
}

/// Derive the responder-group index for a request.
///
/// Deterministic in its inputs; `nonce` separates repeated requests made in
/// the same second.
pub fn responder_index(key: &FlightKey, requester: &Identity, at: i64, nonce: u64) -> u8 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key.airline.as_str().as_bytes());
    hasher.update(key.code.as_bytes());
    hasher.update(&key.departure.to_be_bytes());
    hasher.update(requester.as_str().as_bytes());
    hasher.update(&at.to_be_bytes());
    hasher.update(&nonce.to_be_bytes());
    hasher.finalize().as_bytes()[0] % RESPONDER_GROUPS
}

/// Why a resolution left the ledger untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoredReason {
    /// No registered flight matches the key.
    UnknownFlight,
    /// The flight already carries a final status.
    AlreadyResolved,
    /// The resolution reported `Unknown`.
    NoInformation,
}

/// Outcome of delivering a resolution to the core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Applied {
        status: FlightStatus,
        credited: Vec<Credit>,
    },
    Ignored(IgnoredReason),
}

impl Resolution {
    pub fn is_applied(&self) -> bool {
        matches!(self, Resolution::Applied { .. })
    }
}
