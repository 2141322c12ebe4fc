use thiserror::Error;

use crate::types::{Amount, FlightKey, Identity};

/// Errors from the governance engine and the ledger store.
///
/// Every variant is raised before any write is applied, so a failed call
/// leaves the ledger exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuretyError {
    // --- Gates ---
    #[error("contract is currently not operational")]
    NotOperational,

    #[error("caller {0} is not the contract owner")]
    Unauthorized(Identity),

    #[error("caller {0} is not authorized to write to the ledger store")]
    CallerNotAuthorized(Identity),

    // --- Airline registry ---
    #[error("caller {0} is not registered")]
    CallerNotRegistered(Identity),

    #[error("caller {0} is not funded")]
    CallerNotFunded(Identity),

    #[error("multi-party consensus of 50% is required: {votes} of {required} votes for {candidate}")]
    ConsensusRequired {
        candidate: Identity,
        votes: usize,
        required: usize,
    },

    #[error("airline {voter} already voted for {candidate}")]
    DuplicateVote { candidate: Identity, voter: Identity },

    #[error("airline {0} is already registered")]
    AirlineAlreadyRegistered(Identity),

    #[error("insufficient funding: required {required}, offered {offered}")]
    InsufficientFunding { required: Amount, offered: Amount },

    // --- Flights ---
    #[error("cannot register flights that depart in less than {lead_secs} seconds (departure {departure}, now {now})")]
    DepartureTooSoon {
        departure: i64,
        now: i64,
        lead_secs: i64,
    },

    #[error("flight is not registered: {0}")]
    FlightNotRegistered(FlightKey),

    #[error("flight {0} already has a final status")]
    FlightAlreadyResolved(FlightKey),

    #[error("unknown flight status code {0}")]
    UnknownStatusCode(u8),

    // --- Escrow ---
    #[error("insurance premium must be greater than zero")]
    ZeroPremium,

    #[error("caller {0} has no withdrawable balance")]
    ZeroBalance(Identity),

    #[error("insufficient reserves: crediting {credit} on top of {outstanding} outstanding exceeds {held} held")]
    InsufficientReserves {
        credit: Amount,
        outstanding: Amount,
        held: Amount,
    },

    #[error("value transfer to {recipient} failed: {reason}")]
    TransferFailed { recipient: Identity, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SuretyError {
    /// Stable machine-readable kind, used by notification consumers and the
    /// REST surface.
    pub fn kind(&self) -> &'static str {
        match self {
            SuretyError::NotOperational => "not_operational",
            SuretyError::Unauthorized(_) => "unauthorized",
            SuretyError::CallerNotAuthorized(_) => "caller_not_authorized",
            SuretyError::CallerNotRegistered(_) => "caller_not_registered",
            SuretyError::CallerNotFunded(_) => "caller_not_funded",
            SuretyError::ConsensusRequired { .. } => "consensus_required",
            SuretyError::DuplicateVote { .. } => "duplicate_vote",
            SuretyError::AirlineAlreadyRegistered(_) => "airline_already_registered",
            SuretyError::InsufficientFunding { .. } => "insufficient_funding",
            SuretyError::DepartureTooSoon { .. } => "departure_too_soon",
            SuretyError::FlightNotRegistered(_) => "flight_not_registered",
            SuretyError::FlightAlreadyResolved(_) => "flight_already_resolved",
            SuretyError::UnknownStatusCode(_) => "unknown_status_code",
            SuretyError::ZeroPremium => "zero_premium",
            SuretyError::ZeroBalance(_) => "zero_balance",
            SuretyError::InsufficientReserves { .. } => "insufficient_reserves",
            SuretyError::TransferFailed { .. } => "transfer_failed",
            SuretyError::InvalidConfig(_) => "invalid_config",
        }
    }

    /// True when the caller may never perform the call, as opposed to a
    /// business rule that can be satisfied later.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SuretyError::Unauthorized(_)
                | SuretyError::UnknownStatusCode(_)
                | SuretyError::InvalidConfig(_)
        )
    }
}
