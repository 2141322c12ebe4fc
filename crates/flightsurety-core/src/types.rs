use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SuretyError;

/// Value in minor units (10^18 minor units make one unit).
pub type Amount = u128;

/// Minor units per whole unit of value.
pub const UNIT: Amount = 1_000_000_000_000_000_000;

/// Whole units expressed in minor units.
pub const fn units(n: u128) -> Amount {
    n * UNIT
}

/// Thousandths of a unit expressed in minor units (`milli_units(500)` is 0.5).
pub const fn milli_units(n: u128) -> Amount {
    n * (UNIT / 1_000)
}

/// Authenticated caller identity supplied by the external identity layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A single flight occurrence: operating airline, flight code and scheduled
/// departure in unix seconds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlightKey {
    pub airline: Identity,
    pub code: String,
    pub departure: i64,
}

impl FlightKey {
    pub fn new(airline: Identity, code: impl Into<String>, departure: i64) -> Self {
        Self {
            airline,
            code: code.into(),
            departure,
        }
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.airline, self.code, self.departure)
    }
}

/// Flight status codes as reported by the oracle boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    Unknown,
    OnTime,
    LateAirline,
    LateWeather,
    LateTechnical,
    LateOther,
}

impl FlightStatus {
    pub fn code(self) -> u8 {
        match self {
            FlightStatus::Unknown => 0,
            FlightStatus::OnTime => 10,
            FlightStatus::LateAirline => 20,
            FlightStatus::LateWeather => 30,
            FlightStatus::LateTechnical => 40,
            FlightStatus::LateOther => 50,
        }
    }

    /// Only an airline-fault delay makes policies eligible for payout.
    pub fn is_payable(self) -> bool {
        self == FlightStatus::LateAirline
    }

    pub fn is_final(self) -> bool {
        self != FlightStatus::Unknown
    }

    pub fn describe(self) -> &'static str {
        match self {
            FlightStatus::Unknown => "No flight event information yet.",
            FlightStatus::OnTime => "The flight is on time.",
            FlightStatus::LateAirline => "The flight is late because of airline.",
            FlightStatus::LateWeather => "The flight is late because of weather.",
            FlightStatus::LateTechnical => "The flight is late because of technical reasons.",
            FlightStatus::LateOther => "The flight is late because of other reasons.",
        }
    }
}

impl TryFrom<u8> for FlightStatus {
    type Error = SuretyError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(FlightStatus::Unknown),
            10 => Ok(FlightStatus::OnTime),
            20 => Ok(FlightStatus::LateAirline),
            30 => Ok(FlightStatus::LateWeather),
            40 => Ok(FlightStatus::LateTechnical),
            50 => Ok(FlightStatus::LateOther),
            other => Err(SuretyError::UnknownStatusCode(other)),
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Airline participation lifecycle. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirlineState {
    Unregistered,
    Registered,
    Funded,
}

/// Airline record owned by the ledger store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AirlineRecord {
    pub registered: bool,
    pub funded: bool,
    /// Distinct funded airlines that voted for admission while pending.
    pub voters: BTreeSet<Identity>,
    /// Total value deposited through funding payments.
    pub deposited: Amount,
}

impl AirlineRecord {
    pub fn state(&self) -> AirlineState {
        if self.funded {
            AirlineState::Funded
        } else if self.registered {
            AirlineState::Registered
        } else {
            AirlineState::Unregistered
        }
    }
}

/// Registered flight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlightRecord {
    pub registered: bool,
    pub status: FlightStatus,
    /// Unix seconds of the last status change (registration included).
    pub updated_at: i64,
}

/// A passenger's accumulated coverage on one flight.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    pub insured_amount: Amount,
    /// Portion of `insured_amount` already credited by a payout.
    pub settled_amount: Amount,
}

impl InsurancePolicy {
    pub fn unsettled(&self) -> Amount {
        self.insured_amount.saturating_sub(self.settled_amount)
    }
}
