use serde::{Deserialize, Serialize};

use crate::types::{Amount, FlightKey, FlightStatus, Identity};

/// Notifications emitted after a committed state transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuretyEvent {
    OperatingStatusChanged {
        operational: bool,
    },
    CallerAuthorized {
        identity: Identity,
    },
    AirlineRegistered {
        airline: Identity,
        registered_by: Identity,
    },
    AirlineVoted {
        candidate: Identity,
        voter: Identity,
        votes: usize,
    },
    AirlineFunded {
        airline: Identity,
        amount: Amount,
    },
    FlightRegistered {
        key: FlightKey,
    },
    InsurancePurchased {
        passenger: Identity,
        key: FlightKey,
        amount: Amount,
        total: Amount,
    },
    OracleRequest {
        index: u8,
        key: FlightKey,
        requester: Identity,
    },
    FlightStatusInfo {
        key: FlightKey,
        status: FlightStatus,
    },
    InsureeCredited {
        passenger: Identity,
        key: FlightKey,
        amount: Amount,
    },
    Withdrawal {
        passenger: Identity,
        amount: Amount,
    },
}

/// Discriminant used for subscription filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OperatingStatusChanged,
    CallerAuthorized,
    AirlineRegistered,
    AirlineVoted,
    AirlineFunded,
    FlightRegistered,
    InsurancePurchased,
    OracleRequest,
    FlightStatusInfo,
    InsureeCredited,
    Withdrawal,
}

impl SuretyEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SuretyEvent::OperatingStatusChanged { .. } => EventKind::OperatingStatusChanged,
            SuretyEvent::CallerAuthorized { .. } => EventKind::CallerAuthorized,
            SuretyEvent::AirlineRegistered { .. } => EventKind::AirlineRegistered,
            SuretyEvent::AirlineVoted { .. } => EventKind::AirlineVoted,
            SuretyEvent::AirlineFunded { .. } => EventKind::AirlineFunded,
            SuretyEvent::FlightRegistered { .. } => EventKind::FlightRegistered,
            SuretyEvent::InsurancePurchased { .. } => EventKind::InsurancePurchased,
            SuretyEvent::OracleRequest { .. } => EventKind::OracleRequest,
            SuretyEvent::FlightStatusInfo { .. } => EventKind::FlightStatusInfo,
            SuretyEvent::InsureeCredited { .. } => EventKind::InsureeCredited,
            SuretyEvent::Withdrawal { .. } => EventKind::Withdrawal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_externally_tagged() {
        let event = SuretyEvent::AirlineFunded {
            airline: Identity::new("a1"),
            amount: 10,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["airline_funded"]["airline"], "a1");
        assert_eq!(value["airline_funded"]["amount"], 10);
        assert_eq!(event.kind(), EventKind::AirlineFunded);
    }
}
