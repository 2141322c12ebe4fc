use serde::{Deserialize, Serialize};

use crate::error::SuretyError;
use crate::store::LedgerStore;
use crate::types::Identity;

/// Caller role, resolved once per call from the store snapshot.
///
/// Airline participation takes precedence: an identity that is both the
/// owner and an airline acts as an airline in business rules. Ownership is
/// checked by identity inside the store's administrative calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    FundedAirline,
    RegisteredAirline,
    Owner,
    Passenger,
}

impl CallerRole {
    pub fn resolve(store: &LedgerStore, caller: &Identity) -> Self {
        match store.airline(caller) {
            Some(record) if record.funded => CallerRole::FundedAirline,
            Some(record) if record.registered => CallerRole::RegisteredAirline,
            _ if caller == store.owner() => CallerRole::Owner,
            _ => CallerRole::Passenger,
        }
    }

    pub fn is_airline(self) -> bool {
        matches!(self, CallerRole::FundedAirline | CallerRole::RegisteredAirline)
    }

    pub fn require_registered(self, caller: &Identity) -> Result<(), SuretyError> {
        if self.is_airline() {
            Ok(())
        } else {
            Err(SuretyError::CallerNotRegistered(caller.clone()))
        }
    }

    pub fn require_funded(self, caller: &Identity) -> Result<(), SuretyError> {
        if self == CallerRole::FundedAirline {
            Ok(())
        } else {
            Err(SuretyError::CallerNotFunded(caller.clone()))
        }
    }
}

/// First gate of every mutating operation.
pub fn require_operational(store: &LedgerStore) -> Result<(), SuretyError> {
    if store.is_operational() {
        Ok(())
    } else {
        Err(SuretyError::NotOperational)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::units;

    #[test]
    fn roles_follow_airline_state() {
        let owner = Identity::new("owner");
        let app = Identity::new("app");
        let a1 = Identity::new("a1");
        let mut store = LedgerStore::initialize(owner.clone(), a1.clone());
        store.authorize_caller(&owner, app.clone()).unwrap();

        assert_eq!(CallerRole::resolve(&store, &a1), CallerRole::RegisteredAirline);
        assert_eq!(CallerRole::resolve(&store, &owner), CallerRole::Owner);
        assert_eq!(
            CallerRole::resolve(&store, &Identity::new("p1")),
            CallerRole::Passenger
        );

        store.fund_airline(&app, &a1, units(10)).unwrap();
        assert_eq!(CallerRole::resolve(&store, &a1), CallerRole::FundedAirline);
    }

    #[test]
    fn requirements_map_to_error_kinds() {
        let a2 = Identity::new("a2");
        assert_eq!(
            CallerRole::Passenger.require_registered(&a2),
            Err(SuretyError::CallerNotRegistered(a2.clone()))
        );
        assert!(CallerRole::RegisteredAirline.require_registered(&a2).is_ok());
        assert_eq!(
            CallerRole::RegisteredAirline.require_funded(&a2),
            Err(SuretyError::CallerNotFunded(a2.clone()))
        );
        assert!(CallerRole::FundedAirline.require_funded(&a2).is_ok());
    }

    #[test]
    fn paused_store_fails_gate() {
        let owner = Identity::new("owner");
        let mut store = LedgerStore::initialize(owner.clone(), Identity::new("a1"));
        assert!(require_operational(&store).is_ok());
        store.set_operating_status(&owner, false).unwrap();
        assert_eq!(require_operational(&store), Err(SuretyError::NotOperational));
    }
}
