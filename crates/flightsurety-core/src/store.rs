use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SuretyError;
use crate::oracle::StatusRequest;
use crate::types::{
    Amount, AirlineRecord, FlightKey, FlightRecord, FlightStatus, Identity, InsurancePolicy,
};

/// Shared handle to the single ledger store instance.
///
/// The mutex is the serialization boundary: every public operation holds it
/// from validation through commit, so operations apply in one global order.
pub type StoreHandle = Arc<Mutex<LedgerStore>>;

/// One payout credited to a passenger balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credit {
    pub passenger: Identity,
    pub amount: Amount,
}

/// Ledger Store: exclusive owner of all persistent surety state.
///
/// The store guards *who* may write (owner for administrative calls, the
/// authorization set for everything else) and never *whether* a write makes
/// business sense. The only invariant it enforces on content is solvency:
/// outstanding balances never exceed held funds.
///
/// Mutators are crate-private. Outside the crate a store, or a handle shared
/// with an engine, only answers reads; every write goes through
/// [`GovernanceEngine`](crate::GovernanceEngine).
///
/// ```compile_fail
/// use flightsurety_core::{units, Identity, LedgerStore};
///
/// let mut store = LedgerStore::initialize(Identity::new("owner"), Identity::new("a1"));
/// store
///     .fund_airline(&Identity::new("app"), &Identity::new("mallory"), units(10))
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct LedgerStore {
    owner: Identity,
    operational: bool,
    authorized: BTreeSet<Identity>,
    airlines: HashMap<Identity, AirlineRecord>,
    registered_count: usize,
    flights: HashMap<FlightKey, FlightRecord>,
    /// flight -> passenger -> policy
    policies: HashMap<FlightKey, BTreeMap<Identity, InsurancePolicy>>,
    balances: HashMap<Identity, Amount>,
    status_requests: BTreeMap<FlightKey, StatusRequest>,
    held_funds: Amount,
    total_received: Amount,
    outstanding: Amount,
}

impl LedgerStore {
    /// Create the store with exactly one registered, unfunded airline.
    pub fn initialize(owner: Identity, first_airline: Identity) -> Self {
        let mut airlines = HashMap::new();
        airlines.insert(
            first_airline.clone(),
            AirlineRecord {
                registered: true,
                ..AirlineRecord::default()
            },
        );
        debug!(owner = %owner, airline = %first_airline, "Ledger store initialized");

        Self {
            owner,
            operational: true,
            authorized: BTreeSet::new(),
            airlines,
            registered_count: 1,
            flights: HashMap::new(),
            policies: HashMap::new(),
            balances: HashMap::new(),
            status_requests: BTreeMap::new(),
            held_funds: 0,
            total_received: 0,
            outstanding: 0,
        }
    }

    /// Wrap the store in the shared handle handed to engines.
    pub fn into_handle(self) -> StoreHandle {
        Arc::new(Mutex::new(self))
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    pub fn is_operational(&self) -> bool {
        self.operational
    }

    pub(crate) fn set_operating_status(
        &mut self,
        caller: &Identity,
        operational: bool,
    ) -> Result<(), SuretyError> {
        self.require_owner(caller)?;
        self.operational = operational;
        Ok(())
    }

    /// Add `identity` to the authorization set. Returns false when it was
    /// already present.
    pub(crate) fn authorize_caller(
        &mut self,
        caller: &Identity,
        identity: Identity,
    ) -> Result<bool, SuretyError> {
        self.require_owner(caller)?;
        Ok(self.authorized.insert(identity))
    }

    pub fn is_caller_authorized(&self, identity: &Identity) -> bool {
        self.authorized.contains(identity)
    }

    fn require_owner(&self, caller: &Identity) -> Result<(), SuretyError> {
        if *caller != self.owner {
            return Err(SuretyError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    fn require_writer(&self, caller: &Identity) -> Result<(), SuretyError> {
        if !self.operational {
            return Err(SuretyError::NotOperational);
        }
        if !self.authorized.contains(caller) {
            return Err(SuretyError::CallerNotAuthorized(caller.clone()));
        }
        Ok(())
    }

    // =========================================================================
    // AIRLINES
    // =========================================================================

    pub fn airline(&self, airline: &Identity) -> Option<&AirlineRecord> {
        self.airlines.get(airline)
    }

    pub fn airlines(&self) -> impl Iterator<Item = (&Identity, &AirlineRecord)> {
        self.airlines.iter()
    }

    pub fn is_airline_registered(&self, airline: &Identity) -> bool {
        self.airlines
            .get(airline)
            .map(|a| a.registered)
            .unwrap_or(false)
    }

    pub fn is_airline_funded(&self, airline: &Identity) -> bool {
        self.airlines.get(airline).map(|a| a.funded).unwrap_or(false)
    }

    pub fn registered_airline_count(&self) -> usize {
        self.registered_count
    }

    pub fn num_votes(&self, candidate: &Identity) -> usize {
        self.airlines
            .get(candidate)
            .map(|a| a.voters.len())
            .unwrap_or(0)
    }

    pub fn has_voted(&self, candidate: &Identity, voter: &Identity) -> bool {
        self.airlines
            .get(candidate)
            .map(|a| a.voters.contains(voter))
            .unwrap_or(false)
    }

    /// Mark `candidate` registered and clear its pending votes.
    pub(crate) fn register_airline(
        &mut self,
        caller: &Identity,
        candidate: &Identity,
    ) -> Result<(), SuretyError> {
        self.require_writer(caller)?;
        let record = self.airlines.entry(candidate.clone()).or_default();
        if !record.registered {
            record.registered = true;
            self.registered_count += 1;
        }
        record.voters.clear();
        debug!(airline = %candidate, registered = self.registered_count, "Airline registered in store");
        Ok(())
    }

    /// Record `voter`'s vote for `candidate`. Returns the resulting count.
    pub(crate) fn record_vote(
        &mut self,
        caller: &Identity,
        candidate: &Identity,
        voter: &Identity,
    ) -> Result<usize, SuretyError> {
        self.require_writer(caller)?;
        let record = self.airlines.entry(candidate.clone()).or_default();
        record.voters.insert(voter.clone());
        Ok(record.voters.len())
    }

    pub(crate) fn fund_airline(
        &mut self,
        caller: &Identity,
        airline: &Identity,
        amount: Amount,
    ) -> Result<(), SuretyError> {
        self.require_writer(caller)?;
        let record = self.airlines.entry(airline.clone()).or_default();
        record.funded = true;
        record.deposited = record.deposited.saturating_add(amount);
        self.receive(amount);
        Ok(())
    }

    // =========================================================================
    // FLIGHTS
    // =========================================================================

    pub fn flight(&self, key: &FlightKey) -> Option<&FlightRecord> {
        self.flights.get(key)
    }

    pub fn flights_of(&self, airline: &Identity) -> Vec<(FlightKey, FlightRecord)> {
        let mut flights: Vec<(FlightKey, FlightRecord)> = self
            .flights
            .iter()
            .filter(|(key, _)| key.airline == *airline)
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect();
        flights.sort_by(|a, b| a.0.cmp(&b.0));
        flights
    }

    /// Create or overwrite a flight with status `Unknown`.
    pub(crate) fn register_flight(
        &mut self,
        caller: &Identity,
        key: FlightKey,
        now: i64,
    ) -> Result<(), SuretyError> {
        self.require_writer(caller)?;
        self.flights.insert(
            key,
            FlightRecord {
                registered: true,
                status: FlightStatus::Unknown,
                updated_at: now,
            },
        );
        Ok(())
    }

    pub(crate) fn set_flight_status(
        &mut self,
        caller: &Identity,
        key: &FlightKey,
        status: FlightStatus,
        now: i64,
    ) -> Result<(), SuretyError> {
        self.require_writer(caller)?;
        let flight = self
            .flights
            .get_mut(key)
            .ok_or_else(|| SuretyError::FlightNotRegistered(key.clone()))?;
        flight.status = status;
        flight.updated_at = now;
        self.status_requests.remove(key);
        Ok(())
    }

    // =========================================================================
    // ORACLE REQUESTS
    // =========================================================================

    pub(crate) fn record_status_request(
        &mut self,
        caller: &Identity,
        request: StatusRequest,
    ) -> Result<(), SuretyError> {
        self.require_writer(caller)?;
        self.status_requests.insert(request.key.clone(), request);
        Ok(())
    }

    pub fn open_status_requests(&self) -> Vec<StatusRequest> {
        self.status_requests.values().cloned().collect()
    }

    // =========================================================================
    // INSURANCE ESCROW
    // =========================================================================

    pub fn insurance_amount(&self, passenger: &Identity, key: &FlightKey) -> Amount {
        self.policy(passenger, key)
            .map(|p| p.insured_amount)
            .unwrap_or(0)
    }

    pub fn policy(&self, passenger: &Identity, key: &FlightKey) -> Option<&InsurancePolicy> {
        self.policies.get(key).and_then(|p| p.get(passenger))
    }

    /// Add `amount` to the passenger's coverage. Returns the new total.
    pub(crate) fn buy_insurance(
        &mut self,
        caller: &Identity,
        passenger: &Identity,
        key: &FlightKey,
        amount: Amount,
    ) -> Result<Amount, SuretyError> {
        self.require_writer(caller)?;
        let policy = self
            .policies
            .entry(key.clone())
            .or_default()
            .entry(passenger.clone())
            .or_default();
        policy.insured_amount = policy.insured_amount.saturating_add(amount);
        let total = policy.insured_amount;
        self.receive(amount);
        Ok(total)
    }

    /// Credit every insuree of `key` with `payout(unsettled coverage)` and
    /// mark that coverage settled.
    ///
    /// All credits are computed first; if their sum would leave outstanding
    /// balances above held funds nothing is written. A payout that `payout`
    /// cannot represent (`None`) or a sum that overflows counts as uncovered.
    pub(crate) fn credit_insurees<F>(
        &mut self,
        caller: &Identity,
        key: &FlightKey,
        payout: F,
    ) -> Result<Vec<Credit>, SuretyError>
    where
        F: Fn(Amount) -> Option<Amount>,
    {
        self.require_writer(caller)?;

        let Some(policies) = self.policies.get(key) else {
            return Ok(Vec::new());
        };

        let uncovered = |credit: Amount| SuretyError::InsufficientReserves {
            credit,
            outstanding: self.outstanding,
            held: self.held_funds,
        };

        let mut credits = Vec::new();
        let mut total: Amount = 0;
        for (passenger, policy) in policies.iter().filter(|(_, p)| p.unsettled() > 0) {
            let amount = payout(policy.unsettled()).ok_or_else(|| uncovered(Amount::MAX))?;
            total = total
                .checked_add(amount)
                .ok_or_else(|| uncovered(Amount::MAX))?;
            credits.push(Credit {
                passenger: passenger.clone(),
                amount,
            });
        }

        match self.outstanding.checked_add(total) {
            Some(after) if after <= self.held_funds => {}
            _ => return Err(uncovered(total)),
        }

        if let Some(policies) = self.policies.get_mut(key) {
            for policy in policies.values_mut() {
                policy.settled_amount = policy.insured_amount;
            }
        }
        for credit in &credits {
            *self.balances.entry(credit.passenger.clone()).or_default() += credit.amount;
        }
        self.outstanding += total;

        debug!(flight = %key, credited = credits.len(), total, "Insurees credited");
        Ok(credits)
    }

    // =========================================================================
    // BALANCES
    // =========================================================================

    pub fn passenger_balance(&self, passenger: &Identity) -> Amount {
        self.balances.get(passenger).copied().unwrap_or(0)
    }

    /// Zero the passenger's balance and release it from held funds.
    /// Returns the debited amount.
    pub(crate) fn debit_balance(
        &mut self,
        caller: &Identity,
        passenger: &Identity,
    ) -> Result<Amount, SuretyError> {
        self.require_writer(caller)?;
        let amount = self.balances.remove(passenger).unwrap_or(0);
        self.outstanding -= amount;
        self.held_funds -= amount;
        Ok(amount)
    }

    /// Undo a debit whose external transfer did not complete.
    pub(crate) fn restore_balance(
        &mut self,
        caller: &Identity,
        passenger: &Identity,
        amount: Amount,
    ) -> Result<(), SuretyError> {
        self.require_writer(caller)?;
        *self.balances.entry(passenger.clone()).or_default() += amount;
        self.outstanding += amount;
        self.held_funds += amount;
        Ok(())
    }

    pub fn held_funds(&self) -> Amount {
        self.held_funds
    }

    pub fn total_received(&self) -> Amount {
        self.total_received
    }

    /// Sum of all withdrawable balances.
    pub fn outstanding_balances(&self) -> Amount {
        self.outstanding
    }

    fn receive(&mut self, amount: Amount) {
        self.held_funds = self.held_funds.saturating_add(amount);
        self.total_received = self.total_received.saturating_add(amount);
    }
}
